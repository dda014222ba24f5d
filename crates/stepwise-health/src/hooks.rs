//! Collaborators implemented by running operator-supplied commands.
//!
//! Each hook is an argv vector from `[hooks]` in stepwise.toml. A hook
//! succeeds iff the command exits with status 0. Unconfigured hooks fail,
//! so a missing health probe never reads as a healthy cluster.

use std::process::{Command, Stdio};

use anyhow::{Context, bail};
use stepwise_core::Ordinal;
use stepwise_core::config::HooksConfig;
use tracing::{debug, warn};

use crate::collaborator::{
    ClusterHealth, HealthError, RelocationError, WorkloadController, WorkloadError,
};
use crate::retry::RetryPolicy;

/// Cluster and workload collaborators backed by shell commands.
#[derive(Debug, Clone)]
pub struct CommandHooks {
    hooks: HooksConfig,
    retry: RetryPolicy,
}

impl CommandHooks {
    pub fn new(hooks: HooksConfig) -> Self {
        let retry = RetryPolicy::from(&hooks.retry);
        Self { hooks, retry }
    }

    fn succeeds(&self, name: &str, argv: &[String]) -> bool {
        match run(name, argv) {
            Ok(()) => true,
            Err(e) => {
                warn!(hook = name, error = %e, "hook failed");
                false
            }
        }
    }
}

/// Run a hook to completion. Its stdout is sent to our stderr so it lands
/// in the log stream and never mixes with reports on stdout.
fn run(name: &str, argv: &[String]) -> anyhow::Result<()> {
    let Some((program, args)) = argv.split_first() else {
        bail!("hook {name} is not configured");
    };
    debug!(hook = name, %program, ?args, "running hook");
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(std::io::stderr()))
        .status()
        .with_context(|| format!("failed to spawn hook {name} ({program})"))?;
    if !status.success() {
        bail!("hook {name} exited with {status}");
    }
    Ok(())
}

fn substitute_ordinal(argv: &[String], ordinal: Ordinal) -> Vec<String> {
    let ordinal = ordinal.to_string();
    argv.iter()
        .map(|arg| arg.replace("{ordinal}", &ordinal))
        .collect()
}

impl ClusterHealth for CommandHooks {
    fn wait_for_cluster_healthy(&self) -> Result<(), HealthError> {
        self.retry
            .run(|| run("cluster_healthy", &self.hooks.cluster_healthy))
            .map_err(|(attempts, e)| HealthError {
                attempts,
                reason: format!("{e:#}"),
            })
    }

    fn move_primary_to(&self, ordinal: Ordinal) -> Result<(), RelocationError> {
        let argv = substitute_ordinal(&self.hooks.move_primary, ordinal);
        run("move_primary", &argv).map_err(|e| RelocationError {
            ordinal,
            reason: format!("{e:#}"),
        })
    }

    fn is_cluster_read_write_capable(&self) -> bool {
        self.succeeds("read_write", &self.hooks.read_write)
    }

    fn are_dependent_clusters_ready(&self) -> bool {
        self.succeeds("dependents_ready", &self.hooks.dependents_ready)
    }
}

impl WorkloadController for CommandHooks {
    fn is_workload_healthy(&self) -> bool {
        self.succeeds("workload_healthy", &self.hooks.workload_healthy)
    }

    fn restart_or_reinstall_workload(&self) -> Result<(), WorkloadError> {
        run("restart_workload", &self.hooks.restart_workload)
            .map_err(|e| WorkloadError(format!("{e:#}")))
    }
}
