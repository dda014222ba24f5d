//! stepwised — the Stepwise member daemon.
//!
//! One invocation acts for one member of the cluster:
//! - Registers or removes the member's coordination scope
//! - Re-evaluates the rolling upgrade once, or on an interval
//! - Runs the operator actions (pre-upgrade check, resume, force)
//! - Prints a JSON snapshot of the upgrade state
//!
//! # Usage
//!
//! ```text
//! stepwised --config /etc/stepwise/stepwise.toml join
//! stepwised --config /etc/stepwise/stepwise.toml watch --interval 30
//! stepwised --config /etc/stepwise/stepwise.toml --leader true resume-upgrade
//! ```

mod member;
mod watch;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::member::{Member, Overrides};

#[derive(Parser)]
#[command(name = "stepwised", about = "Stepwise rolling-upgrade member daemon")]
struct Cli {
    /// Path to stepwise.toml.
    #[arg(long, global = true, default_value = "/etc/stepwise/stepwise.toml")]
    config: PathBuf,

    /// Override the member ordinal from the config.
    #[arg(long, global = true)]
    ordinal: Option<u32>,

    /// Override leadership from the config.
    #[arg(long, global = true)]
    leader: Option<bool>,

    /// Workload build the platform is rolling out (fleet model).
    #[arg(long, global = true)]
    target_revision: Option<String>,

    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Register this member in the coordination store.
    Join,
    /// Remove this member and everything it published.
    Leave,
    /// Run one evaluation pass.
    Evaluate,
    /// Run the health gate before starting a rollout (leader only).
    PreUpgradeCheck,
    /// Confirm the first upgraded member and let the rest follow (leader only).
    ResumeUpgrade {
        /// Ignore member health when choosing the next member.
        #[arg(long)]
        force: bool,
    },
    /// Upgrade this member now, skipping ordering and compatibility checks.
    ForceUpgrade,
    /// Print the current upgrade state as JSON.
    Status,
    /// Re-evaluate periodically until interrupted.
    Watch {
        /// Seconds between evaluations.
        #[arg(long, default_value = "30")]
        interval: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let member = Member::load(
        &cli.config,
        Overrides {
            ordinal: cli.ordinal,
            leader: cli.leader,
            target_revision: cli.target_revision,
        },
    )?;

    match cli.command {
        Command::Join => member.join(),
        Command::Leave => {
            if !member.leave()? {
                info!("member was not registered");
            }
            Ok(())
        }
        Command::Evaluate => {
            if let Some(evaluation) = member.evaluate()? {
                print_json(&evaluation)?;
            }
            Ok(())
        }
        Command::PreUpgradeCheck => {
            let hooks = member.hooks();
            let passed = member.with_coordinator(|upgrade| Ok(upgrade.pre_upgrade_check(&hooks)?))?;
            if passed.is_some() {
                println!("Pre-upgrade check passed. Ready to upgrade.");
            }
            Ok(())
        }
        Command::ResumeUpgrade { force } => {
            if let Some(message) =
                member.with_coordinator(|upgrade| Ok(upgrade.resume_upgrade(force)?))?
            {
                println!("{message}");
            }
            Ok(())
        }
        Command::ForceUpgrade => {
            let hooks = member.hooks();
            if member
                .with_coordinator(|upgrade| Ok(upgrade.force_upgrade(&hooks)?))?
                .is_some()
            {
                println!("Forcefully upgraded member {}", member.config().member.ordinal);
            }
            Ok(())
        }
        Command::Status => {
            if let Some(snapshot) =
                member.with_coordinator(|upgrade| Ok(stepwise_upgrade::snapshot(upgrade)?))?
            {
                print_json(&snapshot)?;
            }
            Ok(())
        }
        Command::Watch { interval } => {
            watch::run_watch(member, Duration::from_secs(interval.max(1))).await
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stepwise=debug"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
