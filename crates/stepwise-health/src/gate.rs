//! Pre-upgrade health gate.
//!
//! Runs once before the first member upgrades (never on rollback). Every
//! step is a hard precondition and the first failing step decides the
//! reason reported; nothing is retried here.

use std::fmt;

use serde::Serialize;
use stepwise_core::{ClusterRole, Ordinal};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::collaborator::ClusterHealth;

/// Why the cluster is not ready to upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PrecheckReason {
    ClusterUnhealthy,
    PrimarySwitchoverFailed,
    DependentClusterFailed,
}

impl PrecheckReason {
    pub fn message(&self) -> &'static str {
        match self {
            PrecheckReason::ClusterUnhealthy => "cluster is not healthy",
            PrecheckReason::PrimarySwitchoverFailed => "primary switchover failed",
            PrecheckReason::DependentClusterFailed => {
                "pre-upgrade operations on dependent cluster failed"
            }
        }
    }
}

impl fmt::Display for PrecheckReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// The cluster is not ready to upgrade. Blocks the attempt, never the process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pre-upgrade check failed: {reason}")]
pub struct PrecheckFailed {
    pub reason: PrecheckReason,
}

impl From<PrecheckReason> for PrecheckFailed {
    fn from(reason: PrecheckReason) -> Self {
        Self { reason }
    }
}

/// The precondition sequence run before an upgrade attempt.
pub struct HealthGate<'a> {
    cluster: &'a dyn ClusterHealth,
    role: ClusterRole,
}

impl<'a> HealthGate<'a> {
    pub fn new(cluster: &'a dyn ClusterHealth, role: ClusterRole) -> Self {
        Self { cluster, role }
    }

    /// Run every step in order.
    ///
    /// `last_to_upgrade` is the lowest ordinal in the cluster; the primary
    /// is parked there so it moves at most once during the whole upgrade.
    pub fn run(&self, last_to_upgrade: Ordinal) -> Result<(), PrecheckFailed> {
        debug!(role = ?self.role, last_to_upgrade, "running pre-upgrade checks");

        if let Err(e) = self.cluster.wait_for_cluster_healthy() {
            error!(error = %e, "cluster is not healthy");
            return Err(PrecheckReason::ClusterUnhealthy.into());
        }

        if let Err(e) = self.cluster.move_primary_to(last_to_upgrade) {
            error!(error = %e, "cluster failed to move primary before upgrade");
            return Err(PrecheckReason::PrimarySwitchoverFailed.into());
        }

        if !self.cluster.is_cluster_read_write_capable() {
            error!("cluster cannot read/write after primary relocation");
            return Err(PrecheckReason::ClusterUnhealthy.into());
        }

        if self.role == ClusterRole::Coordinator && !self.cluster.are_dependent_clusters_ready() {
            error!("dependent clusters are not ready to upgrade");
            return Err(PrecheckReason::DependentClusterFailed.into());
        }

        info!(last_to_upgrade, "pre-upgrade checks passed");
        Ok(())
    }
}
