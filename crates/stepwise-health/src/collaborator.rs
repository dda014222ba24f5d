//! Interfaces to the systems the coordinator observes and drives.
//!
//! Implementations own their retry policy; every call here either returns
//! within a bounded time or reports failure.

use stepwise_core::Ordinal;
use thiserror::Error;

/// The cluster never reached a healthy state within the retry budget.
#[derive(Debug, Error)]
#[error("cluster not healthy after {attempts} attempt(s): {reason}")]
pub struct HealthError {
    pub attempts: u32,
    pub reason: String,
}

/// The primary role could not be moved.
#[derive(Debug, Error)]
#[error("failed to move primary to member {ordinal}: {reason}")]
pub struct RelocationError {
    pub ordinal: Ordinal,
    pub reason: String,
}

/// The workload could not be restarted onto the new build.
#[derive(Debug, Error)]
#[error("workload restart failed: {0}")]
pub struct WorkloadError(pub String);

/// Cluster health and topology operations needed before an upgrade.
pub trait ClusterHealth {
    /// Block (bounded) until the cluster is healthy.
    fn wait_for_cluster_healthy(&self) -> Result<(), HealthError>;

    /// Move the primary role to the member with this ordinal.
    fn move_primary_to(&self, ordinal: Ordinal) -> Result<(), RelocationError>;

    fn is_cluster_read_write_capable(&self) -> bool;

    /// Whether every dependent sub-cluster finished its own preparation.
    /// Only consulted when this deployment coordinates sub-clusters.
    fn are_dependent_clusters_ready(&self) -> bool;
}

/// Supervision of this member's database process.
pub trait WorkloadController {
    fn is_workload_healthy(&self) -> bool;

    /// Restart (or reinstall) the workload so it runs the bundled build.
    fn restart_or_reinstall_workload(&self) -> Result<(), WorkloadError>;
}
