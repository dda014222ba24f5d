//! Upgrade coordinator error types.

use stepwise_health::{PrecheckFailed, WorkloadError};
use stepwise_store::StoreError;
use thiserror::Error;

/// Errors surfaced at the coordinator boundary.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("coordination store error: {0}")]
    Store(#[from] StoreError),

    /// The cluster is not ready; the attempt is blocked until remediated.
    #[error(transparent)]
    NotReady(#[from] PrecheckFailed),

    #[error("workload error: {0}")]
    Workload(#[from] WorkloadError),

    /// Caller sequencing bug: the operation needs recorded versions.
    #[error("no versions recorded yet")]
    NotRecorded,

    #[error("an upgrade is already in progress")]
    InProgress,

    #[error("no upgrade in progress")]
    NotInProgress,

    #[error("upgrade already resumed")]
    AlreadyResumed,

    #[error("must run on the leader")]
    NotLeader,

    #[error("{0}")]
    ResumeRefused(String),
}

impl UpgradeError {
    /// The coordination scope is not reachable yet; retry on the next signal.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, UpgradeError::Store(e) if e.is_unavailable())
    }
}

pub type UpgradeResult<T> = Result<T, UpgradeError>;
