//! stepwise-health — pre-upgrade health gate and collaborator interfaces.
//!
//! # Architecture
//!
//! ```text
//! HealthGate::run(lowest ordinal)
//!   ├── ClusterHealth::wait_for_cluster_healthy   → "cluster is not healthy"
//!   ├── ClusterHealth::move_primary_to            → "primary switchover failed"
//!   ├── ClusterHealth::is_cluster_read_write_capable → "cluster is not healthy"
//!   └── ClusterHealth::are_dependent_clusters_ready  (coordinators only)
//! ```
//!
//! `CommandHooks` implements both `ClusterHealth` and `WorkloadController`
//! with configured commands, retrying the health probe with exponential
//! backoff (`RetryPolicy`).

pub mod collaborator;
pub mod gate;
pub mod hooks;
pub mod retry;

pub use collaborator::{
    ClusterHealth, HealthError, RelocationError, WorkloadController, WorkloadError,
};
pub use gate::{HealthGate, PrecheckFailed, PrecheckReason};
pub use hooks::CommandHooks;
pub use retry::RetryPolicy;
