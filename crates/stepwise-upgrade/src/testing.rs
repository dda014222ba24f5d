//! Scriptable collaborators for coordinator tests.

use std::cell::{Cell, RefCell};

use stepwise_core::Ordinal;
use stepwise_health::{
    ClusterHealth, HealthError, RelocationError, WorkloadController, WorkloadError,
};

#[derive(Default)]
pub(crate) struct FakeCluster {
    pub unhealthy: bool,
    pub relocation_fails: bool,
    pub dependents_broken: bool,
    pub calls: RefCell<Vec<String>>,
}

impl ClusterHealth for FakeCluster {
    fn wait_for_cluster_healthy(&self) -> Result<(), HealthError> {
        self.calls.borrow_mut().push("healthy".to_string());
        if self.unhealthy {
            return Err(HealthError {
                attempts: 1,
                reason: "member lagging".to_string(),
            });
        }
        Ok(())
    }

    fn move_primary_to(&self, ordinal: Ordinal) -> Result<(), RelocationError> {
        self.calls.borrow_mut().push(format!("move:{ordinal}"));
        if self.relocation_fails {
            return Err(RelocationError {
                ordinal,
                reason: "no eligible member".to_string(),
            });
        }
        Ok(())
    }

    fn is_cluster_read_write_capable(&self) -> bool {
        self.calls.borrow_mut().push("rw".to_string());
        true
    }

    fn are_dependent_clusters_ready(&self) -> bool {
        self.calls.borrow_mut().push("dependents".to_string());
        !self.dependents_broken
    }
}

#[derive(Default)]
pub(crate) struct FakeWorkload {
    pub unhealthy: bool,
    pub restart_fails: bool,
    pub restarts: Cell<u32>,
}

impl WorkloadController for FakeWorkload {
    fn is_workload_healthy(&self) -> bool {
        !self.unhealthy
    }

    fn restart_or_reinstall_workload(&self) -> Result<(), WorkloadError> {
        if self.restart_fails {
            return Err(WorkloadError("package install failed".to_string()));
        }
        self.restarts.set(self.restarts.get() + 1);
        Ok(())
    }
}
