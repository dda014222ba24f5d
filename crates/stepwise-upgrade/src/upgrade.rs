//! Upgrade coordinator — shared state machine over a deployment model.
//!
//! Nothing about an upgrade is stored as a phase; every predicate is
//! recomputed from the coordination store on each evaluation, so a member
//! that lost its memory (restart, crash) converges on the next signal.

use std::collections::BTreeMap;

use serde::Serialize;
use stepwise_core::version::{Incompatibility, check_compatible};
use stepwise_core::{ClusterRole, DeploymentModel, Ordinal, UnitState, VersionRegistry};
use stepwise_health::{ClusterHealth, HealthGate, WorkloadController};
use stepwise_store::{Coordination, ResumeLatch};
use tracing::{debug, info, warn};

use crate::error::{UpgradeError, UpgradeResult};
use crate::fleet::FleetModel;
use crate::individual::IndividualModel;
use crate::model::{Resume, UpgradeModel};
use crate::status::{self, Status};

/// Where the cluster is in the upgrade lifecycle (derived, never stored).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpgradePhase {
    /// No versions recorded yet (first install).
    NoUpgradeRecorded,
    Idle,
    InProgress,
    /// The highest member upgraded and is healthy; waiting for the operator.
    AwaitingResume,
    /// Every member runs the target but the leader has not recorded it yet.
    Complete,
}

/// Everything a deployment model may read or write.
pub struct UpgradeBase {
    coordination: Coordination,
    registry: VersionRegistry,
    role: ClusterRole,
}

impl UpgradeBase {
    pub fn new(coordination: Coordination, registry: VersionRegistry, role: ClusterRole) -> Self {
        Self {
            coordination,
            registry,
            role,
        }
    }

    pub fn coordination(&self) -> &Coordination {
        &self.coordination
    }

    pub fn registry(&self) -> &VersionRegistry {
        &self.registry
    }

    pub fn role(&self) -> ClusterRole {
        self.role
    }

    pub fn ordinal(&self) -> Ordinal {
        self.coordination.ordinal()
    }

    pub fn is_leader(&self) -> bool {
        self.coordination.is_leader()
    }

    /// Members in upgrade order, highest ordinal first.
    pub fn sorted_members(&self) -> UpgradeResult<Vec<Ordinal>> {
        let mut members = self.coordination.members()?;
        members.sort_unstable_by(|a, b| b.cmp(a));
        Ok(members)
    }

    pub fn published_container_versions(&self) -> UpgradeResult<BTreeMap<Ordinal, String>> {
        let mut versions = BTreeMap::new();
        for ordinal in self.coordination.members()? {
            if let Some(version) = self.coordination.member_workload_container_version(ordinal)? {
                versions.insert(ordinal, version);
            }
        }
        Ok(versions)
    }

    pub fn versions_set(&self) -> UpgradeResult<bool> {
        Ok(self.coordination.versions_recorded()?)
    }

    /// Compatibility of the recorded versions with this build.
    pub fn compatibility(&self) -> UpgradeResult<Result<(), Incompatibility>> {
        let previous = self.coordination.versions()?;
        Ok(check_compatible(
            previous.as_ref(),
            self.registry.controller_version(),
            self.registry.workload_version(),
        ))
    }

    pub fn is_compatible(&self) -> UpgradeResult<bool> {
        match self.compatibility()? {
            Ok(()) => {
                debug!(
                    controller = %self.registry.controller_version(),
                    workload = %self.registry.workload_version(),
                    "recorded versions compatible with this build"
                );
                Ok(true)
            }
            Err(reason) => {
                debug!(%reason, "upgrade incompatible");
                Ok(false)
            }
        }
    }

    /// The new build's controller is exactly the recorded one, i.e. the
    /// operator is rolling back to the last completed upgrade.
    pub fn is_rollback(&self) -> UpgradeResult<bool> {
        let recorded = self.coordination.versions()?.ok_or(UpgradeError::NotRecorded)?;
        Ok(recorded.controller_version.as_deref() == Some(self.registry.controller_version()))
    }

    pub(crate) fn resumed_for(&self, target: &str) -> UpgradeResult<bool> {
        Ok(self
            .coordination
            .resume_latch()?
            .is_some_and(|latch| latch.resumed && latch.target == target))
    }

    /// Run the health gate, parking the primary on the last member to upgrade.
    pub fn run_health_gate(&self, cluster: &dyn ClusterHealth) -> UpgradeResult<()> {
        let members = self.sorted_members()?;
        let last_to_upgrade = members.last().copied().unwrap_or(self.ordinal());
        HealthGate::new(cluster, self.role).run(last_to_upgrade)?;
        Ok(())
    }
}

/// The coordinator for one member.
pub struct Upgrade {
    base: UpgradeBase,
    model: Box<dyn UpgradeModel>,
}

impl Upgrade {
    pub fn new(base: UpgradeBase, model: Box<dyn UpgradeModel>) -> Self {
        Self { base, model }
    }

    pub fn individual(base: UpgradeBase) -> Self {
        Self::new(base, Box::new(IndividualModel))
    }

    /// `target` is the build the platform is rolling out; defaults to the
    /// one bundled with this controller.
    pub fn fleet(base: UpgradeBase, target: Option<String>) -> Self {
        let target =
            target.unwrap_or_else(|| base.registry().workload_container_version().to_string());
        Self::new(base, Box::new(FleetModel::new(target)))
    }

    pub fn base(&self) -> &UpgradeBase {
        &self.base
    }

    pub fn kind(&self) -> DeploymentModel {
        self.model.kind()
    }

    pub fn in_progress(&self) -> UpgradeResult<bool> {
        self.model.in_progress(&self.base)
    }

    pub fn versions_set(&self) -> UpgradeResult<bool> {
        self.base.versions_set()
    }

    pub fn is_compatible(&self) -> UpgradeResult<bool> {
        self.model.is_compatible(&self.base)
    }

    pub fn upgrade_resumed(&self) -> UpgradeResult<bool> {
        self.model.upgrade_resumed(&self.base)
    }

    pub fn unit_state(&self) -> UpgradeResult<Option<UnitState>> {
        self.model.unit_state(&self.base)
    }

    pub fn app_workload_container_version(&self) -> String {
        self.model.app_workload_container_version(&self.base)
    }

    pub fn unit_workload_container_versions(&self) -> UpgradeResult<BTreeMap<Ordinal, String>> {
        self.model.unit_workload_container_versions(&self.base)
    }

    pub fn phase(&self) -> UpgradeResult<UpgradePhase> {
        if !self.versions_set()? {
            return Ok(UpgradePhase::NoUpgradeRecorded);
        }
        if !self.in_progress()? {
            let recorded = self.base.coordination.versions()?;
            if recorded.as_ref() != Some(&self.base.registry.record()) {
                return Ok(UpgradePhase::Complete);
            }
            return Ok(UpgradePhase::Idle);
        }

        let members = self.base.sorted_members()?;
        if members.len() > 1 && !self.upgrade_resumed()? {
            let highest = members[0];
            let target = self.app_workload_container_version();
            let coordination = self.base.coordination();
            let upgraded = coordination
                .member_workload_container_version(highest)?
                .is_some_and(|v| v == target);
            let healthy = coordination.member_state(highest)? == Some(UnitState::Healthy);
            if upgraded && healthy {
                return Ok(UpgradePhase::AwaitingResume);
            }
        }
        Ok(UpgradePhase::InProgress)
    }

    /// Status for this member; `None` when no upgrade is in progress.
    pub fn unit_status(&self) -> UpgradeResult<Option<Status>> {
        if !self.in_progress()? {
            return Ok(None);
        }
        self.model.unit_healthy_status(&self.base).map(Some)
    }

    /// Application-wide status; `None` when no upgrade is in progress.
    /// Without recorded versions a running upgrade reads as incompatible.
    pub fn app_status(&self) -> UpgradeResult<Option<Status>> {
        if !self.in_progress()? {
            return Ok(None);
        }
        if !self.is_compatible()? {
            info!(
                "upgrade incompatible; accepting possible data loss and downtime, \
                 run force-upgrade on each remaining member to continue"
            );
            return Ok(Some(status::incompatible()));
        }
        if !self.upgrade_resumed()? {
            let members = self.base.sorted_members()?;
            return Ok(Some(status::awaiting_resume(members.len())));
        }
        Ok(Some(status::upgrading()))
    }

    /// Record this build's versions as the new compatibility baseline.
    pub fn record_versions(&self) -> UpgradeResult<()> {
        if !self.base.is_leader() {
            return Err(UpgradeError::NotLeader);
        }
        if self.in_progress()? {
            return Err(UpgradeError::InProgress);
        }
        let record = self.base.registry.record();
        self.base.coordination.set_versions(&record)?;
        info!(
            controller = %self.base.registry.controller_version(),
            workload = %self.base.registry.workload_version(),
            "recorded versions"
        );
        self.reset_stale_latch()
    }

    /// Clear a resume left over from an earlier attempt: one recorded for
    /// another target, or any once the cluster is back on a single build.
    fn reset_stale_latch(&self) -> UpgradeResult<()> {
        let coordination = self.base.coordination();
        let Some(latch) = coordination.resume_latch()? else {
            return Ok(());
        };
        if !latch.resumed {
            return Ok(());
        }
        let target = self.app_workload_container_version();
        if latch.target == target && self.in_progress()? {
            return Ok(());
        }
        coordination.set_resume_latch(&ResumeLatch {
            target,
            resumed: false,
        })?;
        info!(previous = %latch.target, "resume latch cleared for the next upgrade attempt");
        Ok(())
    }

    /// The `pre-upgrade-check` operator action, run before a rollout starts.
    pub fn pre_upgrade_check(&self, cluster: &dyn ClusterHealth) -> UpgradeResult<()> {
        if !self.base.is_leader() {
            return Err(UpgradeError::NotLeader);
        }
        if self.in_progress()? {
            return Err(UpgradeError::InProgress);
        }
        self.base.run_health_gate(cluster)
    }

    /// The `resume-upgrade` operator action. Leader only.
    pub fn resume_upgrade(&self, force: bool) -> UpgradeResult<String> {
        if !self.base.is_leader() {
            return Err(UpgradeError::NotLeader);
        }
        if !self.in_progress()? {
            return Err(UpgradeError::NotInProgress);
        }
        if !force && self.upgrade_resumed()? {
            return Err(UpgradeError::AlreadyResumed);
        }
        let message = self
            .model
            .reconcile_partition(&self.base, Some(Resume { force }))?
            .unwrap_or_else(|| "Upgrade resumed.".to_string());
        info!(%message, force, "resume-upgrade succeeded");
        Ok(message)
    }

    /// Leader-side maintenance outside of operator actions: the resume
    /// latch and, for fleets, the partition.
    pub fn reconcile_partition(&self) -> UpgradeResult<()> {
        if self.base.is_leader() {
            self.reset_stale_latch()?;
        }
        self.model.reconcile_partition(&self.base, None)?;
        Ok(())
    }

    pub fn settle(&self, workload: &dyn WorkloadController) -> UpgradeResult<()> {
        self.model.settle(&self.base, workload)
    }

    pub fn authorized(&self, cluster: &dyn ClusterHealth) -> UpgradeResult<bool> {
        if !self.versions_set()? {
            return Err(UpgradeError::NotRecorded);
        }
        self.model.authorized(&self.base, cluster)
    }

    pub fn upgrade_unit(&self, workload: &dyn WorkloadController) -> UpgradeResult<()> {
        self.model.upgrade_unit(&self.base, workload)
    }

    /// Upgrade this member regardless of ordering and compatibility.
    pub fn force_upgrade(&self, workload: &dyn WorkloadController) -> UpgradeResult<()> {
        if !self.in_progress()? {
            return Err(UpgradeError::NotInProgress);
        }
        warn!(
            ordinal = self.base.ordinal(),
            "forcing upgrade; skipping authorization and compatibility checks"
        );
        self.upgrade_unit(workload)
    }
}
