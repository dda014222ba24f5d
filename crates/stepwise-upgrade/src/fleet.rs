//! Fleet deployment model.
//!
//! The platform replaces members itself, from the highest ordinal down to
//! a partition: every member with an ordinal at or above the partition may
//! be restarted onto the target build. The leader only ever lowers the
//! partition while an upgrade runs, one member at a time, and only past
//! the first member once the operator resumes.

use stepwise_core::version::check_workload_compatible;
use stepwise_core::{DeploymentModel, Ordinal, UnitState};
use stepwise_health::{ClusterHealth, WorkloadController};
use stepwise_store::ResumeLatch;
use tracing::{debug, info, warn};

use crate::error::{UpgradeError, UpgradeResult};
use crate::model::{Resume, UpgradeModel, running_status};
use crate::status::{Status, short_id};
use crate::upgrade::UpgradeBase;

pub const HIGHEST_UNHEALTHY: &str = "Highest member is unhealthy. Upgrade will not resume.";
pub const INCOMPATIBLE: &str = "Upgrade incompatible. Upgrade will not resume.";

pub struct FleetModel {
    target: String,
}

impl FleetModel {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Index (in descending order) of the first member that has to be
    /// upgraded, or that blocks everything below it by being unhealthy.
    fn first_pending(
        &self,
        base: &UpgradeBase,
        members: &[Ordinal],
        ignore_health: bool,
    ) -> UpgradeResult<Option<usize>> {
        let coordination = base.coordination();
        for (index, &ordinal) in members.iter().enumerate() {
            let upgraded = coordination
                .member_workload_container_version(ordinal)?
                .is_some_and(|v| v == self.target);
            let healthy = coordination.member_state(ordinal)? == Some(UnitState::Healthy);
            if !upgraded || (!healthy && !ignore_health) {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }
}

impl UpgradeModel for FleetModel {
    fn kind(&self) -> DeploymentModel {
        DeploymentModel::Fleet
    }

    fn app_workload_container_version(&self, _base: &UpgradeBase) -> String {
        self.target.clone()
    }

    /// This build against the recorded versions, plus every member that
    /// already restarted onto the target: the leader is usually still on
    /// the old build while the first member runs the new one.
    fn is_compatible(&self, base: &UpgradeBase) -> UpgradeResult<bool> {
        if !base.is_compatible()? {
            return Ok(false);
        }
        let coordination = base.coordination();
        let recorded = coordination.versions()?;
        for ordinal in coordination.members()? {
            let on_target = coordination
                .member_workload_container_version(ordinal)?
                .is_some_and(|v| v == self.target);
            if !on_target {
                continue;
            }
            let Some(workload) = coordination.member_workload_version(ordinal)? else {
                continue;
            };
            if let Err(reason) = check_workload_compatible(recorded.as_ref(), &workload) {
                debug!(ordinal, %reason, "member on target is incompatible");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn unit_healthy_status(&self, base: &UpgradeBase) -> UpgradeResult<Status> {
        if base.coordination().unit_state()? == Some(UnitState::Restarting) {
            return Ok(Status::Maintenance(format!(
                "Restarting onto revision {}",
                short_id(&self.target, 16)
            )));
        }
        let own = base.registry().workload_container_version();
        if own == self.target {
            running_status(base, own, None)
        } else {
            running_status(base, own, Some("(upgrade pending)"))
        }
    }

    fn settle(&self, base: &UpgradeBase, workload: &dyn WorkloadController) -> UpgradeResult<()> {
        let coordination = base.coordination();
        let registry = base.registry();
        let running = registry.workload_container_version();
        if coordination.workload_container_version()?.as_deref() != Some(running) {
            coordination.set_workload_container_version(running)?;
            info!(ordinal = base.ordinal(), version = %running, "published running version");
        }
        if coordination.workload_version()?.as_deref() != Some(registry.workload_version()) {
            coordination.set_workload_version(registry.workload_version())?;
        }
        if coordination.unit_state()? != Some(UnitState::Healthy) && workload.is_workload_healthy() {
            coordination.set_unit_state(UnitState::Healthy)?;
            debug!(ordinal = base.ordinal(), "workload healthy");
        }
        Ok(())
    }

    fn reconcile_partition(
        &self,
        base: &UpgradeBase,
        resume: Option<Resume>,
    ) -> UpgradeResult<Option<String>> {
        if !base.is_leader() {
            return Ok(None);
        }
        let coordination = base.coordination();
        let members = base.sorted_members()?;
        let Some(&highest) = members.first() else {
            return Ok(None);
        };
        let current = coordination.partition()?;

        if !self.in_progress(base)? {
            if current != Some(highest) {
                coordination.set_partition(highest)?;
                debug!(partition = highest, "partition reset to highest member");
            }
            return Ok(None);
        }

        if !self.is_compatible(base)? {
            if resume.is_some() {
                warn!(target = %self.target, "refusing to resume an incompatible upgrade");
                return Err(UpgradeError::ResumeRefused(INCOMPATIBLE.to_string()));
            }
            // Hold where it is; only the highest member may move.
            if current.is_none() {
                coordination.set_partition(highest)?;
            }
            return Ok(None);
        }

        let force = resume.is_some_and(|r| r.force);
        let resumed = resume.is_some() || self.upgrade_resumed(base)?;
        let pending = self.first_pending(base, &members, force)?;

        if resume.is_some() && members.len() > 1 && pending == Some(0) {
            warn!(highest, force, "refusing to resume");
            return Err(UpgradeError::ResumeRefused(HIGHEST_UNHEALTHY.to_string()));
        }

        let mut partition = match pending {
            Some(index) if index == 0 || resumed => members[index],
            Some(_) => highest,
            None => members[members.len() - 1],
        };
        // Never raise the partition mid-upgrade: members below it may
        // already be restarting.
        if let Some(current) = current {
            partition = partition.min(current);
        }
        if current != Some(partition) {
            coordination.set_partition(partition)?;
            info!(partition, "partition lowered");
        }

        let Some(resume) = resume else {
            return Ok(None);
        };
        coordination.set_resume_latch(&ResumeLatch {
            target: self.target.clone(),
            resumed: true,
        })?;
        Ok(Some(if resume.force {
            format!("Attempting to upgrade member {partition}")
        } else {
            format!("Upgrade resumed. Member {partition} is upgrading next")
        }))
    }

    fn authorized(&self, base: &UpgradeBase, _cluster: &dyn ClusterHealth) -> UpgradeResult<bool> {
        if !self.is_compatible(base)? {
            return Ok(false);
        }
        if base.coordination().workload_container_version()?.as_deref() == Some(self.target.as_str()) {
            return Ok(false);
        }
        let partition = match base.coordination().partition()? {
            Some(partition) => partition,
            None => match base.sorted_members()?.first() {
                Some(&highest) => highest,
                None => return Ok(false),
            },
        };
        Ok(base.ordinal() >= partition)
    }

    fn upgrade_unit(
        &self,
        base: &UpgradeBase,
        _workload: &dyn WorkloadController,
    ) -> UpgradeResult<()> {
        // The platform performs the restart; record that it is expected.
        base.coordination().set_unit_state(UnitState::Restarting)?;
        info!(ordinal = base.ordinal(), target = %self.target, "waiting for platform restart");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use stepwise_core::{ClusterRole, VersionRegistry};
    use stepwise_store::{Coordination, PeerStore};

    use super::*;
    use crate::testing::{FakeCluster, FakeWorkload};
    use crate::upgrade::{Upgrade, UpgradePhase};

    fn old_build() -> VersionRegistry {
        VersionRegistry::from_parts("2.0.0", "2.0.0", "rev1").unwrap()
    }

    fn new_build() -> VersionRegistry {
        VersionRegistry::from_parts("2.1.0", "2.1.0", "rev2").unwrap()
    }

    fn member(store: &PeerStore, ordinal: u32, registry: VersionRegistry, target: &str) -> Upgrade {
        let coordination = Coordination::attach(store.clone(), ordinal, ordinal == 0).unwrap();
        let base = UpgradeBase::new(coordination, registry, ClusterRole::ReplicaSet);
        Upgrade::fleet(base, Some(target.to_string()))
    }

    fn installed_cluster() -> PeerStore {
        let store = PeerStore::open_in_memory().unwrap();
        for ordinal in 0..3 {
            store.join(ordinal, &format!("db/{ordinal}")).unwrap();
            member(&store, ordinal, old_build(), "rev1")
                .settle(&FakeWorkload::default())
                .unwrap();
        }
        let leader = member(&store, 0, old_build(), "rev1");
        leader.record_versions().unwrap();
        leader.reconcile_partition().unwrap();
        store
    }

    /// Simulates the platform restarting `ordinal` onto the new build.
    fn restart(store: &PeerStore, ordinal: u32, workload: &FakeWorkload) -> Upgrade {
        let unit = member(store, ordinal, new_build(), "rev2");
        unit.settle(workload).unwrap();
        unit
    }

    fn partition(store: &PeerStore) -> Option<u32> {
        Coordination::attach(store.clone(), 0, false)
            .unwrap()
            .partition()
            .unwrap()
    }

    #[test]
    fn idle_partition_sits_on_highest() {
        let store = installed_cluster();
        assert_eq!(partition(&store), Some(2));
        let unit = member(&store, 1, old_build(), "rev1");
        assert_eq!(unit.phase().unwrap(), UpgradePhase::Idle);
        assert_eq!(unit.kind(), DeploymentModel::Fleet);
    }

    #[test]
    fn partition_walks_down_after_resume() {
        let store = installed_cluster();
        let cluster = FakeCluster::default();
        let workload = FakeWorkload::default();
        let leader = member(&store, 0, old_build(), "rev2");
        leader.reconcile_partition().unwrap();
        assert_eq!(partition(&store), Some(2));

        let m2 = member(&store, 2, old_build(), "rev2");
        assert!(m2.authorized(&cluster).unwrap());
        assert!(!member(&store, 1, old_build(), "rev2").authorized(&cluster).unwrap());
        m2.upgrade_unit(&workload).unwrap();
        assert!(m2.unit_status().unwrap().unwrap().message().starts_with("Restarting"));

        restart(&store, 2, &workload);
        leader.reconcile_partition().unwrap();
        // Held on the highest until the operator resumes.
        assert_eq!(partition(&store), Some(2));
        assert_eq!(leader.phase().unwrap(), UpgradePhase::AwaitingResume);

        let message = leader.resume_upgrade(false).unwrap();
        assert_eq!(message, "Upgrade resumed. Member 1 is upgrading next");
        assert_eq!(partition(&store), Some(1));
        assert!(member(&store, 1, old_build(), "rev2").authorized(&cluster).unwrap());
        assert!(!leader.authorized(&cluster).unwrap());

        restart(&store, 1, &workload);
        leader.reconcile_partition().unwrap();
        assert_eq!(partition(&store), Some(0));

        let m0 = restart(&store, 0, &workload);
        assert!(!m0.in_progress().unwrap());
        m0.reconcile_partition().unwrap();
        assert_eq!(partition(&store), Some(2));
        assert_eq!(m0.phase().unwrap(), UpgradePhase::Complete);
        // Gate and restarts are the platform's job in this model.
        assert!(cluster.calls.borrow().is_empty());
        assert_eq!(workload.restarts.get(), 0);
    }

    #[test]
    fn resume_refused_while_highest_unhealthy() {
        let store = installed_cluster();
        let leader = member(&store, 0, old_build(), "rev2");
        member(&store, 2, old_build(), "rev2")
            .upgrade_unit(&FakeWorkload::default())
            .unwrap();
        restart(
            &store,
            2,
            &FakeWorkload {
                unhealthy: true,
                ..Default::default()
            },
        );

        match leader.resume_upgrade(false) {
            Err(UpgradeError::ResumeRefused(message)) => assert_eq!(message, HIGHEST_UNHEALTHY),
            other => panic!("expected refusal, got {other:?}"),
        }
        assert_eq!(partition(&store), Some(2));
        assert!(!leader.upgrade_resumed().unwrap());

        let message = leader.resume_upgrade(true).unwrap();
        assert_eq!(message, "Attempting to upgrade member 1");
        assert_eq!(partition(&store), Some(1));
    }

    #[test]
    fn resume_refused_before_highest_restarts() {
        let store = installed_cluster();
        let leader = member(&store, 0, old_build(), "rev2");
        assert!(matches!(
            leader.resume_upgrade(true),
            Err(UpgradeError::ResumeRefused(_))
        ));
    }

    #[test]
    fn major_version_target_is_never_resumed() {
        let store = installed_cluster();
        let cluster = FakeCluster::default();
        let workload = FakeWorkload::default();
        let major = || VersionRegistry::from_parts("3.0.0", "3.0.0", "rev3").unwrap();
        let leader = member(&store, 0, old_build(), "rev3");
        leader.reconcile_partition().unwrap();

        // The platform always moves the highest member first.
        let m2 = member(&store, 2, old_build(), "rev3");
        assert!(m2.authorized(&cluster).unwrap());
        m2.upgrade_unit(&workload).unwrap();
        let m2 = member(&store, 2, major(), "rev3");
        m2.settle(&workload).unwrap();
        assert!(!m2.is_compatible().unwrap());

        // The leader is still on the old build but sees the restarted member.
        assert!(!leader.is_compatible().unwrap());
        assert_eq!(leader.app_status().unwrap(), Some(crate::status::incompatible()));
        for force in [false, true] {
            match leader.resume_upgrade(force) {
                Err(UpgradeError::ResumeRefused(message)) => assert_eq!(message, INCOMPATIBLE),
                other => panic!("expected refusal, got {other:?}"),
            }
        }
        leader.reconcile_partition().unwrap();
        assert_eq!(partition(&store), Some(2));
        assert!(!leader.upgrade_resumed().unwrap());
        assert!(!member(&store, 1, old_build(), "rev3").authorized(&cluster).unwrap());

        let upgraded_leader = member(&store, 0, major(), "rev3");
        assert!(matches!(
            upgraded_leader.resume_upgrade(false),
            Err(UpgradeError::ResumeRefused(_))
        ));
        assert_eq!(partition(&store), Some(2));
    }

    #[test]
    fn pending_member_status_mentions_upgrade() {
        let store = installed_cluster();
        let unit = member(&store, 1, old_build(), "rev2");
        let status = unit.unit_status().unwrap().unwrap();
        assert!(status.message().contains("rev1 (upgrade pending)"), "{}", status.message());
    }
}
