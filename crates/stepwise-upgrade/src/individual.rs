//! Individual deployment model.
//!
//! Every member replaces its own workload. The highest ordinal goes first
//! behind the health gate, the next one waits for the operator's resume,
//! and the rest follow as soon as everything above them is upgraded and
//! healthy.

use stepwise_core::{DeploymentModel, UnitState};
use stepwise_health::{ClusterHealth, WorkloadController};
use tracing::{debug, info, warn};

use crate::error::UpgradeResult;
use crate::model::{Resume, UpgradeModel, running_status};
use crate::status::{Status, short_id};
use crate::upgrade::UpgradeBase;

pub struct IndividualModel;

impl IndividualModel {
    fn publish_current(&self, base: &UpgradeBase) -> UpgradeResult<()> {
        let coordination = base.coordination();
        coordination.set_workload_container_version(&self.app_workload_container_version(base))?;
        coordination.set_workload_version(base.registry().workload_version())?;
        Ok(())
    }
}

impl UpgradeModel for IndividualModel {
    fn kind(&self) -> DeploymentModel {
        DeploymentModel::Individual
    }

    fn unit_state(&self, base: &UpgradeBase) -> UpgradeResult<Option<UnitState>> {
        let own = base.coordination().workload_container_version()?;
        if own.is_some_and(|v| v != self.app_workload_container_version(base)) {
            return Ok(Some(UnitState::Outdated));
        }
        Ok(base.coordination().unit_state()?)
    }

    fn unit_healthy_status(&self, base: &UpgradeBase) -> UpgradeResult<Status> {
        let target = self.app_workload_container_version(base);
        match self.unit_state(base)? {
            Some(UnitState::Upgrading) => Ok(Status::Maintenance(format!(
                "Upgrading workload to revision {}",
                short_id(&target, 16)
            ))),
            Some(UnitState::Outdated) => {
                let own = base
                    .coordination()
                    .workload_container_version()?
                    .unwrap_or_default();
                running_status(base, &own, Some("(outdated)"))
            }
            _ => running_status(base, &target, None),
        }
    }

    fn settle(&self, base: &UpgradeBase, workload: &dyn WorkloadController) -> UpgradeResult<()> {
        let coordination = base.coordination();
        let target = self.app_workload_container_version(base);
        match coordination.workload_container_version()? {
            None => {
                // First install: the workload was installed from this build.
                self.publish_current(base)?;
                coordination.set_unit_state(UnitState::Healthy)?;
                info!(ordinal = base.ordinal(), version = %target, "published installed version");
            }
            Some(own) if own == target => {
                let state = coordination.unit_state()?;
                if matches!(state, None | Some(UnitState::Upgrading)) && workload.is_workload_healthy()
                {
                    coordination.set_unit_state(UnitState::Healthy)?;
                    debug!(ordinal = base.ordinal(), "workload healthy on target");
                }
            }
            Some(_) => {}
        }
        Ok(())
    }

    fn reconcile_partition(
        &self,
        base: &UpgradeBase,
        resume: Option<Resume>,
    ) -> UpgradeResult<Option<String>> {
        let Some(resume) = resume else {
            return Ok(None);
        };
        let latch = stepwise_store::ResumeLatch {
            target: self.app_workload_container_version(base),
            resumed: true,
        };
        base.coordination().set_resume_latch(&latch)?;
        debug!(target = %latch.target, force = resume.force, "resume latch set");
        Ok(Some("Upgrade resumed.".to_string()))
    }

    fn authorized(&self, base: &UpgradeBase, cluster: &dyn ClusterHealth) -> UpgradeResult<bool> {
        let coordination = base.coordination();
        let target = self.app_workload_container_version(base);
        if coordination.workload_container_version()?.as_deref() == Some(target.as_str()) {
            return Ok(false);
        }
        if let Err(reason) = base.compatibility()? {
            warn!(%reason, "upgrade incompatible; not authorizing");
            return Ok(false);
        }

        let own = base.ordinal();
        for (index, &ordinal) in base.sorted_members()?.iter().enumerate() {
            if ordinal == own {
                return match index {
                    0 => {
                        if base.is_rollback()? {
                            info!("rolling back to recorded controller; skipping health gate");
                        } else {
                            base.run_health_gate(cluster)?;
                        }
                        Ok(true)
                    }
                    1 => self.upgrade_resumed(base),
                    _ => Ok(true),
                };
            }
            let upgraded = coordination
                .member_workload_container_version(ordinal)?
                .is_some_and(|v| v == target);
            let healthy = coordination.member_state(ordinal)? == Some(UnitState::Healthy);
            if !upgraded || !healthy {
                debug!(ordinal, upgraded, healthy, "waiting on higher member");
                return Ok(false);
            }
        }
        Ok(false)
    }

    fn upgrade_unit(
        &self,
        base: &UpgradeBase,
        workload: &dyn WorkloadController,
    ) -> UpgradeResult<()> {
        let coordination = base.coordination();
        coordination.set_unit_state(UnitState::Upgrading)?;
        info!(
            ordinal = base.ordinal(),
            target = %self.app_workload_container_version(base),
            "upgrading workload"
        );
        workload.restart_or_reinstall_workload()?;
        self.publish_current(base)?;
        if workload.is_workload_healthy() {
            coordination.set_unit_state(UnitState::Healthy)?;
            info!(ordinal = base.ordinal(), "workload upgraded");
        } else {
            warn!(ordinal = base.ordinal(), "workload unhealthy after upgrade");
        }
        Ok(())
    }
}
