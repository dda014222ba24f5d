//! Per-signal evaluation.
//!
//! Every external signal (membership change, configuration change, a
//! timer tick) runs the same idempotent pass: settle this member's fields,
//! let the leader maintain shared state, then upgrade this member if it is
//! its turn.

use serde::Serialize;
use stepwise_core::{DeploymentModel, Ordinal, UnitState};
use stepwise_health::{ClusterHealth, PrecheckReason, WorkloadController};
use tracing::{debug, info, warn};

use crate::error::{UpgradeError, UpgradeResult};
use crate::status::{self, Status};
use crate::upgrade::{Upgrade, UpgradePhase};

/// Outcome of one evaluation, as reported to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub ordinal: Ordinal,
    pub model: DeploymentModel,
    pub phase: UpgradePhase,
    pub target: String,
    pub unit_state: Option<UnitState>,
    pub unit_status: Option<Status>,
    pub app_status: Option<Status>,
    /// `None` when this member had nothing to upgrade.
    pub authorized: Option<bool>,
    pub upgraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precheck: Option<PrecheckReason>,
    /// Why the workload replacement failed, when it did.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Read-only view of the coordinator; never writes to the store.
pub fn snapshot(upgrade: &Upgrade) -> UpgradeResult<Evaluation> {
    Ok(Evaluation {
        ordinal: upgrade.base().ordinal(),
        model: upgrade.kind(),
        phase: upgrade.phase()?,
        target: upgrade.app_workload_container_version(),
        unit_state: upgrade.unit_state()?,
        unit_status: upgrade.unit_status()?,
        app_status: upgrade.app_status()?,
        authorized: None,
        upgraded: false,
        precheck: None,
        failure: None,
    })
}

/// Run one full evaluation for this member.
pub fn evaluate(
    upgrade: &Upgrade,
    cluster: &dyn ClusterHealth,
    workload: &dyn WorkloadController,
) -> UpgradeResult<Evaluation> {
    upgrade.settle(workload)?;

    if upgrade.base().is_leader() {
        // A first install recorded mid-upgrade would bless the new build;
        // stay unrecorded and let the status fail closed instead.
        let recordable = matches!(
            upgrade.phase()?,
            UpgradePhase::NoUpgradeRecorded | UpgradePhase::Complete
        );
        if recordable && !upgrade.in_progress()? {
            upgrade.record_versions()?;
        }
        upgrade.reconcile_partition()?;
    }

    let mut authorized = None;
    let mut upgraded = false;
    let mut precheck = None;
    let mut failure = None;
    if awaiting_own_upgrade(upgrade)? {
        match upgrade.authorized(cluster) {
            Ok(true) => {
                authorized = Some(true);
                match upgrade.upgrade_unit(workload) {
                    Ok(()) => upgraded = true,
                    Err(UpgradeError::Workload(e)) => {
                        warn!(error = %e, "workload upgrade failed; retrying on next evaluation");
                        failure = Some(e.to_string());
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(false) => {
                debug!(ordinal = upgrade.base().ordinal(), "not this member's turn");
                authorized = Some(false);
            }
            Err(UpgradeError::NotReady(failed)) => {
                warn!(reason = %failed.reason, "pre-upgrade check failed; upgrade blocked");
                authorized = Some(false);
                precheck = Some(failed.reason);
            }
            Err(e) => return Err(e),
        }
    }

    let mut evaluation = snapshot(upgrade)?;
    evaluation.authorized = authorized;
    evaluation.upgraded = upgraded;
    evaluation.failure = failure;
    if let Some(reason) = precheck {
        evaluation.unit_status = Some(status::precheck_failed(reason));
        evaluation.precheck = Some(reason);
    }
    info!(
        ordinal = evaluation.ordinal,
        phase = ?evaluation.phase,
        upgraded,
        "evaluation complete"
    );
    Ok(evaluation)
}

fn awaiting_own_upgrade(upgrade: &Upgrade) -> UpgradeResult<bool> {
    if !upgrade.versions_set()? || !upgrade.in_progress()? {
        return Ok(false);
    }
    let state = upgrade.unit_state()?;
    Ok(match upgrade.kind() {
        DeploymentModel::Individual => state == Some(UnitState::Outdated),
        DeploymentModel::Fleet => {
            let own = upgrade.base().coordination().workload_container_version()?;
            state != Some(UnitState::Restarting)
                && own.as_deref() != Some(upgrade.app_workload_container_version().as_str())
        }
    })
}
