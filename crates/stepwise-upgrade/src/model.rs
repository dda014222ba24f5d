//! The capability set every deployment model supplies.
//!
//! Shared rules (what "in progress" and "resumed" mean) are provided
//! methods; the rest is model-specific. Models hold no coordination state
//! of their own and read everything through the [`UpgradeBase`].

use std::collections::BTreeMap;

use stepwise_core::{DeploymentModel, Ordinal, UnitState};
use stepwise_health::{ClusterHealth, WorkloadController};
use tracing::debug;

use crate::error::UpgradeResult;
use crate::status::{Status, short_id};
use crate::upgrade::UpgradeBase;

/// Operator request to continue past the first upgraded member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resume {
    /// Ignore member health (not versions) when deciding who goes next.
    pub force: bool,
}

pub trait UpgradeModel: Send + Sync {
    fn kind(&self) -> DeploymentModel;

    /// Identifier of the workload build the application should converge on.
    fn app_workload_container_version(&self, base: &UpgradeBase) -> String {
        base.registry().workload_container_version().to_string()
    }

    /// Published workload build per member. Members that have not published
    /// one yet are absent.
    fn unit_workload_container_versions(
        &self,
        base: &UpgradeBase,
    ) -> UpgradeResult<BTreeMap<Ordinal, String>> {
        base.published_container_versions()
    }

    /// This member's upgrade state.
    fn unit_state(&self, base: &UpgradeBase) -> UpgradeResult<Option<UnitState>> {
        Ok(base.coordination().unit_state()?)
    }

    /// Whether any member runs a different build than the application target.
    fn in_progress(&self, base: &UpgradeBase) -> UpgradeResult<bool> {
        let target = self.app_workload_container_version(base);
        let versions = self.unit_workload_container_versions(base)?;
        debug!(%target, ?versions, "checking upgrade progress");
        Ok(versions.values().any(|version| *version != target))
    }

    /// Whether the operator confirmed the first member for the current target.
    fn upgrade_resumed(&self, base: &UpgradeBase) -> UpgradeResult<bool> {
        base.resumed_for(&self.app_workload_container_version(base))
    }

    /// Whether the recorded versions admit the upgrade this member sees.
    fn is_compatible(&self, base: &UpgradeBase) -> UpgradeResult<bool> {
        base.is_compatible()
    }

    /// Status shown for this member while an upgrade is in progress.
    fn unit_healthy_status(&self, base: &UpgradeBase) -> UpgradeResult<Status>;

    /// Bring this member's published fields in line with what it runs.
    fn settle(&self, base: &UpgradeBase, workload: &dyn WorkloadController) -> UpgradeResult<()>;

    /// Leader-side gate adjustment; with `resume`, the operator confirmation.
    /// Returns a message for the operator when handling a resume.
    fn reconcile_partition(
        &self,
        base: &UpgradeBase,
        resume: Option<Resume>,
    ) -> UpgradeResult<Option<String>>;

    /// Whether this member may replace its workload now.
    fn authorized(&self, base: &UpgradeBase, cluster: &dyn ClusterHealth) -> UpgradeResult<bool>;

    /// Move this member onto the target build.
    fn upgrade_unit(
        &self,
        base: &UpgradeBase,
        workload: &dyn WorkloadController,
    ) -> UpgradeResult<()>;
}

/// "<workload> running; revision <rev>[ <note>]; controller <version>"
pub(crate) fn running_status(
    base: &UpgradeBase,
    revision: &str,
    note: Option<&str>,
) -> UpgradeResult<Status> {
    let workload = base
        .coordination()
        .workload_version()?
        .unwrap_or_else(|| base.registry().workload_version().to_string());
    let note = note.map(|n| format!(" {n}")).unwrap_or_default();
    Ok(Status::Active(format!(
        "Workload {} running; revision {}{note}; controller {}",
        short_id(&workload, 16),
        short_id(revision, 16),
        short_id(base.registry().controller_version(), 24),
    )))
}
