//! Member context — everything one invocation needs to act for a member.
//!
//! The coordination store is opened per operation and dropped right after,
//! so several members sharing one data directory never hold the file lock
//! across evaluations.

use std::path::Path;

use anyhow::Context;
use stepwise_core::{DeploymentModel, StepwiseConfig, VersionRegistry};
use stepwise_health::CommandHooks;
use stepwise_store::{Coordination, PeerStore};
use stepwise_upgrade::{Evaluation, Upgrade, UpgradeBase};
use tracing::{debug, info};

/// Command-line overrides applied on top of stepwise.toml.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub ordinal: Option<u32>,
    pub leader: Option<bool>,
    pub target_revision: Option<String>,
}

pub struct Member {
    config: StepwiseConfig,
    target_revision: Option<String>,
}

impl Member {
    pub fn load(path: &Path, overrides: Overrides) -> anyhow::Result<Self> {
        let mut config = StepwiseConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?;
        if let Some(ordinal) = overrides.ordinal {
            config.member.ordinal = ordinal;
        }
        if let Some(leader) = overrides.leader {
            config.member.leader = leader;
        }
        debug!(
            ordinal = config.member.ordinal,
            leader = config.member.leader,
            model = config.upgrade.model.label(),
            "config loaded"
        );
        Ok(Self {
            config,
            target_revision: overrides.target_revision,
        })
    }

    pub fn config(&self) -> &StepwiseConfig {
        &self.config
    }

    pub fn hooks(&self) -> CommandHooks {
        CommandHooks::new(self.config.hooks.clone())
    }

    pub fn open_store(&self) -> anyhow::Result<PeerStore> {
        let data_dir = &self.config.upgrade.data_dir;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("creating data dir {}", data_dir.display()))?;
        let path = self.config.store_path();
        let store = PeerStore::open(&path)?;
        debug!(path = %path.display(), "coordination store opened");
        Ok(store)
    }

    pub fn join(&self) -> anyhow::Result<()> {
        let name = self.config.member_name();
        self.open_store()?.join(self.config.member.ordinal, &name)?;
        info!(ordinal = self.config.member.ordinal, %name, "joined");
        Ok(())
    }

    pub fn leave(&self) -> anyhow::Result<bool> {
        let left = self.open_store()?.leave(self.config.member.ordinal)?;
        info!(ordinal = self.config.member.ordinal, left, "left");
        Ok(left)
    }

    /// Build the coordinator. `None` when this member has no coordination
    /// scope yet; callers report that and try again on the next signal.
    pub fn coordinator(&self, store: PeerStore) -> anyhow::Result<Option<Upgrade>> {
        let member = &self.config.member;
        let coordination = match Coordination::attach(store, member.ordinal, member.leader) {
            Ok(coordination) => coordination,
            Err(e) if e.is_unavailable() => {
                info!(
                    ordinal = member.ordinal,
                    reason = %e,
                    "coordination unavailable; cannot proceed yet"
                );
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let registry = VersionRegistry::load(&self.config.upgrade.build_dir)?;
        let base = UpgradeBase::new(coordination, registry, self.config.upgrade.role);
        Ok(Some(match self.config.upgrade.model {
            DeploymentModel::Individual => Upgrade::individual(base),
            DeploymentModel::Fleet => Upgrade::fleet(base, self.target_revision.clone()),
        }))
    }

    /// Open the store and run `f` against this member's coordinator.
    pub fn with_coordinator<T>(
        &self,
        f: impl FnOnce(&Upgrade) -> anyhow::Result<T>,
    ) -> anyhow::Result<Option<T>> {
        let store = self.open_store()?;
        match self.coordinator(store)? {
            Some(upgrade) => f(&upgrade).map(Some),
            None => Ok(None),
        }
    }

    /// One evaluation pass with the configured hooks.
    pub fn evaluate(&self) -> anyhow::Result<Option<Evaluation>> {
        let hooks = self.hooks();
        self.with_coordinator(|upgrade| Ok(stepwise_upgrade::evaluate(upgrade, &hooks, &hooks)?))
    }
}
