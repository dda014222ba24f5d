//! Typed coordination adapter over [`PeerStore`].
//!
//! A `Coordination` is bound to one member. It can write that member's own
//! fields, read any member's fields, and read application fields; writing
//! application fields requires leadership. Nothing here retries: an absent
//! key is returned as `None`.

use serde::{Deserialize, Serialize};
use stepwise_core::{Ordinal, UnitState, VersionRecord};
use tracing::warn;

use crate::error::{StoreError, StoreResult};
use crate::store::PeerStore;

pub const STATE_FIELD: &str = "state";
pub const WORKLOAD_CONTAINER_VERSION_FIELD: &str = "workload_container_version";
pub const WORKLOAD_VERSION_FIELD: &str = "workload_version";

pub const VERSIONS_FIELD: &str = "versions";
pub const UPGRADE_RESUMED_FIELD: &str = "upgrade_resumed";
pub const PARTITION_FIELD: &str = "partition";

/// Operator confirmation that the first upgraded member looks good.
///
/// Bound to the workload build it was given for, so a confirmation for an
/// earlier upgrade never carries over to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeLatch {
    pub target: String,
    pub resumed: bool,
}

/// Coordination store access on behalf of a single member.
#[derive(Clone)]
pub struct Coordination {
    store: PeerStore,
    ordinal: Ordinal,
    leader: bool,
}

impl Coordination {
    /// Bind to `ordinal`. Fails with `NotJoined` until the member has a scope.
    pub fn attach(store: PeerStore, ordinal: Ordinal, leader: bool) -> StoreResult<Self> {
        if !store.is_member(ordinal)? {
            return Err(StoreError::NotJoined(ordinal));
        }
        Ok(Self {
            store,
            ordinal,
            leader,
        })
    }

    pub fn ordinal(&self) -> Ordinal {
        self.ordinal
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    /// Ordinals of all members, this one included, lowest first.
    pub fn members(&self) -> StoreResult<Vec<Ordinal>> {
        Ok(self
            .store
            .members()?
            .into_iter()
            .map(|(ordinal, _)| ordinal)
            .collect())
    }

    // ── Own member scope ───────────────────────────────────────────

    pub fn unit_state(&self) -> StoreResult<Option<UnitState>> {
        self.member_state(self.ordinal)
    }

    pub fn set_unit_state(&self, state: UnitState) -> StoreResult<()> {
        self.store
            .set_member_field(self.ordinal, STATE_FIELD, state.as_str())
    }

    pub fn workload_container_version(&self) -> StoreResult<Option<String>> {
        self.member_workload_container_version(self.ordinal)
    }

    pub fn set_workload_container_version(&self, version: &str) -> StoreResult<()> {
        self.store
            .set_member_field(self.ordinal, WORKLOAD_CONTAINER_VERSION_FIELD, version)
    }

    pub fn workload_version(&self) -> StoreResult<Option<String>> {
        self.member_workload_version(self.ordinal)
    }

    pub fn set_workload_version(&self, version: &str) -> StoreResult<()> {
        self.store
            .set_member_field(self.ordinal, WORKLOAD_VERSION_FIELD, version)
    }

    // ── Any member (read-only) ─────────────────────────────────────

    /// A member's published state. Unknown tags read as unset.
    pub fn member_state(&self, ordinal: Ordinal) -> StoreResult<Option<UnitState>> {
        let Some(raw) = self.store.member_field(ordinal, STATE_FIELD)? else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(ordinal, error = %e, "ignoring unreadable member state");
                Ok(None)
            }
        }
    }

    pub fn member_workload_container_version(&self, ordinal: Ordinal) -> StoreResult<Option<String>> {
        self.store
            .member_field(ordinal, WORKLOAD_CONTAINER_VERSION_FIELD)
    }

    pub fn member_workload_version(&self, ordinal: Ordinal) -> StoreResult<Option<String>> {
        self.store.member_field(ordinal, WORKLOAD_VERSION_FIELD)
    }

    // ── Application scope ──────────────────────────────────────────

    /// Whether a versions record exists at all, readable or not.
    pub fn versions_recorded(&self) -> StoreResult<bool> {
        Ok(self.store.app_field(VERSIONS_FIELD)?.is_some())
    }

    /// The recorded versions. A corrupt record reads as one with both axes
    /// missing, which every compatibility check rejects.
    pub fn versions(&self) -> StoreResult<Option<VersionRecord>> {
        let Some(raw) = self.store.app_field(VERSIONS_FIELD)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!(error = %e, %raw, "recorded versions are malformed");
                Ok(Some(VersionRecord {
                    controller_version: None,
                    workload_version: None,
                }))
            }
        }
    }

    pub fn set_versions(&self, record: &VersionRecord) -> StoreResult<()> {
        self.require_leader(VERSIONS_FIELD)?;
        let value = serde_json::to_string(record).map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.store.set_app_field(VERSIONS_FIELD, &value)
    }

    pub fn resume_latch(&self) -> StoreResult<Option<ResumeLatch>> {
        let Some(raw) = self.store.app_field(UPGRADE_RESUMED_FIELD)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(latch) => Ok(Some(latch)),
            Err(e) => {
                warn!(error = %e, %raw, "resume latch is malformed, treating as not resumed");
                Ok(None)
            }
        }
    }

    pub fn set_resume_latch(&self, latch: &ResumeLatch) -> StoreResult<()> {
        self.require_leader(UPGRADE_RESUMED_FIELD)?;
        let value = serde_json::to_string(latch).map_err(|e| StoreError::Serialize(e.to_string()))?;
        self.store.set_app_field(UPGRADE_RESUMED_FIELD, &value)
    }

    pub fn partition(&self) -> StoreResult<Option<Ordinal>> {
        let Some(raw) = self.store.app_field(PARTITION_FIELD)? else {
            return Ok(None);
        };
        match raw.parse() {
            Ok(partition) => Ok(Some(partition)),
            Err(e) => {
                warn!(error = %e, %raw, "partition is malformed");
                Ok(None)
            }
        }
    }

    pub fn set_partition(&self, partition: Ordinal) -> StoreResult<()> {
        self.require_leader(PARTITION_FIELD)?;
        self.store
            .set_app_field(PARTITION_FIELD, &partition.to_string())
    }

    fn require_leader(&self, field: &str) -> StoreResult<()> {
        if self.leader {
            Ok(())
        } else {
            Err(StoreError::NotLeader(field.to_string()))
        }
    }
}
