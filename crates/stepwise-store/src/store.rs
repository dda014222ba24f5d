//! PeerStore — redb-backed shared key space for upgrade coordination.
//!
//! Two scopes: one string map per registered member and one application
//! map. The store itself enforces nothing about who writes what; ownership
//! rules live in [`crate::Coordination`]. Supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use stepwise_core::Ordinal;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::tables::*;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe coordination store backed by redb.
#[derive(Clone)]
pub struct PeerStore {
    db: Arc<Database>,
}

impl PeerStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "coordination store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory coordination store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(MEMBERS).map_err(map_err!(Table))?;
        txn.open_table(MEMBER_FIELDS).map_err(map_err!(Table))?;
        txn.open_table(APP_FIELDS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Membership ─────────────────────────────────────────────────

    /// Register a member scope. Re-joining keeps existing fields.
    pub fn join(&self, ordinal: Ordinal, name: &str) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(MEMBERS).map_err(map_err!(Table))?;
            table.insert(ordinal, name).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(ordinal, %name, "member joined coordination scope");
        Ok(())
    }

    /// Remove a member and every field in its scope. Returns true if it existed.
    pub fn leave(&self, ordinal: Ordinal) -> StoreResult<bool> {
        let prefix = member_prefix(ordinal);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut members = txn.open_table(MEMBERS).map_err(map_err!(Table))?;
            existed = members.remove(ordinal).map_err(map_err!(Write))?.is_some();

            let mut fields = txn.open_table(MEMBER_FIELDS).map_err(map_err!(Table))?;
            let mut keys = Vec::new();
            for entry in fields.iter().map_err(map_err!(Read))? {
                let (key, _) = entry.map_err(map_err!(Read))?;
                let key = key.value().to_string();
                if key.starts_with(&prefix) {
                    keys.push(key);
                }
            }
            for key in &keys {
                fields.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(ordinal, existed, "member left coordination scope");
        Ok(existed)
    }

    /// All registered members as `(ordinal, name)`, lowest ordinal first.
    pub fn members(&self) -> StoreResult<Vec<(Ordinal, String)>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MEMBERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            results.push((key.value(), value.value().to_string()));
        }
        Ok(results)
    }

    pub fn is_member(&self, ordinal: Ordinal) -> StoreResult<bool> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MEMBERS).map_err(map_err!(Table))?;
        Ok(table.get(ordinal).map_err(map_err!(Read))?.is_some())
    }

    // ── Member scope ───────────────────────────────────────────────

    pub fn member_field(&self, ordinal: Ordinal, field: &str) -> StoreResult<Option<String>> {
        let key = member_key(ordinal, field);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(MEMBER_FIELDS).map_err(map_err!(Table))?;
        Ok(table
            .get(key.as_str())
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string()))
    }

    /// Set a field in a registered member's scope.
    pub fn set_member_field(&self, ordinal: Ordinal, field: &str, value: &str) -> StoreResult<()> {
        let key = member_key(ordinal, field);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let members = txn.open_table(MEMBERS).map_err(map_err!(Table))?;
            if members.get(ordinal).map_err(map_err!(Read))?.is_none() {
                return Err(StoreError::NotJoined(ordinal));
            }
            let mut table = txn.open_table(MEMBER_FIELDS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, %value, "member field stored");
        Ok(())
    }

    // ── Application scope ──────────────────────────────────────────

    pub fn app_field(&self, field: &str) -> StoreResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(APP_FIELDS).map_err(map_err!(Table))?;
        Ok(table
            .get(field)
            .map_err(map_err!(Read))?
            .map(|guard| guard.value().to_string()))
    }

    pub fn set_app_field(&self, field: &str, value: &str) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(APP_FIELDS).map_err(map_err!(Table))?;
            table.insert(field, value).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%field, %value, "app field stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_are_listed_in_ordinal_order() {
        let store = PeerStore::open_in_memory().unwrap();
        store.join(2, "db/2").unwrap();
        store.join(0, "db/0").unwrap();
        store.join(10, "db/10").unwrap();

        let members = store.members().unwrap();
        let ordinals: Vec<_> = members.iter().map(|(o, _)| *o).collect();
        assert_eq!(ordinals, vec![0, 2, 10]);
        assert_eq!(members[1].1, "db/2");
    }

    #[test]
    fn member_fields_round_trip() {
        let store = PeerStore::open_in_memory().unwrap();
        store.join(1, "db/1").unwrap();

        assert!(store.member_field(1, "state").unwrap().is_none());
        store.set_member_field(1, "state", "healthy").unwrap();
        assert_eq!(store.member_field(1, "state").unwrap().as_deref(), Some("healthy"));

        store.set_member_field(1, "state", "upgrading").unwrap();
        assert_eq!(store.member_field(1, "state").unwrap().as_deref(), Some("upgrading"));
    }

    #[test]
    fn writing_without_joining_is_rejected() {
        let store = PeerStore::open_in_memory().unwrap();
        let err = store.set_member_field(3, "state", "healthy").unwrap_err();
        assert!(matches!(err, StoreError::NotJoined(3)));
        assert!(err.is_unavailable());
    }

    #[test]
    fn leave_drops_only_that_members_scope() {
        let store = PeerStore::open_in_memory().unwrap();
        store.join(1, "db/1").unwrap();
        store.join(12, "db/12").unwrap();
        store.set_member_field(1, "state", "healthy").unwrap();
        store.set_member_field(12, "state", "outdated").unwrap();

        assert!(store.leave(1).unwrap());
        assert!(!store.is_member(1).unwrap());
        assert!(store.member_field(1, "state").unwrap().is_none());
        assert_eq!(store.member_field(12, "state").unwrap().as_deref(), Some("outdated"));
        assert!(!store.leave(1).unwrap());
    }

    #[test]
    fn leave_removes_every_field_in_scope() {
        let store = PeerStore::open_in_memory().unwrap();
        for ordinal in [0, 1, 2] {
            store.join(ordinal, &format!("db/{ordinal}")).unwrap();
            for field in ["state", "workload_version", "workload_container_version"] {
                store.set_member_field(ordinal, field, "x").unwrap();
            }
        }

        assert!(store.leave(1).unwrap());
        for field in ["state", "workload_version", "workload_container_version"] {
            assert!(store.member_field(1, field).unwrap().is_none(), "{field} survived");
            assert_eq!(store.member_field(0, field).unwrap().as_deref(), Some("x"));
            assert_eq!(store.member_field(2, field).unwrap().as_deref(), Some("x"));
        }

        // Re-joining starts from an empty scope.
        store.join(1, "db/1").unwrap();
        assert!(store.member_field(1, "state").unwrap().is_none());
    }

    #[test]
    fn app_fields_round_trip() {
        let store = PeerStore::open_in_memory().unwrap();
        assert!(store.app_field("versions").unwrap().is_none());
        store.set_app_field("versions", "{}").unwrap();
        assert_eq!(store.app_field("versions").unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn clones_share_the_same_database() {
        let store = PeerStore::open_in_memory().unwrap();
        let other = store.clone();
        store.join(0, "db/0").unwrap();
        store.set_member_field(0, "workload_container_version", "rev5").unwrap();
        assert_eq!(
            other.member_field(0, "workload_container_version").unwrap().as_deref(),
            Some("rev5")
        );
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = PeerStore::open(&db_path).unwrap();
            store.join(0, "db/0").unwrap();
            store.set_app_field("partition", "0").unwrap();
        }

        let store = PeerStore::open(&db_path).unwrap();
        assert!(store.is_member(0).unwrap());
        assert_eq!(store.app_field("partition").unwrap().as_deref(), Some("0"));
    }
}
