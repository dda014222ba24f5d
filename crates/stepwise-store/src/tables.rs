//! redb table definitions for the coordination store.
//!
//! Values are plain strings; structured records are JSON-encoded by the
//! coordination adapter. Member fields use composite `{ordinal}:{field}` keys
//! so a member's whole scope can be found by prefix.

use redb::TableDefinition;

/// Registered members keyed by ordinal, value is the member name.
pub const MEMBERS: TableDefinition<u32, &str> = TableDefinition::new("members");

/// Member-scoped fields keyed by `{ordinal}:{field}`.
pub const MEMBER_FIELDS: TableDefinition<&str, &str> = TableDefinition::new("member_fields");

/// Application-scoped fields keyed by field name.
pub const APP_FIELDS: TableDefinition<&str, &str> = TableDefinition::new("app_fields");

pub(crate) fn member_key(ordinal: u32, field: &str) -> String {
    format!("{ordinal}:{field}")
}

pub(crate) fn member_prefix(ordinal: u32) -> String {
    format!("{ordinal}:")
}
