//! Error types for the Stepwise coordination store.

use stepwise_core::Ordinal;
use thiserror::Error;

/// Result type alias for coordination store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during coordination store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    /// The member has no scope in the store yet (or has left it).
    #[error("member {0} has not joined the coordination scope")]
    NotJoined(Ordinal),

    /// Application-scoped fields are writable by the leader only.
    #[error("only the leader may write application field {0:?}")]
    NotLeader(String),
}

impl StoreError {
    /// Whether the caller should simply wait for the next signal.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::NotJoined(_) | StoreError::Open(_))
    }
}
