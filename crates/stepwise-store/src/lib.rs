//! stepwise-store — shared coordination state for rolling upgrades.
//!
//! Backed by [redb](https://docs.rs/redb), provides a two-scoped string key
//! space: one map per cluster member and one application-wide map.
//!
//! # Architecture
//!
//! - **`PeerStore`** — raw scopes. `Clone` + `Send` + `Sync` (backed by
//!   `Arc<Database>`), on-disk or in-memory.
//! - **`Coordination`** — typed view bound to one member: writes its own
//!   fields, reads everyone's, writes application fields only as leader.
//!
//! Every key has exactly one writer, so last-write-wins needs no locking.

pub mod coordination;
pub mod error;
pub mod store;
pub mod tables;

pub use coordination::{Coordination, ResumeLatch};
pub use error::{StoreError, StoreResult};
pub use store::PeerStore;
