//! stepwise-upgrade — rolling-upgrade coordinator.
//!
//! One `Upgrade` runs per member. It derives the upgrade state from the
//! coordination store on every call and decides whether this member may
//! replace its workload now.
//!
//! # Components
//!
//! - **`upgrade`** — Shared coordinator: compatibility, ordering, phases, statuses
//! - **`model`** — Capability trait each deployment model implements
//! - **`individual`** — Members upgrade themselves, highest ordinal first
//! - **`fleet`** — The platform restarts members down to a published partition
//! - **`driver`** — One idempotent evaluation per external signal
//! - **`status`** — Operator-facing status lines

pub mod driver;
pub mod error;
pub mod fleet;
pub mod individual;
pub mod model;
pub mod status;
pub mod upgrade;

#[cfg(test)]
pub(crate) mod testing;

pub use driver::{Evaluation, evaluate, snapshot};
pub use error::{UpgradeError, UpgradeResult};
pub use model::{Resume, UpgradeModel};
pub use status::Status;
pub use upgrade::{Upgrade, UpgradeBase, UpgradePhase};
