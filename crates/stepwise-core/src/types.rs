//! Shared types used across Stepwise crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Position of a member in the cluster. Immutable for the member's lifetime.
pub type Ordinal = u32;

/// Upgrade lifecycle tag a member publishes about itself.
///
/// Each deployment model uses a subset: fleet-managed members move between
/// `Healthy` and `Restarting`, individually-managed members between
/// `Healthy`, `Upgrading` and `Outdated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    Healthy,
    Restarting,
    Upgrading,
    Outdated,
}

#[derive(Debug, Error)]
#[error("unknown unit state: {0}")]
pub struct UnknownUnitState(pub String);

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Healthy => "healthy",
            UnitState::Restarting => "restarting",
            UnitState::Upgrading => "upgrading",
            UnitState::Outdated => "outdated",
        }
    }
}

impl FromStr for UnitState {
    type Err = UnknownUnitState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "healthy" => Ok(UnitState::Healthy),
            "restarting" => Ok(UnitState::Restarting),
            "upgrading" => Ok(UnitState::Upgrading),
            "outdated" => Ok(UnitState::Outdated),
            other => Err(UnknownUnitState(other.to_string())),
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Controller and workload versions recorded after a successful upgrade.
///
/// Both axes are optional on the wire so that a record written by an older
/// controller (or hand-edited) still deserializes; a missing axis makes any
/// upgrade from it incompatible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workload_version: Option<String>,
}

impl VersionRecord {
    pub fn new(controller_version: &str, workload_version: &str) -> Self {
        Self {
            controller_version: Some(controller_version.to_string()),
            workload_version: Some(workload_version.to_string()),
        }
    }
}

/// How members of a deployment get their workload replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentModel {
    /// The hosting platform restarts members onto the new build; the
    /// coordinator only publishes how far down the ordinals it may go.
    Fleet,
    /// Every member replaces its own workload once authorized.
    #[default]
    Individual,
}

impl DeploymentModel {
    pub fn label(&self) -> &'static str {
        match self {
            DeploymentModel::Fleet => "fleet",
            DeploymentModel::Individual => "individual",
        }
    }
}

/// Role of this deployment within a larger topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterRole {
    /// A plain replicated cluster.
    #[default]
    ReplicaSet,
    /// Top-level coordinator of dependent sub-clusters.
    Coordinator,
}
