//! stepwise.toml configuration parser.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{ClusterRole, DeploymentModel, Ordinal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepwiseConfig {
    pub member: MemberConfig,
    #[serde(default)]
    pub upgrade: UpgradeConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberConfig {
    pub ordinal: Ordinal,
    pub name: Option<String>,
    /// Whether this member currently holds leadership. The platform decides
    /// this; `--leader` on the command line overrides it.
    #[serde(default)]
    pub leader: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeConfig {
    #[serde(default)]
    pub model: DeploymentModel,
    #[serde(default)]
    pub role: ClusterRole,
    /// Directory holding the build metadata files.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Directory holding the coordination store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            model: DeploymentModel::default(),
            role: ClusterRole::default(),
            build_dir: default_build_dir(),
            data_dir: default_data_dir(),
        }
    }
}

/// Commands implementing the cluster and workload collaborators.
///
/// Each hook is an argv vector; exit status 0 means success.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub cluster_healthy: Vec<String>,
    /// `{ordinal}` in any argument is replaced with the target ordinal.
    #[serde(default)]
    pub move_primary: Vec<String>,
    #[serde(default)]
    pub read_write: Vec<String>,
    #[serde(default)]
    pub dependents_ready: Vec<String>,
    #[serde(default)]
    pub workload_healthy: Vec<String>,
    #[serde(default)]
    pub restart_workload: Vec<String>,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Backoff for `cluster_healthy` while waiting for the cluster to settle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
        }
    }
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("/var/lib/stepwise/build")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/stepwise")
}

impl StepwiseConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: StepwiseConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.upgrade.role == ClusterRole::Coordinator && self.hooks.dependents_ready.is_empty() {
            return Err(ConfigError::Invalid(
                "role = \"coordinator\" requires hooks.dependents_ready".to_string(),
            ));
        }
        if self.upgrade.model == DeploymentModel::Individual
            && self.hooks.restart_workload.is_empty()
        {
            return Err(ConfigError::Invalid(
                "model = \"individual\" requires hooks.restart_workload".to_string(),
            ));
        }
        if self.hooks.retry.attempts == 0 {
            return Err(ConfigError::Invalid(
                "hooks.retry.attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Display name of this member, `member/<ordinal>` unless configured.
    pub fn member_name(&self) -> String {
        self.member
            .name
            .clone()
            .unwrap_or_else(|| format!("member/{}", self.member.ordinal))
    }

    /// Path of the coordination store file.
    pub fn store_path(&self) -> PathBuf {
        self.upgrade.data_dir.join("stepwise.redb")
    }
}
