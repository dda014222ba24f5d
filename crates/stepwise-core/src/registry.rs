//! Version registry — the versions this member was built with.
//!
//! Read once from the build metadata directory shipped with the controller:
//!
//! ```text
//! <build_dir>/controller_version          e.g. 1.4.0+git.3f2a
//! <build_dir>/workload_version            e.g. 6.0.6
//! <build_dir>/workload_container_version  e.g. rev117 / sha256:…
//! ```
//!
//! A missing or unparseable file is a packaging defect, so `load` fails
//! rather than falling back to defaults.

use std::path::{Path, PathBuf};

use semver::Version;
use tracing::debug;

use crate::error::VersionError;
use crate::types::VersionRecord;
use crate::version::{parse_version, strip_build_metadata};

pub const CONTROLLER_VERSION_FILE: &str = "controller_version";
pub const WORKLOAD_VERSION_FILE: &str = "workload_version";
pub const WORKLOAD_CONTAINER_VERSION_FILE: &str = "workload_container_version";

/// Immutable view of the local build's version identifiers.
#[derive(Debug, Clone)]
pub struct VersionRegistry {
    controller_raw: String,
    controller: Version,
    workload_raw: String,
    workload: Version,
    workload_container: String,
}

impl VersionRegistry {
    /// Load all identifiers from `build_dir`.
    pub fn load(build_dir: &Path) -> Result<Self, VersionError> {
        let controller = read_trimmed(&build_dir.join(CONTROLLER_VERSION_FILE))?;
        let workload = read_trimmed(&build_dir.join(WORKLOAD_VERSION_FILE))?;
        let container = read_trimmed(&build_dir.join(WORKLOAD_CONTAINER_VERSION_FILE))?;
        let registry = Self::from_parts(&controller, &workload, &container)?;
        debug!(
            controller = %registry.controller_raw,
            workload = %registry.workload_raw,
            container = %registry.workload_container,
            "version registry loaded"
        );
        Ok(registry)
    }

    /// Build a registry from already-known identifiers.
    pub fn from_parts(
        controller: &str,
        workload: &str,
        workload_container: &str,
    ) -> Result<Self, VersionError> {
        Ok(Self {
            controller: parse_version(strip_build_metadata(controller))?,
            controller_raw: controller.trim().to_string(),
            workload: parse_version(workload)?,
            workload_raw: workload.trim().to_string(),
            workload_container: workload_container.trim().to_string(),
        })
    }

    /// Controller version exactly as shipped, build metadata included.
    pub fn controller_version(&self) -> &str {
        &self.controller_raw
    }

    pub fn controller(&self) -> &Version {
        &self.controller
    }

    pub fn workload_version(&self) -> &str {
        &self.workload_raw
    }

    pub fn workload(&self) -> &Version {
        &self.workload
    }

    /// Identifier of the workload build bundled with this controller.
    pub fn workload_container_version(&self) -> &str {
        &self.workload_container
    }

    /// The record the leader persists once an upgrade to this build completes.
    pub fn record(&self) -> VersionRecord {
        VersionRecord::new(&self.controller_raw, &self.workload_raw)
    }
}

fn read_trimmed(path: &Path) -> Result<String, VersionError> {
    let content = std::fs::read_to_string(path).map_err(|source| VersionError::Read {
        path: PathBuf::from(path),
        source,
    })?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(VersionError::Empty(PathBuf::from(path)));
    }
    Ok(trimmed.to_string())
}
