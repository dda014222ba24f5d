//! Error types for version metadata and configuration.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading or parsing software versions.
#[derive(Debug, Error)]
pub enum VersionError {
    #[error("failed to read build metadata {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("build metadata {0} is empty")]
    Empty(PathBuf),

    #[error("invalid version {raw:?}: {source}")]
    Parse { raw: String, source: semver::Error },
}

/// Errors loading `stepwise.toml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
