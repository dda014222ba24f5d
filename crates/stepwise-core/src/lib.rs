pub mod config;
pub mod error;
pub mod registry;
pub mod types;
pub mod version;

pub use config::StepwiseConfig;
pub use error::{ConfigError, VersionError};
pub use registry::VersionRegistry;
pub use types::*;
