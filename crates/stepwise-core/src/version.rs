//! Version parsing and upgrade compatibility rules.
//!
//! An upgrade is compatible iff, on both the controller and the workload
//! axis independently, the current version is not older than the recorded
//! one and shares its major version. The controller axis ignores build
//! metadata (`1.2.0+git.abc` compares as `1.2.0`); the workload axis is
//! compared exactly as recorded.

use std::fmt;

use semver::Version;
use thiserror::Error;

use crate::error::VersionError;
use crate::types::VersionRecord;

/// Which independently versioned component a check refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Controller,
    Workload,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Controller => f.write_str("controller"),
            Axis::Workload => f.write_str("workload"),
        }
    }
}

/// Reason an upgrade from the recorded versions is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Incompatibility {
    #[error("no versions recorded")]
    NotRecorded,

    #[error("{0} version missing from recorded versions")]
    MissingAxis(Axis),

    #[error("{axis} version {raw:?} is not a valid version")]
    Unparseable { axis: Axis, raw: String },

    #[error("{axis} version {current} is older than {previous}")]
    Downgrade {
        axis: Axis,
        previous: Version,
        current: Version,
    },

    #[error("{axis} major version changed from {previous} to {current}")]
    MajorChange {
        axis: Axis,
        previous: Version,
        current: Version,
    },
}

/// Parse a version, padding missing minor/patch components with zero.
pub fn parse_version(raw: &str) -> Result<Version, VersionError> {
    let raw = raw.trim();
    if let Ok(version) = Version::parse(raw) {
        return Ok(version);
    }
    let split = raw.find(|c: char| c == '-' || c == '+').unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(split);
    let missing = 2usize.saturating_sub(core.matches('.').count());
    let padded = format!("{core}{}{suffix}", ".0".repeat(missing));
    Version::parse(&padded).map_err(|source| VersionError::Parse {
        raw: raw.to_string(),
        source,
    })
}

/// Drop a `+build` suffix.
pub fn strip_build_metadata(raw: &str) -> &str {
    raw.split('+').next().unwrap_or(raw)
}

/// Check whether moving from `previous` to the current versions is allowed.
pub fn check_compatible(
    previous: Option<&VersionRecord>,
    current_controller: &str,
    current_workload: &str,
) -> Result<(), Incompatibility> {
    let previous = previous.ok_or(Incompatibility::NotRecorded)?;

    let previous_controller = previous
        .controller_version
        .as_deref()
        .ok_or(Incompatibility::MissingAxis(Axis::Controller))?;
    let previous_workload = previous
        .workload_version
        .as_deref()
        .ok_or(Incompatibility::MissingAxis(Axis::Workload))?;

    check_axis(
        Axis::Controller,
        strip_build_metadata(previous_controller),
        strip_build_metadata(current_controller),
    )?;
    check_axis(Axis::Workload, previous_workload, current_workload)
}

/// Workload axis only, for builds whose controller version is not known
/// (peers that publish just their workload version).
pub fn check_workload_compatible(
    previous: Option<&VersionRecord>,
    current_workload: &str,
) -> Result<(), Incompatibility> {
    let previous = previous.ok_or(Incompatibility::NotRecorded)?;
    let previous_workload = previous
        .workload_version
        .as_deref()
        .ok_or(Incompatibility::MissingAxis(Axis::Workload))?;
    check_axis(Axis::Workload, previous_workload, current_workload)
}

fn check_axis(axis: Axis, previous: &str, current: &str) -> Result<(), Incompatibility> {
    let parse = |raw: &str| {
        parse_version(raw).map_err(|_| Incompatibility::Unparseable {
            axis,
            raw: raw.to_string(),
        })
    };
    let previous = parse(previous)?;
    let current = parse(current)?;

    if previous.major != current.major {
        return Err(Incompatibility::MajorChange {
            axis,
            previous,
            current,
        });
    }
    if previous > current {
        return Err(Incompatibility::Downgrade {
            axis,
            previous,
            current,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(controller: &str, workload: &str) -> VersionRecord {
        VersionRecord::new(controller, workload)
    }

    #[test]
    fn pads_short_versions() {
        assert_eq!(parse_version("6.0").unwrap(), Version::new(6, 0, 0));
        assert_eq!(parse_version("7").unwrap(), Version::new(7, 0, 0));
        assert_eq!(parse_version(" 1.2.3\n").unwrap(), Version::new(1, 2, 3));
        assert_eq!(
            parse_version("1.2+git.ab12").unwrap().build.as_str(),
            "git.ab12"
        );
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn minor_and_patch_upgrades_are_compatible() {
        let previous = record("2.0.0", "6.0.6");
        assert!(check_compatible(Some(&previous), "2.1.0", "6.0.6").is_ok());
        assert!(check_compatible(Some(&previous), "2.0.0", "6.1.0").is_ok());
        assert!(check_compatible(Some(&previous), "2.0.0", "6.0.6").is_ok());
    }

    #[test]
    fn regression_on_either_axis_is_incompatible() {
        let previous = record("2.1.0", "6.0.6");
        assert!(matches!(
            check_compatible(Some(&previous), "2.0.9", "6.0.6"),
            Err(Incompatibility::Downgrade {
                axis: Axis::Controller,
                ..
            })
        ));
        assert!(matches!(
            check_compatible(Some(&previous), "2.1.0", "6.0.5"),
            Err(Incompatibility::Downgrade {
                axis: Axis::Workload,
                ..
            })
        ));
    }

    #[test]
    fn workload_only_check_ignores_controller() {
        let previous = record("2.0.0", "6.0.6");
        assert!(check_workload_compatible(Some(&previous), "6.1.0").is_ok());
        assert!(matches!(
            check_workload_compatible(Some(&previous), "7.0.0"),
            Err(Incompatibility::MajorChange {
                axis: Axis::Workload,
                ..
            })
        ));
        assert_eq!(
            check_workload_compatible(None, "6.0.6"),
            Err(Incompatibility::NotRecorded)
        );
    }

    #[test]
    fn major_change_is_incompatible_in_both_directions() {
        let previous = record("2.0.0", "6.0.6");
        assert!(matches!(
            check_compatible(Some(&previous), "3.0.0", "6.0.6"),
            Err(Incompatibility::MajorChange { .. })
        ));
        assert!(matches!(
            check_compatible(Some(&previous), "2.0.0", "7.0.0"),
            Err(Incompatibility::MajorChange {
                axis: Axis::Workload,
                ..
            })
        ));
    }

    #[test]
    fn missing_record_or_axis_fails_closed() {
        assert_eq!(
            check_compatible(None, "2.0.0", "6.0.6"),
            Err(Incompatibility::NotRecorded)
        );
        let partial = VersionRecord {
            controller_version: Some("2.0.0".to_string()),
            workload_version: None,
        };
        assert_eq!(
            check_compatible(Some(&partial), "2.0.0", "6.0.6"),
            Err(Incompatibility::MissingAxis(Axis::Workload))
        );
        let garbage = record("two", "6.0.6");
        assert!(matches!(
            check_compatible(Some(&garbage), "2.0.0", "6.0.6"),
            Err(Incompatibility::Unparseable { .. })
        ));
    }

    #[test]
    fn controller_build_metadata_is_ignored() {
        let previous = record("2.1.0+git.ffff", "6.0.6");
        assert!(check_compatible(Some(&previous), "2.1.0+git.0000", "6.0.6").is_ok());
    }

    #[test]
    fn workload_build_metadata_is_compared() {
        // semver orders build metadata lexically as a final tiebreak.
        let previous = record("2.0.0", "6.0.6+b");
        assert!(check_compatible(Some(&previous), "2.0.0", "6.0.6+a").is_err());
        assert!(check_compatible(Some(&previous), "2.0.0", "6.0.6+c").is_ok());
    }
}
