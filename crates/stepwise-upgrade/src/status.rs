//! Human-facing statuses derived from coordinator state.
//!
//! Hosts truncate long status lines, so every message built here stays
//! under [`MAX_STATUS_LEN`] characters; long identifiers are shortened.

use serde::Serialize;

use stepwise_health::PrecheckReason;

/// Upper bound on status message length, in characters.
pub const MAX_STATUS_LEN: usize = 120;

pub const RESUME_ACTION: &str = "resume-upgrade";

/// A status with its severity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Status {
    Active(String),
    Maintenance(String),
    Waiting(String),
    /// Needs operator action before anything else happens.
    Blocked(String),
}

impl Status {
    pub fn message(&self) -> &str {
        match self {
            Status::Active(m) | Status::Maintenance(m) | Status::Waiting(m) | Status::Blocked(m) => m,
        }
    }

    pub fn is_blocking(&self) -> bool {
        matches!(self, Status::Blocked(_))
    }
}

/// Shorten an identifier to at most `max` characters.
pub fn short_id(id: &str, max: usize) -> String {
    if id.chars().count() <= max {
        return id.to_string();
    }
    let mut short: String = id.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}

pub fn precheck_failed(reason: PrecheckReason) -> Status {
    Status::Blocked(format!(
        "Rollback to the previous revision. Pre-upgrade check failed: {reason}"
    ))
}

pub fn incompatible() -> Status {
    Status::Blocked("Upgrade incompatible. Rollback to the previous revision".to_string())
}

/// Upgrade started but the operator has not confirmed the first member yet.
pub fn awaiting_resume(member_count: usize) -> Status {
    let resume = if member_count > 1 {
        format!("Verify highest member is healthy & run `{RESUME_ACTION}` action. ")
    } else {
        String::new()
    };
    Status::Blocked(format!(
        "Upgrading. {resume}To rollback, deploy the last revision"
    ))
}

pub fn upgrading() -> Status {
    Status::Maintenance("Upgrading. To rollback, deploy the previous revision".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_fit_status_line() {
        let statuses = [
            precheck_failed(PrecheckReason::DependentClusterFailed),
            precheck_failed(PrecheckReason::ClusterUnhealthy),
            incompatible(),
            awaiting_resume(3),
            awaiting_resume(1),
            upgrading(),
        ];
        for status in statuses {
            assert!(
                status.message().chars().count() < MAX_STATUS_LEN,
                "too long: {}",
                status.message()
            );
        }
    }

    #[test]
    fn resume_hint_only_with_peers() {
        assert!(awaiting_resume(2).message().contains(RESUME_ACTION));
        assert!(!awaiting_resume(1).message().contains(RESUME_ACTION));
        assert!(awaiting_resume(1).is_blocking());
        assert!(!upgrading().is_blocking());
    }

    #[test]
    fn short_id_truncates_by_chars() {
        assert_eq!(short_id("rev117", 12), "rev117");
        assert_eq!(short_id("sha256:0123456789abcdef", 12), "sha256:0123…");
        assert_eq!(short_id("sha256:0123456789abcdef", 12).chars().count(), 12);
    }

    #[test]
    fn serializes_with_kind_tag() {
        let json = serde_json::to_string(&upgrading()).unwrap();
        assert!(json.starts_with(r#"{"kind":"maintenance","message":"#));
    }
}
