//! End-to-end rolling upgrades driven through the `stepwised` binary.
//!
//! Every member shares one data directory; hooks are `true`/`false` so
//! the cluster and workload answer deterministically.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn build(&self, name: &str, version: &str, container: &str) -> PathBuf {
        let build = self.dir.path().join("builds").join(name);
        std::fs::create_dir_all(&build).unwrap();
        std::fs::write(build.join("controller_version"), format!("{version}\n")).unwrap();
        std::fs::write(build.join("workload_version"), version).unwrap();
        std::fs::write(build.join("workload_container_version"), container).unwrap();
        build
    }

    fn config(&self, ordinal: u32, model: &str, build: &Path, cluster_healthy: &str) -> PathBuf {
        let build_name = build.file_name().unwrap().to_string_lossy();
        let path = self
            .dir
            .path()
            .join(format!("member-{ordinal}-{build_name}-{cluster_healthy}.toml"));
        let content = format!(
            r#"
[member]
ordinal = {ordinal}
name = "db/{ordinal}"
leader = {leader}

[upgrade]
model = "{model}"
build_dir = "{build}"
data_dir = "{data}"

[hooks]
cluster_healthy = ["{cluster_healthy}"]
move_primary = ["true", "{{ordinal}}"]
read_write = ["true"]
workload_healthy = ["true"]
restart_workload = ["true"]

[hooks.retry]
attempts = 1
base_delay_ms = 1
max_delay_ms = 1
"#,
            leader = ordinal == 0,
            build = build.display(),
            data = self.dir.path().join("data").display(),
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    fn configs(&self, n: u32, model: &str, build: &Path) -> Vec<PathBuf> {
        (0..n).map(|o| self.config(o, model, build, "true")).collect()
    }
}

fn stepwised(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stepwised"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn ok(config: &Path, args: &[&str]) -> String {
    let output = stepwised(config, args);
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout).unwrap()
}

fn json(config: &Path, args: &[&str]) -> Value {
    serde_json::from_str(&ok(config, args)).unwrap()
}

fn failure(config: &Path, args: &[&str]) -> String {
    let output = stepwised(config, args);
    assert!(!output.status.success(), "{args:?} unexpectedly succeeded");
    String::from_utf8(output.stderr).unwrap()
}

#[test]
fn individual_members_upgrade_highest_first() {
    let fx = Fixture::new();
    let v1 = fx.build("v1", "2.0.0", "rev1");
    let v2 = fx.build("v2", "2.1.0", "rev2");

    let old = fx.configs(3, "individual", &v1);
    for config in &old {
        ok(config, &["join"]);
        json(config, &["evaluate"]);
    }
    assert_eq!(json(&old[0], &["status"])["phase"], "idle");

    let new = fx.configs(3, "individual", &v2);
    assert_eq!(json(&new[0], &["evaluate"])["authorized"], false);
    assert_eq!(json(&new[1], &["evaluate"])["authorized"], false);
    let highest = json(&new[2], &["evaluate"]);
    assert_eq!(highest["upgraded"], true);
    assert_eq!(highest["unit_state"], "healthy");

    let leader = json(&new[0], &["status"]);
    assert_eq!(leader["phase"], "awaiting-resume");
    assert_eq!(leader["app_status"]["kind"], "blocked");

    assert!(failure(&new[1], &["resume-upgrade"]).contains("must run on the leader"));
    assert_eq!(ok(&new[0], &["resume-upgrade"]).trim(), "Upgrade resumed.");
    assert!(failure(&new[0], &["resume-upgrade"]).contains("already resumed"));

    assert_eq!(json(&new[1], &["evaluate"])["upgraded"], true);
    assert_eq!(json(&new[0], &["evaluate"])["upgraded"], true);

    let done = json(&new[0], &["evaluate"]);
    assert_eq!(done["phase"], "idle");
    assert!(done["app_status"].is_null());
}

#[test]
fn unjoined_member_waits_quietly() {
    let fx = Fixture::new();
    let v1 = fx.build("v1", "2.0.0", "rev1");
    let config = fx.config(1, "individual", &v1, "true");
    assert!(ok(&config, &["evaluate"]).is_empty());
    assert!(ok(&config, &["status"]).is_empty());
}

#[test]
fn failed_health_gate_blocks_highest_member() {
    let fx = Fixture::new();
    let v1 = fx.build("v1", "2.0.0", "rev1");
    let v2 = fx.build("v2", "2.1.0", "rev2");
    for config in fx.configs(2, "individual", &v1) {
        ok(&config, &["join"]);
        json(&config, &["evaluate"]);
    }

    let leader = fx.config(0, "individual", &v1, "false");
    assert!(failure(&leader, &["pre-upgrade-check"]).contains("cluster is not healthy"));

    let highest = fx.config(1, "individual", &v2, "false");
    let evaluation = json(&highest, &["evaluate"]);
    assert_eq!(evaluation["upgraded"], false);
    assert_eq!(evaluation["precheck"], "cluster-unhealthy");
    assert_eq!(evaluation["unit_status"]["kind"], "blocked");

    // The operator can still push the member through.
    ok(&highest, &["force-upgrade"]);
    assert_eq!(json(&highest, &["status"])["unit_state"], "healthy");
}

#[test]
fn fleet_resume_refused_until_highest_restarts() {
    let fx = Fixture::new();
    let v1 = fx.build("v1", "2.0.0", "rev1");
    let configs = fx.configs(2, "fleet", &v1);
    for config in &configs {
        ok(config, &["join"]);
        json(config, &["evaluate"]);
    }

    let status = json(&configs[0], &["--target-revision", "rev2", "status"]);
    assert_eq!(status["phase"], "in-progress");
    assert_eq!(status["model"], "fleet");

    let refused = failure(
        &configs[0],
        &["--target-revision", "rev2", "resume-upgrade", "--force"],
    );
    assert!(refused.contains("Highest member is unhealthy"));

    let highest = json(&configs[1], &["--target-revision", "rev2", "evaluate"]);
    assert_eq!(highest["authorized"], true);
    assert_eq!(highest["unit_state"], "restarting");
}
