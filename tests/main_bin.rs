//! Integration tests that lock main-binary startup behavior and smoke paths.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_path(label: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("volguard-bin-{label}-{nanos}.json"))
}

#[test]
fn once_pass_caps_new_sessions_and_writes_state() {
    let bin = env!("CARGO_BIN_EXE_volguard");
    let state = temp_path("smoke");
    let output = Command::new(bin)
        .arg("--once")
        .arg("--no-log-file")
        .arg("--state-file")
        .arg(&state)
        .env("VOLGUARD_SESSIONS", "game.exe=0.50,player.exe=0.02")
        .output()
        .expect("run volguard");
    assert!(output.status.success());

    let raw = std::fs::read_to_string(&state).expect("state file written");
    let volumes: BTreeMap<String, f32> = serde_json::from_str(&raw).expect("state json");
    assert_eq!(volumes.get("game.exe"), Some(&0.03));
    assert_eq!(volumes.get("player.exe"), Some(&0.02));
    let _ = std::fs::remove_file(&state);
}

#[test]
fn once_pass_with_no_sessions_succeeds_without_state() {
    let bin = env!("CARGO_BIN_EXE_volguard");
    let state = temp_path("empty");
    let output = Command::new(bin)
        .arg("--once")
        .arg("--no-log-file")
        .arg("--state-file")
        .arg(&state)
        .env("VOLGUARD_SESSIONS", "")
        .output()
        .expect("run volguard");
    assert!(output.status.success());
    // Nothing learned means nothing to persist.
    assert!(!state.exists());
}

#[test]
fn rejects_out_of_range_threshold() {
    let bin = env!("CARGO_BIN_EXE_volguard");
    let output = Command::new(bin)
        .arg("--once")
        .arg("--no-log-file")
        .arg("--default-threshold")
        .arg("1.5")
        .env("VOLGUARD_SESSIONS", "game.exe=0.50")
        .output()
        .expect("run volguard");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("default threshold"));
}

#[test]
fn reports_status_line_on_startup() {
    let bin = env!("CARGO_BIN_EXE_volguard");
    let state = temp_path("status");
    let output = Command::new(bin)
        .arg("--once")
        .arg("--no-log-file")
        .arg("--state-file")
        .arg(&state)
        .env("VOLGUARD_SESSIONS", "game.exe=0.50")
        .output()
        .expect("run volguard");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[volguard] running"));
    let _ = std::fs::remove_file(&state);
}
