use crate::prelude::StateDir;

#[test]
fn status_reports_not_running_against_a_fresh_state_dir() {
    let state = StateDir::new();
    let output = state.cmd(&["status"]).output().expect("run gateway status");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("not running"), "stdout was: {stdout}");
}

#[test]
fn status_json_reports_running_false() {
    let state = StateDir::new();
    let output = state.cmd(&["status", "-o", "json"]).output().expect("run gateway status");
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(value["running"], false);
    assert_eq!(value["schema"], "brewva.gateway.status.v1");
}
