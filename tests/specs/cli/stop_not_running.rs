use crate::prelude::StateDir;

#[test]
fn stop_is_a_no_op_when_nothing_is_running() {
    let state = StateDir::new();
    let output = state.cmd(&["stop"]).output().expect("run gateway stop");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("not running"), "stdout was: {stdout}");
}
