use crate::prelude::gateway_binary;
use std::process::Command;

#[test]
fn help_lists_every_subcommand() {
    let output = Command::new(gateway_binary()).arg("--help").output().expect("run gateway --help");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for name in ["start", "status", "stop", "heartbeat-reload", "rotate-token", "logs"] {
        assert!(stdout.contains(name), "--help missing {name}: {stdout}");
    }
}

#[test]
fn version_flag_prints_version() {
    let output = Command::new(gateway_binary()).arg("--version").output().expect("run gateway --version");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}
