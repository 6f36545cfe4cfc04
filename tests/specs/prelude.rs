//! Test helpers for behavioral specifications.
//!
//! Black-box: invokes the `gateway` CLI binary and checks stdout/stderr/exit
//! codes against a throwaway state directory.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;

/// Resolves the built `gateway` CLI binary, matching `cargo test`'s layout.
fn binary_path(name: &str) -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));

    let standard = manifest_dir.join("target/debug").join(name);
    if standard.exists() {
        return standard;
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(debug_dir) = exe.parent().and_then(|d| d.parent()) {
            let fallback = debug_dir.join(name);
            if fallback.exists() {
                return fallback;
            }
        }
    }

    standard
}

pub fn gateway_binary() -> PathBuf {
    binary_path("gateway")
}

/// A disposable `$GATEWAY_STATE_DIR` for one test, cleaned up on drop.
pub struct StateDir {
    dir: TempDir,
}

impl StateDir {
    pub fn new() -> Self {
        Self { dir: tempfile::tempdir().expect("tempdir") }
    }

    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }

    pub fn cmd(&self, args: &[&str]) -> Command {
        let mut command = Command::new(gateway_binary());
        command.args(args);
        command.env("GATEWAY_STATE_DIR", self.dir.path());
        command
    }
}
