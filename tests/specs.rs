//! Behavioral specifications for the `gateway` CLI.
//!
//! Black-box: invokes the CLI binary and verifies stdout, stderr, and exit
//! codes. See tests/specs/prelude.rs for conventions.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

#[path = "specs/prelude.rs"]
mod prelude;

#[path = "specs/cli/help.rs"]
mod cli_help;
#[path = "specs/cli/status_not_running.rs"]
mod cli_status_not_running;
#[path = "specs/cli/stop_not_running.rs"]
mod cli_stop_not_running;
