// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gatewayd: the agent gateway daemon binary.
//!
//! Architecture:
//! - Listener task: one task per TCP connection, dispatching requests
//!   against shared state
//! - Background tasks: idle-session reaper, heartbeat tick loop, intent
//!   tick loop, supervisor-event pump
//!
//! Typically started by the `gateway` CLI's `start`/`--detach`, not
//! invoked directly.

use std::sync::Arc;

use gwd_core::clock::SystemClock;
use gwd_storage::pidfile::PidFileError;
use gwd_worker::ChildWorkerAdapter;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

use gwd_gateway::config::Config;
use gwd_gateway::lifecycle::{self, LifecycleError};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("gatewayd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("gatewayd {}", env!("CARGO_PKG_VERSION"));
                println!("Agent gateway daemon - owns the control-plane TCP listener");
                println!();
                println!("USAGE:");
                println!("    gatewayd");
                println!();
                println!("Typically started by the `gateway` CLI; not invoked directly.");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: gatewayd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;

    gwd_storage::logger::rotate_log_if_needed(&config.log_file);
    let _log_guards = gwd_storage::logger::setup_logging(&config.log_file, config.mirror_stdout)?;

    info!(host = %config.host, port = config.port, "starting gateway daemon");

    let startup = match lifecycle::startup(config, Arc::new(ChildWorkerAdapter), Arc::new(SystemClock)).await {
        Ok(s) => s,
        Err(LifecycleError::PidLock(PidFileError::AlreadyRunning(pid))) => {
            eprintln!("gatewayd is already running (pid: {pid})");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "failed to start gateway daemon");
            return Err(e.into());
        }
    };

    let state = startup.state;
    let listener = startup.listener;
    let pid_lock = startup.pid_lock;

    let mut handles = lifecycle::spawn_background_tasks(&state, startup.supervisor_events);

    let listener_state = state.clone();
    handles.push(tokio::spawn(async move {
        if let Err(error) = gwd_gateway::listener::run(listener_state, listener).await {
            error!(%error, "listener accept loop exited");
        }
    }));

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(port = state.config.port, "gateway daemon ready");
    println!("READY");

    tokio::select! {
        _ = state.shutdown.notified() => {
            info!("shutdown requested via gateway.stop");
        }
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down");
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down");
        }
    }

    for handle in handles {
        handle.abort();
    }
    pid_lock.release();
    info!("gateway daemon stopped");
    Ok(())
}
