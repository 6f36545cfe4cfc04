// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gateway start`: spawn (or run in place) the gateway daemon (spec §6.1).

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Args;
use serde_json::json;
use tokio::signal::unix::{signal, SignalKind};

use gwd_core::clock::SystemClock;
use gwd_gateway::config::Config;
use gwd_gateway::lifecycle;
use gwd_storage::pidfile::load_record;
use gwd_worker::ChildWorkerAdapter;

use crate::daemon_process;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Run the daemon in this process instead of spawning `gatewayd`.
    #[arg(long)]
    pub foreground: bool,

    /// Host to bind; must resolve to a loopback address.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind; 0 lets the OS choose.
    #[arg(long)]
    pub port: Option<u16>,

    /// How long to wait for the daemon to become reachable, in milliseconds.
    #[arg(long)]
    pub wait_ms: Option<u64>,
}

pub async fn run(config: Config, args: StartArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut config = config;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    let wait = Duration::from_millis(args.wait_ms.unwrap_or(config.wait_ms));

    if let Some(record) = load_record(&config.pid_file)? {
        if daemon_process::process_exists(record.pid) {
            output::emit(
                format,
                "brewva.gateway.start.v1",
                json!({ "status": "already_running", "pid": record.pid, "host": record.host, "port": record.port }),
                |_| println!("gateway already running (pid: {}, {}:{})", record.pid, record.host, record.port),
            );
            return Ok(());
        }
    }

    if args.foreground {
        println!("starting gateway in foreground on {}:{}", config.host, config.port);
        let startup = lifecycle::startup(config, Arc::new(ChildWorkerAdapter), Arc::new(SystemClock))
            .await
            .context("failed to start gateway")?;
        let state = startup.state;
        let listener = startup.listener;
        let pid_lock = startup.pid_lock;
        let mut handles = lifecycle::spawn_background_tasks(&state, startup.supervisor_events);

        let listener_state = state.clone();
        handles.push(tokio::spawn(async move {
            let _ = gwd_gateway::listener::run(listener_state, listener).await;
        }));

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        println!("READY");

        tokio::select! {
            _ = state.shutdown.notified() => {}
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }

        for handle in handles {
            handle.abort();
        }
        pid_lock.release();
        return Ok(());
    }

    let overrides: Vec<(&str, String)> = vec![
        ("GATEWAY_HOST", config.host.clone()),
        ("GATEWAY_PORT", config.port.to_string()),
        ("GATEWAY_STATE_DIR", config.state_dir.display().to_string()),
    ];
    let child = daemon_process::spawn_background(&overrides)?;
    daemon_process::wait_until_reachable(&config.host, config.port, child, wait).await?;

    let record = load_record(&config.pid_file)?.context("gateway started but wrote no pid record")?;
    output::emit(
        format,
        "brewva.gateway.start.v1",
        json!({ "status": "started", "pid": record.pid, "host": record.host, "port": record.port }),
        |_| println!("gateway started (pid: {}, {}:{})", record.pid, record.host, record.port),
    );
    Ok(())
}
