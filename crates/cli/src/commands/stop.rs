// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gateway stop`: request graceful shutdown, escalating to SIGTERM/SIGKILL
//! if the daemon doesn't exit in time (spec §6.1).

use std::time::{Duration, Instant};

use clap::Args;
use serde_json::json;

use gwd_gateway::config::Config;
use gwd_storage::pidfile::load_record;
use gwd_storage::TokenStore;

use crate::client::GatewayClient;
use crate::daemon_process;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StopArgs {
    /// Skip the graceful RPC and send SIGTERM (then SIGKILL) directly.
    #[arg(long)]
    pub force: bool,

    /// How long to wait for the process to exit before escalating.
    #[arg(long, default_value_t = 5_000)]
    pub timeout_ms: u64,
}

pub async fn run(config: Config, args: StopArgs, format: OutputFormat) -> anyhow::Result<()> {
    let Some(record) = load_record(&config.pid_file)? else {
        output::emit(format, "brewva.gateway.stop.v1", json!({ "stopped": false, "was_running": false }), |_| {
            println!("gateway is not running")
        });
        return Ok(());
    };

    if !daemon_process::process_exists(record.pid) {
        output::emit(
            format,
            "brewva.gateway.stop.v1",
            json!({ "stopped": false, "was_running": false, "stale_pid": record.pid }),
            |_| println!("gateway is not running (stale pid record: {})", record.pid),
        );
        return Ok(());
    }

    if !args.force {
        if let Ok(Some(token)) = TokenStore::new(config.token_file.clone()).load() {
            if let Ok(mut client) = GatewayClient::connect(&record.host, record.port, &token, config.max_payload_bytes).await {
                let _ = client.call("gateway.stop", json!({ "reason": "cli" })).await;
            }
        }
    }

    let mut deadline = Instant::now() + Duration::from_millis(args.timeout_ms);
    let mut escalated = false;
    loop {
        if !daemon_process::process_exists(record.pid) {
            break;
        }
        if Instant::now() >= deadline {
            if !escalated {
                daemon_process::terminate(record.pid);
                escalated = true;
                deadline = Instant::now() + Duration::from_secs(2);
                continue;
            }
            daemon_process::force_kill(record.pid);
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    output::emit(
        format,
        "brewva.gateway.stop.v1",
        json!({ "stopped": true, "was_running": true, "pid": record.pid }),
        |_| println!("gateway stopped (pid: {})", record.pid),
    );
    Ok(())
}
