// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gateway status`: report whether the daemon is running and, if so, its
//! deep status (spec §6.1).

use clap::Args;
use serde_json::json;

use gwd_gateway::config::Config;
use gwd_storage::pidfile::load_record;
use gwd_storage::TokenStore;

use crate::client::GatewayClient;
use crate::daemon_process;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct StatusArgs {}

pub async fn run(config: Config, _args: StatusArgs, format: OutputFormat) -> anyhow::Result<()> {
    let Some(record) = load_record(&config.pid_file)? else {
        output::emit(format, "brewva.gateway.status.v1", json!({ "running": false }), |_| {
            println!("gateway is not running")
        });
        return Ok(());
    };

    if !daemon_process::process_exists(record.pid) {
        output::emit(
            format,
            "brewva.gateway.status.v1",
            json!({ "running": false, "stale_pid": record.pid }),
            |_| println!("gateway is not running (stale pid record: {})", record.pid),
        );
        return Ok(());
    }

    let token = TokenStore::new(config.token_file.clone()).load()?;
    let Some(token) = token else {
        output::emit(
            format,
            "brewva.gateway.status.v1",
            json!({ "running": true, "pid": record.pid, "reachable": false }),
            |_| println!("gateway running (pid: {}) but no auth token found", record.pid),
        );
        return Ok(());
    };

    let mut client = GatewayClient::connect(&record.host, record.port, &token, config.max_payload_bytes).await?;
    let deep = client.call("status.deep", json!({})).await?;

    let mut payload = json!({ "running": true, "pid": record.pid, "host": record.host, "port": record.port });
    if let (Some(target), Some(source)) = (payload.as_object_mut(), deep.as_object()) {
        for (key, value) in source {
            target.insert(key.clone(), value.clone());
        }
    }

    output::emit(format, "brewva.gateway.status.v1", payload, |v| {
        println!(
            "gateway running (pid: {}, {}:{}) — {} workers, {} sessions",
            record.pid,
            record.host,
            record.port,
            v.get("workers").and_then(|w| w.as_u64()).unwrap_or(0),
            v.get("sessions").and_then(|s| s.as_array()).map(|s| s.len()).unwrap_or(0),
        )
    });
    Ok(())
}
