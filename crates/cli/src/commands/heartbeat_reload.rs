// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gateway heartbeat-reload`: re-read the heartbeat policy file without
//! restarting the daemon (spec §6.1).

use anyhow::Context as _;
use clap::Args;
use serde_json::json;

use gwd_gateway::config::Config;
use gwd_storage::pidfile::load_record;
use gwd_storage::TokenStore;

use crate::client::GatewayClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct HeartbeatReloadArgs {}

pub async fn run(config: Config, _args: HeartbeatReloadArgs, format: OutputFormat) -> anyhow::Result<()> {
    let record = load_record(&config.pid_file)?.context("gateway is not running")?;
    let token = TokenStore::new(config.token_file.clone())
        .load()?
        .context("no auth token found")?;

    let mut client = GatewayClient::connect(&record.host, record.port, &token, config.max_payload_bytes).await?;
    let payload = client.call("heartbeat.reload", json!({})).await?;

    output::emit(format, "brewva.gateway.heartbeat-reload.v1", payload, |v| {
        println!(
            "reloaded {} heartbeat rule(s) from {}",
            v.get("rule_count").and_then(|n| n.as_u64()).unwrap_or(0),
            v.get("source_path").and_then(|p| p.as_str()).unwrap_or("?"),
        )
    });
    Ok(())
}
