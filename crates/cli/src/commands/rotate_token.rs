// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gateway rotate-token`: issue a fresh auth token, revoking every
//! connection authenticated under the old one (spec §6.1).

use anyhow::Context as _;
use clap::Args;
use serde_json::json;

use gwd_gateway::config::Config;
use gwd_storage::pidfile::load_record;
use gwd_storage::TokenStore;

use crate::client::GatewayClient;
use crate::output::{self, OutputFormat};

#[derive(Debug, Args)]
pub struct RotateTokenArgs {}

pub async fn run(config: Config, _args: RotateTokenArgs, format: OutputFormat) -> anyhow::Result<()> {
    let record = load_record(&config.pid_file)?.context("gateway is not running")?;
    let token_store = TokenStore::new(config.token_file.clone());
    let old_token = token_store.load()?.context("no auth token found")?;

    let mut client = GatewayClient::connect(&record.host, record.port, &old_token, config.max_payload_bytes).await?;
    let mut payload = client.call("gateway.rotate-token", json!({})).await?;

    let new_token = token_store.load()?.context("gateway did not persist the rotated token")?;
    if let Some(map) = payload.as_object_mut() {
        map.insert("token".to_string(), json!(new_token));
    }

    output::emit(format, "brewva.gateway.rotate-token.v1", payload, |v| {
        println!(
            "token rotated, {} connection(s) revoked",
            v.get("revoked_connections").and_then(|n| n.as_u64()).unwrap_or(0),
        );
        println!("new token: {new_token}");
    });
    Ok(())
}
