// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gateway`: the CLI front-end to the gateway daemon (spec §6.1).

mod client;
mod commands;
mod daemon_process;
mod output;

use clap::{Parser, Subcommand};

use gwd_gateway::config::Config;

use crate::output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "gateway", version, about = "Control the agent gateway daemon")]
struct Cli {
    /// Output format for every subcommand.
    #[arg(short, long, value_enum, default_value = "text", global = true)]
    output: OutputFormat,

    /// Override the gateway state directory (default: $GATEWAY_STATE_DIR or ~/.gateway).
    #[arg(long, global = true)]
    state_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Start the gateway daemon.
    Start(commands::start::StartArgs),
    /// Report whether the gateway daemon is running.
    Status(commands::status::StatusArgs),
    /// Stop the gateway daemon.
    Stop(commands::stop::StopArgs),
    /// Reload the heartbeat policy file without restarting.
    HeartbeatReload(commands::heartbeat_reload::HeartbeatReloadArgs),
    /// Rotate the auth token, revoking every current connection.
    RotateToken(commands::rotate_token::RotateTokenArgs),
    /// Print the gateway's log file.
    Logs(commands::logs::LogsArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.state_dir {
        Some(dir) => Config::with_state_dir(dir),
        None => Config::load()?,
    };

    let result = match cli.command {
        Commands::Start(args) => commands::start::run(config, args, cli.output).await,
        Commands::Status(args) => commands::status::run(config, args, cli.output).await,
        Commands::Stop(args) => commands::stop::run(config, args, cli.output).await,
        Commands::HeartbeatReload(args) => commands::heartbeat_reload::run(config, args, cli.output).await,
        Commands::RotateToken(args) => commands::rotate_token::run(config, args, cli.output).await,
        Commands::Logs(args) => commands::logs::run(config, args, cli.output).await,
    };

    if let Err(error) = &result {
        output::emit_error(cli.output, "brewva.gateway.error.v1", &error.to_string());
        std::process::exit(1);
    }
    Ok(())
}
