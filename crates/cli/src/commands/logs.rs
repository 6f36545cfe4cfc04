// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `gateway logs`: print the daemon's log file (spec §6.1, §6.4).

use std::io::{Read, Seek, SeekFrom};
use std::time::Duration;

use clap::Args;

use gwd_gateway::config::Config;

use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct LogsArgs {
    /// Number of trailing lines to print.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Keep printing new lines as they're appended.
    #[arg(long)]
    pub follow: bool,
}

pub async fn run(config: Config, args: LogsArgs, _format: OutputFormat) -> anyhow::Result<()> {
    if !config.log_file.exists() {
        println!("no log file yet at {}", config.log_file.display());
        return Ok(());
    }

    let contents = tokio::fs::read_to_string(&config.log_file).await?;
    let tail: Vec<&str> = contents.lines().rev().take(args.lines).collect();
    for line in tail.into_iter().rev() {
        println!("{line}");
    }

    if !args.follow {
        return Ok(());
    }

    let mut offset = std::fs::metadata(&config.log_file)?.len();
    loop {
        let len = tokio::fs::metadata(&config.log_file).await?.len();
        if len < offset {
            offset = 0;
        }
        if len > offset {
            let mut file = std::fs::File::open(&config.log_file)?;
            file.seek(SeekFrom::Start(offset))?;
            let mut buf = String::new();
            file.read_to_string(&mut buf)?;
            print!("{buf}");
            offset = len;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}
