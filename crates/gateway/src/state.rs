// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared daemon state handed to every connection's dispatch call.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use gwd_core::Clock;
use gwd_scheduler::{HeartbeatScheduler, IntentScheduler};
use gwd_storage::TokenStore;
use gwd_supervisor::Supervisor;
use gwd_worker::WorkerAdapter;

use crate::config::Config;
use crate::connections::Connections;
use crate::driver::SupervisorDriver;

pub struct GatewayState<W: WorkerAdapter, C: Clock + 'static> {
    pub connections: Connections,
    pub config: Config,
    pub server_id: String,
    /// In-memory mirror of the on-disk token, kept under its own lock so an
    /// auth check never has to touch the filesystem.
    pub token: Mutex<String>,
    pub token_store: TokenStore,
    pub supervisor: Arc<Supervisor<W, C>>,
    pub heartbeat: Arc<HeartbeatScheduler>,
    pub intents: Arc<IntentScheduler>,
    pub driver: Arc<SupervisorDriver<W, C>>,
    pub clock: Arc<C>,
    pub started_at_ms: i64,
    /// Notified once by `gateway.stop`; the main loop awaits this to begin
    /// graceful shutdown after the response frame has been flushed.
    pub shutdown: Notify,
}

impl<W: WorkerAdapter, C: Clock + 'static> GatewayState<W, C> {
    pub fn current_token(&self) -> String {
        self.token.lock().clone()
    }
}
