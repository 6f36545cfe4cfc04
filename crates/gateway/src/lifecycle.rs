// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon startup and background task wiring, generalizing the teacher's
//! `daemon/src/lifecycle.rs` lock-acquire-then-build-runtime shape from a
//! single materialized-state runtime to the gateway's three subsystems
//! (supervisor, heartbeat scheduler, intent scheduler).

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, Notify};

use gwd_core::clock::Clock;
use gwd_core::pid::PidRecord;
use gwd_scheduler::{HeartbeatScheduler, HeartbeatSchedulerConfig, IntentScheduler, IntentSchedulerConfig, SchedulerError};
use gwd_storage::{PidFileError, PidLock, Registry, TokenStore, TokenStoreError, TurnWalStore};
use gwd_supervisor::{Supervisor, SupervisorConfig};
use gwd_worker::WorkerAdapter;

use crate::config::Config;
use crate::connections::Connections;
use crate::driver::SupervisorDriver;
use crate::state::GatewayState;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire pid lock: {0}")]
    PidLock(#[from] PidFileError),
    #[error("failed to load auth token: {0}")]
    Token(#[from] TokenStoreError),
    #[error("failed to start scheduler: {0}")]
    Scheduler(#[from] SchedulerError),
    #[error("failed to bind listener: {0}")]
    Io(#[from] std::io::Error),
    #[error("configured host does not resolve to a loopback address")]
    NotLoopback,
}

/// Everything `main` needs to run the daemon: the shared state, the bound
/// listener, and the pid lock (held for the process lifetime, released on
/// shutdown).
pub struct Startup<W: WorkerAdapter, C: Clock + 'static> {
    pub state: Arc<GatewayState<W, C>>,
    pub listener: TcpListener,
    pub pid_lock: PidLock,
    pub supervisor_events: mpsc::Receiver<gwd_supervisor::SupervisorEvent>,
}

/// Acquire the pid lock, load or create the auth token, reclaim any
/// orphaned workers left by a previous crash, and build the three
/// subsystems. Does not spawn any background task or accept connections;
/// the caller decides that ordering (spec §4.1.2 wants the listener bound
/// before `reclaim_orphans` can block startup indefinitely).
pub async fn startup<W, C>(config: Config, adapter: Arc<W>, clock: Arc<C>) -> Result<Startup<W, C>, LifecycleError>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    config.validate_loopback().map_err(|_| LifecycleError::NotLoopback)?;

    std::fs::create_dir_all(&config.state_dir)?;

    let now_ms = clock.now_ms();

    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    let mut config = config;
    config.port = listener.local_addr()?.port();

    let record = PidRecord {
        pid: std::process::id(),
        host: config.host.clone(),
        port: config.port,
        started_at_ms: now_ms,
        cwd: config.cwd.clone().unwrap_or_else(|| std::env::current_dir().unwrap_or_default()),
    };
    let pid_lock = PidLock::acquire(&config.pid_file.with_extension("lock"), &config.pid_file, &record)?;

    let token_store = TokenStore::new(config.token_file.clone());
    let token = token_store.load_or_create()?;

    let supervisor_config = SupervisorConfig {
        max_workers: config.max_workers,
        max_open_queue: config.max_open_queue,
        max_payload_bytes: config.max_payload_bytes,
        session_idle_ttl: config.session_idle_ttl(),
        ..Default::default()
    };
    let wal = Arc::new(Mutex::new(TurnWalStore::new(config.turn_wal_dir.clone())));
    let registry = Registry::new(config.children_registry_path.clone());
    let (events_tx, events_rx) = mpsc::channel(1024);
    let supervisor = Arc::new(Supervisor::new(supervisor_config, adapter, clock.clone(), wal, registry, events_tx));
    supervisor.reclaim_orphans().await;

    if !config.heartbeat_policy_path.exists() {
        if let Some(parent) = config.heartbeat_policy_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config.heartbeat_policy_path, "# Heartbeat rules\n")?;
    }
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let heartbeat = Arc::new(HeartbeatScheduler::load(
        &config.heartbeat_policy_path,
        HeartbeatSchedulerConfig {
            tick_interval: config.tick_interval(),
        },
        dyn_clock.clone(),
    )?);

    if let Some(parent) = config.schedule_log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let intents = Arc::new(IntentScheduler::open(
        &config.schedule_log_path,
        IntentSchedulerConfig {
            tick_interval: config.tick_interval(),
            ..Default::default()
        },
        dyn_clock,
    )?);

    let driver = Arc::new(SupervisorDriver::new(supervisor.clone()));

    let state = Arc::new(GatewayState {
        connections: Connections::new(),
        server_id: format!("gatewayd-{}", std::process::id()),
        config,
        token: Mutex::new(token),
        token_store,
        supervisor,
        heartbeat,
        intents,
        driver,
        clock,
        started_at_ms: now_ms,
        shutdown: Notify::new(),
    });

    Ok(Startup {
        state,
        listener,
        pid_lock,
        supervisor_events: events_rx,
    })
}

/// Spawn every background task that runs for the life of the daemon:
/// the idle-session reaper, the heartbeat tick loop, the intent tick loop,
/// and the supervisor-event-to-connection pump. Returns their join handles
/// so `main` can let them run to completion on shutdown (they never
/// return on their own).
pub fn spawn_background_tasks<W, C>(state: &Arc<GatewayState<W, C>>, supervisor_events: mpsc::Receiver<gwd_supervisor::SupervisorEvent>) -> Vec<tokio::task::JoinHandle<()>>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let mut handles = Vec::new();

    handles.push(tokio::spawn(state.supervisor.clone().run_idle_reaper()));

    let heartbeat = state.heartbeat.clone();
    let driver: Arc<dyn gwd_scheduler::SessionDriver> = state.driver.clone();
    let state_for_heartbeat = state.clone();
    handles.push(heartbeat.spawn_tick_loop(driver, move |outcome| {
        state_for_heartbeat.connections.broadcast(
            "heartbeat.fired",
            serde_json::json!({
                "rule_id": outcome.rule_id.as_str(),
                "session_id": outcome.session_id.as_str(),
                "ts_ms": outcome.ts_ms,
                "has_result": outcome.has_result,
            }),
        );
    }));

    let intent_state = state.clone();
    handles.push(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(intent_state.config.tick_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let executor = intent_state.driver.clone();
        loop {
            ticker.tick().await;
            if let Err(error) = intent_state.intents.tick(Some(executor.as_ref() as &dyn gwd_scheduler::IntentExecutor)).await {
                tracing::warn!(%error, "intent scheduler tick failed");
            }
        }
    }));

    let events_state = state.clone();
    handles.push(tokio::spawn(async move {
        crate::events::run(&events_state.connections, supervisor_events).await;
    }));

    handles
}
