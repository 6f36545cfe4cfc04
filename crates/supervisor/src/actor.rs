// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-session worker actor: owns one [`WorkerProcess`] and runs its RPC
//! multiplexing / bridge liveness loop (spec §4.2.2). One actor task per
//! live session, driven by [`SessionCommand`]s sent through a channel,
//! mirroring the `Mutex<HashMap<...>>` + `mpsc` event-emission shape the
//! teacher uses in `oj-engine::runtime`, but scoped to a single worker
//! instead of the whole fleet.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use gwd_core::ids::{RequestId, TurnId, WalId};
use gwd_core::Clock;
use gwd_storage::wal::TurnWalStore;
use gwd_worker::{ParentMessage, WorkerMessage, WorkerProcess};

use crate::error::SupervisorError;
use crate::events::SupervisorEvent;

pub enum SessionCommand {
    Send {
        turn_id: TurnId,
        wal_id: WalId,
        prompt: String,
        respond: oneshot::Sender<Result<(), SupervisorError>>,
    },
    Abort {
        respond: oneshot::Sender<Result<(), SupervisorError>>,
    },
    Shutdown {
        reason: String,
        respond: oneshot::Sender<Result<(), SupervisorError>>,
    },
}

enum PendingKind {
    Send { turn_id: TurnId, wal_id: WalId },
    Abort {
        respond: oneshot::Sender<Result<(), SupervisorError>>,
    },
    Shutdown {
        respond: oneshot::Sender<Result<(), SupervisorError>>,
    },
}

struct PendingEntry {
    kind: PendingKind,
    sent_at_ms: i64,
}

/// Shared, lock-free-ish liveness counters an actor updates and the
/// supervisor's idle reaper reads, without needing to talk to the actor.
pub struct SessionActivity {
    pub last_activity_at_ms: AtomicI64,
    pub last_heartbeat_at_ms: AtomicI64,
}

impl SessionActivity {
    pub fn new(now_ms: i64) -> Self {
        Self {
            last_activity_at_ms: AtomicI64::new(now_ms),
            last_heartbeat_at_ms: AtomicI64::new(now_ms),
        }
    }

    fn touch(&self, now_ms: i64) {
        self.last_activity_at_ms.store(now_ms, Ordering::Relaxed);
    }
}

/// Locks, mutates, and drops the guard in one synchronous call so the
/// non-`Send` `parking_lot` guard can never be live across an `.await` in
/// the caller's `tokio::select!` arm.
fn mark_wal_done(wal: &SyncMutex<TurnWalStore>, scope: &str, wal_id: &WalId, now: i64) {
    let _ = wal.lock().mark_done(scope, wal_id, now);
}

fn mark_wal_failed(wal: &SyncMutex<TurnWalStore>, scope: &str, wal_id: &WalId, now: i64, error: String) {
    let _ = wal.lock().mark_failed(scope, wal_id, now, error);
}

pub struct ActorParams {
    pub scope: String,
    pub ping_interval: Duration,
    pub heartbeat_timeout: Duration,
    pub rpc_timeout: Duration,
    pub max_payload_bytes: usize,
}

/// Drives one worker's bridge protocol until it exits, is stopped, or goes
/// unresponsive. Returns the close reason for the supervisor to log and
/// report as a [`SupervisorEvent::SessionClosed`].
pub async fn run(
    mut process: WorkerProcess,
    mut commands: mpsc::Receiver<SessionCommand>,
    events_tx: mpsc::Sender<SupervisorEvent>,
    session_id: gwd_core::ids::SessionId,
    activity: Arc<SessionActivity>,
    clock: Arc<dyn Clock>,
    wal: Arc<SyncMutex<TurnWalStore>>,
    params: ActorParams,
) -> String {
    let mut pending: HashMap<RequestId, PendingEntry> = HashMap::new();

    let mut ping_timer = tokio::time::interval(params.ping_interval);
    ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let close_reason = loop {
        tokio::select! {
            biased;

            cmd = commands.recv() => {
                match cmd {
                    None => break "command_channel_closed".to_string(),
                    Some(SessionCommand::Send { turn_id, wal_id, prompt, respond }) => {
                        let request_id = RequestId::generate();
                        let now = clock.now_ms();
                        {
                            let mut wal = wal.lock();
                            if let Err(e) = wal.mark_inflight(&params.scope, &wal_id, now) {
                                let _ = respond.send(Err(SupervisorError::SpawnFailed(e.to_string())));
                                continue;
                            }
                        }
                        let msg = ParentMessage::Send { request_id: request_id.clone(), prompt, turn_id: turn_id.clone() };
                        match process.write_message(&msg).await {
                            Ok(()) => {
                                pending.insert(request_id, PendingEntry {
                                    kind: PendingKind::Send { turn_id, wal_id },
                                    sent_at_ms: now,
                                });
                                let _ = respond.send(Ok(()));
                            }
                            Err(e) => {
                                let _ = respond.send(Err(SupervisorError::WorkerExited(e.to_string())));
                                break "write_failed".to_string();
                            }
                        }
                    }
                    Some(SessionCommand::Abort { respond }) => {
                        let request_id = RequestId::generate();
                        let now = clock.now_ms();
                        match process.write_message(&ParentMessage::Abort { request_id: request_id.clone() }).await {
                            Ok(()) => {
                                pending.insert(request_id, PendingEntry {
                                    kind: PendingKind::Abort { respond },
                                    sent_at_ms: now,
                                });
                            }
                            Err(e) => {
                                let _ = respond.send(Err(SupervisorError::WorkerExited(e.to_string())));
                            }
                        }
                    }
                    Some(SessionCommand::Shutdown { reason, respond }) => {
                        let request_id = RequestId::generate();
                        let now = clock.now_ms();
                        let _ = process.write_message(&ParentMessage::Shutdown {
                            request_id: request_id.clone(),
                            reason: reason.clone(),
                        }).await;
                        pending.insert(request_id, PendingEntry {
                            kind: PendingKind::Shutdown { respond },
                            sent_at_ms: now,
                        });
                        break reason;
                    }
                }
            }

            message = process.read_message() => {
                let now = clock.now_ms();
                activity.touch(now);
                match message {
                    Ok(WorkerMessage::Ready { request_id, payload }) => {
                        pending.remove(&request_id);
                        let _ = events_tx.send(SupervisorEvent::SessionReady {
                            session_id: session_id.clone(),
                            agent_session_id: payload.agent_session_id,
                        }).await;
                    }
                    Ok(WorkerMessage::Result { request_id, ok, payload, error, error_code: _ }) => {
                        if let Some(entry) = pending.remove(&request_id) {
                            match entry.kind {
                                PendingKind::Send { turn_id, wal_id } => {
                                    if ok {
                                        mark_wal_done(&wal, &params.scope, &wal_id, now);
                                    } else {
                                        mark_wal_failed(&wal, &params.scope, &wal_id, now, error.clone().unwrap_or_default());
                                    }
                                    let _ = events_tx.send(SupervisorEvent::TurnResult {
                                        session_id: session_id.clone(),
                                        turn_id,
                                        ok,
                                        payload,
                                        error,
                                    }).await;
                                }
                                PendingKind::Abort { respond } => {
                                    let _ = respond.send(if ok { Ok(()) } else {
                                        Err(SupervisorError::WorkerExited(error.unwrap_or_default()))
                                    });
                                }
                                PendingKind::Shutdown { respond } => {
                                    let _ = respond.send(Ok(()));
                                }
                            }
                        }
                    }
                    Ok(WorkerMessage::Event { event, payload }) => {
                        let _ = events_tx.send(SupervisorEvent::WorkerEvent {
                            session_id: session_id.clone(),
                            event,
                            payload,
                        }).await;
                    }
                    Ok(WorkerMessage::Log { level, message, .. }) => {
                        let _ = events_tx.send(SupervisorEvent::WorkerLog {
                            session_id: session_id.clone(),
                            level,
                            message,
                        }).await;
                    }
                    Ok(WorkerMessage::BridgeHeartbeat { .. }) => {
                        activity.last_heartbeat_at_ms.store(now, Ordering::Relaxed);
                    }
                    Err(_) => break "worker_exited".to_string(),
                }
            }

            _ = ping_timer.tick() => {
                let now = clock.now_ms();
                if process.write_message(&ParentMessage::BridgePing { ts_ms: now }).await.is_err() {
                    break "worker_exited".to_string();
                }

                let last_heartbeat = activity.last_heartbeat_at_ms.load(Ordering::Relaxed);
                if Duration::from_millis((now - last_heartbeat).max(0) as u64) > params.heartbeat_timeout {
                    break "heartbeat_timeout".to_string();
                }

                let timed_out: Vec<RequestId> = pending.iter()
                    .filter(|(_, entry)| Duration::from_millis((now - entry.sent_at_ms).max(0) as u64) > params.rpc_timeout)
                    .map(|(id, _)| id.clone())
                    .collect();
                for request_id in timed_out {
                    if let Some(entry) = pending.remove(&request_id) {
                        match entry.kind {
                            PendingKind::Send { turn_id, wal_id } => {
                                mark_wal_failed(&wal, &params.scope, &wal_id, now, "rpc_timeout".to_string());
                                let _ = events_tx.send(SupervisorEvent::TurnResult {
                                    session_id: session_id.clone(),
                                    turn_id,
                                    ok: false,
                                    payload: None,
                                    error: Some("rpc_timeout".to_string()),
                                }).await;
                            }
                            PendingKind::Abort { respond } => {
                                let _ = respond.send(Err(SupervisorError::RpcTimeout));
                            }
                            PendingKind::Shutdown { respond } => {
                                let _ = respond.send(Err(SupervisorError::RpcTimeout));
                            }
                        }
                    }
                }
            }
        }
    };

    process.kill().await;

    // Any still-pending requests lose their worker: reject RPCs, mark
    // in-flight turns failed (spec §4.2.6 worker-exit failure semantics).
    let now = clock.now_ms();
    for (_, entry) in pending {
        match entry.kind {
            PendingKind::Send { turn_id, wal_id } => {
                mark_wal_failed(&wal, &params.scope, &wal_id, now, close_reason.clone());
                let _ = events_tx.send(SupervisorEvent::TurnResult {
                    session_id: session_id.clone(),
                    turn_id,
                    ok: false,
                    payload: None,
                    error: Some(close_reason.clone()),
                }).await;
            }
            PendingKind::Abort { respond } => {
                let _ = respond.send(Err(SupervisorError::WorkerExited(close_reason.clone())));
            }
            PendingKind::Shutdown { respond } => {
                let _ = respond.send(Ok(()));
            }
        }
    }

    let _ = events_tx.send(SupervisorEvent::SessionClosed {
        session_id,
        reason: close_reason.clone(),
    }).await;

    close_reason
}
