// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The session supervisor itself (spec §4.2): owns the worker pool, routes
//! `open_session`/`send_prompt`/`abort_session`/`stop_session` calls to
//! per-session actors, and runs the idle reaper. Generic over
//! [`WorkerAdapter`] and [`Clock`] the same way `oj-engine::runtime::Runtime`
//! is generic over its own adapter/notifier traits, so tests can swap in
//! [`gwd_worker::FakeWorkerAdapter`] and [`gwd_core::FakeClock`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, oneshot};

use gwd_core::ids::{RequestId, SessionId, TurnId, WalId};
use gwd_core::turn::{TurnEnvelope, TurnSource, WalRecord, WalStatus};
use gwd_core::Clock;
use gwd_storage::registry::{Registry, RegistryEntry};
use gwd_storage::wal::TurnWalStore;
use gwd_worker::{ParentMessage, WorkerAdapter, WorkerMessage, WorkerSpawnConfig};

use crate::actor::{self, ActorParams, SessionActivity, SessionCommand};
use crate::admission::Admission;
use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::events::SupervisorEvent;
use crate::handle::SessionHandle;

/// Parameters a caller supplies to `open_session` (spec §4.1.3 `sessions.open`).
#[derive(Debug, Clone, Default)]
pub struct OpenSessionRequest {
    pub session_id: Option<SessionId>,
    pub cwd: Option<std::path::PathBuf>,
    pub config_path: Option<std::path::PathBuf>,
    pub model: Option<String>,
    pub agent_id: Option<String>,
    pub enable_extensions: bool,
}

pub struct Supervisor<W: WorkerAdapter, C: Clock> {
    config: SupervisorConfig,
    adapter: Arc<W>,
    clock: Arc<C>,
    admission: Arc<Admission>,
    wal: Arc<SyncMutex<TurnWalStore>>,
    registry: Registry,
    events_tx: mpsc::Sender<SupervisorEvent>,
    sessions: SyncMutex<HashMap<SessionId, SessionHandle>>,
}

impl<W: WorkerAdapter, C: Clock + 'static> Supervisor<W, C> {
    pub fn new(
        config: SupervisorConfig,
        adapter: Arc<W>,
        clock: Arc<C>,
        wal: Arc<SyncMutex<TurnWalStore>>,
        registry: Registry,
        events_tx: mpsc::Sender<SupervisorEvent>,
    ) -> Self {
        let admission = Admission::new(config.max_workers, config.max_open_queue);
        Self {
            config,
            adapter,
            clock,
            admission,
            wal,
            registry,
            events_tx,
            sessions: SyncMutex::new(HashMap::new()),
        }
    }

    pub fn current_workers(&self) -> usize {
        self.admission.current_workers()
    }

    pub fn queue_depth(&self) -> usize {
        self.admission.queue_depth()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.lock().keys().cloned().collect()
    }

    pub fn has_session(&self, session_id: &SessionId) -> bool {
        self.sessions.lock().contains_key(session_id)
    }

    /// `(worker_pid, agent_session_id)` for a live session, used by the
    /// gateway to fill out `sessions.open`'s response (spec §4.1.3).
    pub fn session_info(&self, session_id: &SessionId) -> Option<(u32, Option<String>)> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|h| (h.pid, h.agent_session_id.clone()))
    }

    /// Reclaim any worker pids left in the registry by a previous process
    /// that crashed without a chance to shut them down (spec §4.2.5). Call
    /// once at startup, before accepting any `open_session` calls.
    pub async fn reclaim_orphans(&self) {
        let entries = match self.registry.load() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load session registry");
                return;
            }
        };
        if entries.is_empty() {
            return;
        }
        for entry in &entries {
            if gwd_worker::process_exists(entry.pid).await {
                tracing::warn!(
                    pid = entry.pid,
                    session_id = %entry.session_id,
                    "reclaiming orphaned worker left by a previous run",
                );
                gwd_worker::kill_pid(entry.pid, std::time::Duration::from_secs(3)).await;
            }
        }
        if let Err(e) = self.registry.save(&[]) {
            tracing::warn!(error = %e, "failed to clear session registry after orphan reclaim");
        }
    }

    fn persist_registry(&self) {
        let entries: Vec<RegistryEntry> = self
            .sessions
            .lock()
            .iter()
            .map(|(id, handle)| RegistryEntry {
                session_id: id.clone(),
                pid: handle.pid,
                started_at_ms: handle.started_at_ms,
            })
            .collect();
        if let Err(e) = self.registry.save(&entries) {
            tracing::warn!(error = %e, "failed to persist session registry");
        }
    }

    fn command_tx(
        &self,
        session_id: &SessionId,
    ) -> Result<mpsc::Sender<SessionCommand>, SupervisorError> {
        self.sessions
            .lock()
            .get(session_id)
            .map(|h| h.command_tx.clone())
            .ok_or_else(|| SupervisorError::SessionNotFound(session_id.as_str().to_string()))
    }

    /// Open (or, if `session_id` already names a live session, return) a
    /// worker-backed session (spec §4.2.3).
    pub async fn open_session(
        &self,
        request: OpenSessionRequest,
    ) -> Result<SessionId, SupervisorError> {
        let session_id = request
            .session_id
            .unwrap_or_else(|| SessionId::new(uuid::Uuid::new_v4().to_string()));

        if self.has_session(&session_id) {
            return Ok(session_id);
        }

        let reservation = self.admission.acquire().await?;

        let spawn_config = WorkerSpawnConfig {
            command: self.config.worker_command.clone(),
            session_id: session_id.clone(),
            cwd: request.cwd,
            config_path: request.config_path,
            model: request.model,
            agent_id: request.agent_id,
            enable_extensions: request.enable_extensions,
            parent_pid: std::process::id(),
            max_payload_bytes: self.config.max_payload_bytes,
        };

        let mut process = self
            .adapter
            .spawn(spawn_config)
            .await
            .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;
        let pid = process.pid();

        let init_request_id = RequestId::generate();
        process
            .write_message(&ParentMessage::Init {
                request_id: init_request_id,
                payload: serde_json::json!({ "session_id": session_id.as_str() }),
            })
            .await
            .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?;

        let ready = process
            .read_message_timeout(self.config.ready_timeout)
            .await
            .map_err(|e| SupervisorError::ReadyFailed(e.to_string()))?;
        let agent_session_id = match ready {
            WorkerMessage::Ready { payload, .. } => payload.agent_session_id,
            other => {
                return Err(SupervisorError::ReadyFailed(format!(
                    "expected ready, got {other:?}"
                )))
            }
        };

        let now = self.clock.now_ms();
        let activity = Arc::new(SessionActivity::new(now));
        let (command_tx, command_rx) = mpsc::channel(32);
        let actor_clock: Arc<dyn Clock> = self.clock.clone();

        let task = tokio::spawn(actor::run(
            process,
            command_rx,
            self.events_tx.clone(),
            session_id.clone(),
            activity.clone(),
            actor_clock,
            self.wal.clone(),
            ActorParams {
                scope: session_id.as_str().to_string(),
                ping_interval: self.config.bridge_ping_interval,
                heartbeat_timeout: self.config.bridge_heartbeat_timeout,
                rpc_timeout: self.config.rpc_timeout,
                max_payload_bytes: self.config.max_payload_bytes,
            },
        ));

        let handle = SessionHandle {
            pid,
            started_at_ms: now,
            agent_session_id: Some(agent_session_id.clone()),
            command_tx,
            activity,
            task,
            reservation,
        };

        self.sessions.lock().insert(session_id.clone(), handle);
        self.persist_registry();

        let _ = self
            .events_tx
            .send(SupervisorEvent::SessionReady {
                session_id: session_id.clone(),
                agent_session_id,
            })
            .await;

        Ok(session_id)
    }

    /// Append a pending WAL record and hand it to the session's worker
    /// (spec §4.2.3 `send`, §4.3.1 dedupe by `<source>:<session_id>:<turn_id>`).
    pub async fn send_prompt(
        &self,
        session_id: &SessionId,
        turn_id: TurnId,
        prompt: String,
    ) -> Result<WalRecord, SupervisorError> {
        let command_tx = self.command_tx(session_id)?;
        let now = self.clock.now_ms();

        let record = WalRecord {
            wal_id: WalId::generate(),
            scope: session_id.as_str().to_string(),
            turn_envelope: TurnEnvelope {
                session_id: session_id.clone(),
                turn_id: turn_id.clone(),
                channel: None,
                conversation_id: None,
                parts: vec![prompt.clone()],
                meta: Default::default(),
                timestamp_ms: now,
            },
            source: TurnSource::Gateway,
            status: WalStatus::Pending,
            created_at_ms: now,
            updated_at_ms: now,
            ttl_ms: None,
            dedupe_key: Some(format!("gateway:{}:{}", session_id.as_str(), turn_id.as_str())),
            error: None,
        };

        let appended = {
            let mut wal = self.wal.lock();
            wal.append_pending(record)
                .map_err(|e| SupervisorError::SpawnFailed(e.to_string()))?
        };

        if appended.turn_envelope.turn_id != turn_id {
            return Err(SupervisorError::DuplicateActiveTurnId(turn_id.as_str().to_string()));
        }

        let (respond_tx, respond_rx) = oneshot::channel();
        command_tx
            .send(SessionCommand::Send {
                turn_id,
                wal_id: appended.wal_id.clone(),
                prompt,
                respond: respond_tx,
            })
            .await
            .map_err(|_| SupervisorError::SessionNotFound(session_id.as_str().to_string()))?;

        respond_rx
            .await
            .map_err(|_| SupervisorError::WorkerExited("session actor exited".to_string()))??;

        Ok(appended)
    }

    pub async fn abort_session(&self, session_id: &SessionId) -> Result<(), SupervisorError> {
        let command_tx = self.command_tx(session_id)?;
        let (respond_tx, respond_rx) = oneshot::channel();
        command_tx
            .send(SessionCommand::Abort { respond: respond_tx })
            .await
            .map_err(|_| SupervisorError::SessionNotFound(session_id.as_str().to_string()))?;
        respond_rx
            .await
            .map_err(|_| SupervisorError::WorkerExited("session actor exited".to_string()))?
    }

    /// Stop a session's worker and remove its handle (spec §4.2.3 `close`).
    pub async fn stop_session(
        &self,
        session_id: &SessionId,
        reason: &str,
    ) -> Result<(), SupervisorError> {
        let handle = self
            .sessions
            .lock()
            .remove(session_id)
            .ok_or_else(|| SupervisorError::SessionNotFound(session_id.as_str().to_string()))?;

        let (respond_tx, respond_rx) = oneshot::channel();
        let _ = handle
            .command_tx
            .send(SessionCommand::Shutdown {
                reason: reason.to_string(),
                respond: respond_tx,
            })
            .await;
        let _ = tokio::time::timeout(self.config.rpc_timeout, respond_rx).await;
        let _ = handle.task.await;

        self.persist_registry();
        Ok(())
    }

    /// Sweep every session for idleness and stop the ones past their TTL
    /// (spec §4.2.4). One sweep runs to completion before the next can
    /// start, since the caller awaits this before re-arming its own timer.
    pub async fn reap_idle_sessions(&self) {
        let now = self.clock.now_ms();
        let idle_ttl_ms = self.config.session_idle_ttl.as_millis() as i64;
        let idle_ids: Vec<SessionId> = self
            .sessions
            .lock()
            .iter()
            .filter(|(_, handle)| handle.is_idle(now, idle_ttl_ms))
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in idle_ids {
            if let Err(e) = self.stop_session(&session_id, "idle_timeout").await {
                tracing::warn!(session_id = %session_id, error = %e, "failed to reap idle session");
            }
        }
    }

    /// Run the idle reaper forever at the configured interval. Intended to
    /// be spawned as its own task alongside the supervisor.
    pub async fn run_idle_reaper(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.reap_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.reap_idle_sessions().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gwd_core::FakeClock;
    use gwd_worker::FakeWorkerAdapter;
    use tempfile::tempdir;

    fn test_wal(dir: &std::path::Path) -> Arc<SyncMutex<TurnWalStore>> {
        Arc::new(SyncMutex::new(TurnWalStore::new(dir.join("wal"))))
    }

    fn supervisor(
        dir: &std::path::Path,
    ) -> (Arc<Supervisor<FakeWorkerAdapter, FakeClock>>, FakeWorkerAdapter, mpsc::Receiver<SupervisorEvent>) {
        let adapter = FakeWorkerAdapter::new();
        let clock = Arc::new(FakeClock::new(1_000));
        let (events_tx, events_rx) = mpsc::channel(64);
        let registry = Registry::new(dir.join("children.json"));
        let supervisor = Supervisor::new(
            SupervisorConfig {
                max_workers: 1,
                max_open_queue: 1,
                ..Default::default()
            },
            Arc::new(adapter.clone()),
            clock,
            test_wal(dir),
            registry,
            events_tx,
        );
        (Arc::new(supervisor), adapter, events_rx)
    }

    async fn drive_ready(adapter: &FakeWorkerAdapter, session_id: &SessionId, agent_session_id: &str) {
        let (mut test_half, _pid) = adapter.take_test_half(session_id).expect("test half");
        let payload = gwd_core::framing::read_frame(&mut test_half, 1 << 20)
            .await
            .expect("read init");
        let init: ParentMessage = gwd_core::framing::decode(&payload).expect("decode init");
        let request_id = init.request_id().expect("init has request id").clone();

        let ready = gwd_core::framing::encode(
            &WorkerMessage::Ready {
                request_id,
                payload: gwd_worker::ReadyPayload {
                    requested_session_id: Some(session_id.clone()),
                    agent_session_id: agent_session_id.to_string(),
                },
            },
            1 << 20,
        )
        .expect("encode ready");
        gwd_core::framing::write_frame(&mut test_half, &ready, 1 << 20)
            .await
            .expect("write ready");

        // Leak the test half into a background task so the bridge ping
        // loop has something to write into without erroring.
        tokio::spawn(async move {
            loop {
                match gwd_core::framing::read_frame(&mut test_half, 1 << 20).await {
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        });
    }

    #[tokio::test]
    async fn open_session_registers_a_ready_handle() {
        let dir = tempdir().expect("tempdir");
        let (supervisor, adapter, mut events_rx) = supervisor(dir.path());

        let session_id = SessionId::new("s1");
        let open = tokio::spawn({
            let supervisor = supervisor.clone();
            let session_id = session_id.clone();
            async move {
                supervisor
                    .open_session(OpenSessionRequest {
                        session_id: Some(session_id),
                        ..Default::default()
                    })
                    .await
            }
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drive_ready(&adapter, &session_id, "agent-1").await;

        let opened = open.await.expect("join").expect("open_session");
        assert_eq!(opened, session_id);
        assert!(supervisor.has_session(&session_id));
        assert_eq!(supervisor.current_workers(), 1);

        let event = events_rx.recv().await.expect("event");
        assert!(matches!(event, SupervisorEvent::SessionReady { .. }));
    }

    #[tokio::test]
    async fn open_session_is_idempotent_for_a_live_session_id() {
        let dir = tempdir().expect("tempdir");
        let (supervisor, adapter, _events_rx) = supervisor(dir.path());

        let session_id = SessionId::new("s1");
        let open = tokio::spawn({
            let supervisor = supervisor.clone();
            let session_id = session_id.clone();
            async move {
                supervisor
                    .open_session(OpenSessionRequest {
                        session_id: Some(session_id),
                        ..Default::default()
                    })
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drive_ready(&adapter, &session_id, "agent-1").await;
        open.await.expect("join").expect("open_session");

        let second = supervisor
            .open_session(OpenSessionRequest {
                session_id: Some(session_id.clone()),
                ..Default::default()
            })
            .await
            .expect("idempotent open");
        assert_eq!(second, session_id);
        assert_eq!(supervisor.current_workers(), 1);
    }

    #[tokio::test]
    async fn stop_session_releases_the_worker_slot() {
        let dir = tempdir().expect("tempdir");
        let (supervisor, adapter, _events_rx) = supervisor(dir.path());

        let session_id = SessionId::new("s1");
        let open = tokio::spawn({
            let supervisor = supervisor.clone();
            let session_id = session_id.clone();
            async move {
                supervisor
                    .open_session(OpenSessionRequest {
                        session_id: Some(session_id),
                        ..Default::default()
                    })
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drive_ready(&adapter, &session_id, "agent-1").await;
        open.await.expect("join").expect("open_session");

        supervisor
            .stop_session(&session_id, "test_shutdown")
            .await
            .expect("stop_session");
        assert!(!supervisor.has_session(&session_id));
        assert_eq!(supervisor.current_workers(), 0);
    }
}
