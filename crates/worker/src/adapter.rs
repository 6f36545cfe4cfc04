// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `WorkerAdapter` trait abstracts over spawning a worker bridge
//! process, so the session supervisor can be tested against an in-memory
//! double instead of a real child process.

use async_trait::async_trait;

use crate::spawn::{spawn_child, WorkerError, WorkerProcess, WorkerSpawnConfig};

/// Spawns worker processes. The production implementation launches a real
/// child process over piped stdio; test code substitutes
/// [`FakeWorkerAdapter`] to drive the bridge protocol without a subprocess.
#[async_trait]
pub trait WorkerAdapter: Send + Sync + 'static {
    async fn spawn(&self, config: WorkerSpawnConfig) -> Result<WorkerProcess, WorkerError>;
}

/// Spawns a real OS child process per call.
#[derive(Debug, Clone, Default)]
pub struct ChildWorkerAdapter;

#[async_trait]
impl WorkerAdapter for ChildWorkerAdapter {
    async fn spawn(&self, config: WorkerSpawnConfig) -> Result<WorkerProcess, WorkerError> {
        spawn_child(&config).await
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeWorkerAdapter;

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::io::duplex;

    use super::{WorkerAdapter, WorkerError};
    use crate::spawn::{WorkerProcess, WorkerSpawnConfig};
    use gwd_core::ids::SessionId;

    const PIPE_CAPACITY: usize = 64 * 1024;

    /// The supervisor-facing half is returned from `spawn`; the test keeps
    /// the other half to script bridge traffic without a real child
    /// process, mirroring `oj-adapters`' `FakeAgentAdapter` call-recording
    /// pattern.
    #[derive(Clone, Default)]
    pub struct FakeWorkerAdapter {
        inner: Arc<Mutex<FakeState>>,
    }

    #[derive(Default)]
    struct FakeState {
        spawned: Vec<WorkerSpawnConfig>,
        spawn_error: Option<String>,
        next_pid: AtomicU32,
        test_halves: HashMap<SessionId, (tokio::io::DuplexStream, u32)>,
    }

    impl FakeWorkerAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn spawned_configs(&self) -> Vec<WorkerSpawnConfig> {
            self.inner.lock().spawned.clone()
        }

        pub fn set_spawn_error(&self, message: impl Into<String>) {
            self.inner.lock().spawn_error = Some(message.into());
        }

        /// Take the test-owned half of the duplex pipe for a session that
        /// has already been spawned, to script `ready`/`result`/`event`
        /// frames and observe `send`/`abort`/`shutdown` requests.
        pub fn take_test_half(&self, session_id: &SessionId) -> Option<(tokio::io::DuplexStream, u32)> {
            self.inner.lock().test_halves.remove(session_id)
        }
    }

    #[async_trait]
    impl WorkerAdapter for FakeWorkerAdapter {
        async fn spawn(&self, config: WorkerSpawnConfig) -> Result<WorkerProcess, WorkerError> {
            let mut inner = self.inner.lock();
            inner.spawned.push(config.clone());
            if let Some(message) = inner.spawn_error.take() {
                return Err(WorkerError::SpawnFailed(std::io::Error::other(message)));
            }

            let pid = inner.next_pid.fetch_add(1, Ordering::Relaxed) + 1;
            let (supervisor_half, test_half) = duplex(PIPE_CAPACITY);
            inner
                .test_halves
                .insert(config.session_id.clone(), (test_half, pid));

            let (reader, writer) = tokio::io::split(supervisor_half);
            Ok(WorkerProcess::new(
                pid,
                None,
                Box::new(reader),
                Box::new(writer),
                config.max_payload_bytes,
            ))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::bridge::{ParentMessage, ReadyPayload, WorkerMessage};
        use gwd_core::framing;
        use gwd_core::ids::RequestId;

        fn config(session_id: &str) -> WorkerSpawnConfig {
            WorkerSpawnConfig {
                command: vec!["unused".to_string()],
                session_id: SessionId::new(session_id),
                cwd: None,
                config_path: None,
                model: None,
                agent_id: None,
                enable_extensions: false,
                parent_pid: std::process::id(),
                max_payload_bytes: 1 << 20,
            }
        }

        #[tokio::test]
        async fn fake_adapter_bridges_init_and_ready() {
            let adapter = FakeWorkerAdapter::new();
            let mut process = adapter.spawn(config("s1")).await.expect("spawn");
            let (mut test_half, pid) = adapter
                .take_test_half(&SessionId::new("s1"))
                .expect("test half");
            assert_eq!(pid, process.pid());

            process
                .write_message(&ParentMessage::Init {
                    request_id: RequestId::new("r1"),
                    payload: serde_json::json!({"cwd": "/tmp"}),
                })
                .await
                .expect("write init");

            let payload = framing::read_frame(&mut test_half, 1 << 20)
                .await
                .expect("read init frame");
            let received: ParentMessage = framing::decode(&payload).expect("decode");
            assert!(matches!(received, ParentMessage::Init { .. }));

            let ready = framing::encode(
                &WorkerMessage::Ready {
                    request_id: RequestId::new("r1"),
                    payload: ReadyPayload {
                        requested_session_id: Some(SessionId::new("s1")),
                        agent_session_id: "agent-1".to_string(),
                    },
                },
                1 << 20,
            )
            .expect("encode ready");
            framing::write_frame(&mut test_half, &ready, 1 << 20)
                .await
                .expect("write ready");

            let reply = process.read_message().await.expect("read ready");
            match reply {
                WorkerMessage::Ready { payload, .. } => {
                    assert_eq!(payload.agent_session_id, "agent-1");
                }
                other => panic!("unexpected message: {other:?}"),
            }

            drop(test_half);
        }

        #[tokio::test]
        async fn records_spawn_configs_and_honors_spawn_error() {
            let adapter = FakeWorkerAdapter::new();
            adapter.spawn(config("a")).await.expect("spawn a");
            adapter.set_spawn_error("boom");
            let err = adapter.spawn(config("b")).await.unwrap_err();
            assert!(matches!(err, WorkerError::SpawnFailed(_)));
            assert_eq!(adapter.spawned_configs().len(), 2);
        }
    }
}
