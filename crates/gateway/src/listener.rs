// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP accept loop (spec §4.1, §6.2). One task per connection for reads;
//! outbound responses and events drain through a per-connection mpsc
//! channel on a separate writer task, so one slow client can never block
//! delivery to another — generalizing the teacher's `listener/mod.rs`
//! accept-loop shape from a one-shot Unix-socket request/response into a
//! persistent, server-push-capable TCP connection.

use std::sync::Arc;

use serde_json::json;
use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::warn;

use gwd_core::connection::Connection;
use gwd_core::error::GatewayError;
use gwd_core::ids::ConnId;
use gwd_core::Clock;
use gwd_worker::WorkerAdapter;

use crate::dispatch;
use crate::protocol::{normalize_request_id, ConnCommand, OutgoingFrame, RequestFrame, ResponseFrame};
use crate::state::GatewayState;

const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Accept connections forever, spawning one task per connection.
pub async fn run<W, C>(state: Arc<GatewayState<W, C>>, listener: TcpListener) -> std::io::Result<()>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(error) = handle_connection(state, stream).await {
                warn!(%peer, %error, "connection handler exited with an error");
            }
        });
    }
}

async fn handle_connection<W, C>(state: Arc<GatewayState<W, C>>, stream: TcpStream) -> std::io::Result<()>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let _ = stream.set_nodelay(true);
    let (mut read_half, write_half) = stream.into_split();

    let conn_id = ConnId::generate();
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let now_ms = state.clock.now_ms();
    let connection = Connection::new(conn_id.clone(), nonce.clone(), now_ms);

    let (tx, rx) = mpsc::channel::<ConnCommand>(OUTBOUND_QUEUE_DEPTH);
    state.connections.register(connection, tx.clone());
    state.connections.send_event_to(&conn_id, "connect.challenge", json!({ "nonce": nonce }));

    let max_payload_bytes = state.config.max_payload_bytes;
    let writer_task = tokio::spawn(writer_loop(write_half, rx, max_payload_bytes));

    loop {
        match gwd_core::framing::read_frame(&mut read_half, max_payload_bytes).await {
            Ok(bytes) => {
                let response = match gwd_core::framing::decode::<RequestFrame>(&bytes) {
                    Ok(request) => dispatch::handle_request(&state, &conn_id, request).await,
                    Err(_) => ResponseFrame::err(
                        normalize_request_id(&None),
                        None,
                        GatewayError::invalid_request("malformed frame"),
                    ),
                };
                let _ = tx.try_send(ConnCommand::Frame(OutgoingFrame::Response(response)));
            }
            Err(_) => break,
        }
    }

    state.connections.remove(&conn_id);
    drop(tx);
    let _ = writer_task.await;
    Ok(())
}

async fn writer_loop<Writer: AsyncWrite + Unpin>(
    mut write_half: Writer,
    mut rx: mpsc::Receiver<ConnCommand>,
    max_payload_bytes: usize,
) {
    while let Some(command) = rx.recv().await {
        match command {
            ConnCommand::Frame(frame) => {
                let Ok(bytes) = gwd_core::framing::encode(&frame, max_payload_bytes) else {
                    continue;
                };
                if gwd_core::framing::write_frame(&mut write_half, &bytes, max_payload_bytes).await.is_err() {
                    break;
                }
            }
            ConnCommand::Close => break,
        }
    }
}
