// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway TCP client: connect, challenge/response handshake, request/reply.

use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::net::TcpStream;

use gwd_core::error::GatewayError;
use gwd_core::framing::{self, FramingError};
use gwd_gateway::protocol::{EventFrame, OutgoingFrame, RequestFrame, PROTOCOL_VERSION};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("gateway not running")]
    NotRunning,
    #[error("failed to start gateway: {0}")]
    StartFailed(String),
    #[error("timed out waiting for gateway to become reachable")]
    StartTimeout,
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    #[error("gateway returned an error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected response from gateway")]
    UnexpectedResponse,
}

pub struct GatewayClient {
    stream: TcpStream,
    max_payload_bytes: usize,
}

impl GatewayClient {
    /// Connect, perform the `connect.challenge` / `connect` handshake, and
    /// return a client ready to issue authenticated calls (spec §4.1.2).
    pub async fn connect(host: &str, port: u16, token: &str, max_payload_bytes: usize) -> Result<Self, ClientError> {
        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|_| ClientError::NotRunning)?;
        stream.set_nodelay(true).ok();

        let bytes = framing::read_frame(&mut stream, max_payload_bytes).await?;
        let frame: OutgoingFrame = framing::decode(&bytes)?;
        let OutgoingFrame::Event(EventFrame { event, payload, .. }) = frame else {
            return Err(ClientError::UnexpectedResponse);
        };
        if event != "connect.challenge" {
            return Err(ClientError::UnexpectedResponse);
        }
        let nonce = payload
            .get("nonce")
            .and_then(Value::as_str)
            .ok_or(ClientError::UnexpectedResponse)?
            .to_string();

        let mut client = Self { stream, max_payload_bytes };
        client
            .call(
                "connect",
                json!({
                    "protocol": PROTOCOL_VERSION,
                    "token": token,
                    "nonce": nonce,
                }),
            )
            .await?;
        Ok(client)
    }

    /// Send one request and return its payload, skipping over any server
    /// events that arrive before the matching response.
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value, ClientError> {
        let request = RequestFrame {
            id: Some(Value::String(uuid::Uuid::new_v4().to_string())),
            method: method.to_string(),
            params,
            trace_id: None,
        };
        let bytes = framing::encode(&request, self.max_payload_bytes)?;
        framing::write_frame(&mut self.stream, &bytes, self.max_payload_bytes).await?;

        loop {
            let bytes = framing::read_frame(&mut self.stream, self.max_payload_bytes).await?;
            match framing::decode::<OutgoingFrame>(&bytes)? {
                OutgoingFrame::Response(response) => {
                    return if response.ok {
                        Ok(response.payload.unwrap_or(Value::Null))
                    } else {
                        Err(response.error.map(ClientError::Gateway).unwrap_or(ClientError::UnexpectedResponse))
                    };
                }
                OutgoingFrame::Event(_) => continue,
            }
        }
    }
}

/// Probe whether `host:port` is accepting TCP connections.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, TcpStream::connect((host, port))).await.is_ok_and(|r| r.is_ok())
}
