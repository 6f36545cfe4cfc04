// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed JSON framing shared by the gateway<->client wire protocol
//! and the supervisor<->worker bridge protocol.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Errors from encoding, decoding, or transporting a frame.
#[derive(Debug, Error)]
pub enum FramingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("timeout")]
    Timeout,
}

/// Encode a message to JSON bytes, rejecting payloads over `max_payload_bytes`.
pub fn encode<T: Serialize>(msg: &T, max_payload_bytes: usize) -> Result<Vec<u8>, FramingError> {
    let json = serde_json::to_vec(msg)?;
    if json.len() > max_payload_bytes {
        return Err(FramingError::PayloadTooLarge {
            size: json.len(),
            max: max_payload_bytes,
        });
    }
    Ok(json)
}

/// Decode a message from its JSON payload bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, FramingError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Read one length-prefixed frame payload from an async reader.
pub async fn read_frame<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_payload_bytes: usize,
) -> Result<Vec<u8>, FramingError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FramingError::ConnectionClosed);
        }
        Err(e) => return Err(FramingError::Io(e)),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_payload_bytes {
        return Err(FramingError::PayloadTooLarge {
            size: len,
            max: max_payload_bytes,
        });
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write one length-prefixed frame payload to an async writer.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    max_payload_bytes: usize,
) -> Result<(), FramingError> {
    if payload.len() > max_payload_bytes {
        return Err(FramingError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload_bytes,
        });
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a frame with a timeout, yielding [`FramingError::Timeout`] on expiry.
pub async fn read_frame_timeout<R: AsyncReadExt + Unpin>(
    reader: &mut R,
    max_payload_bytes: usize,
    timeout: std::time::Duration,
) -> Result<Vec<u8>, FramingError> {
    tokio::time::timeout(timeout, read_frame(reader, max_payload_bytes))
        .await
        .map_err(|_| FramingError::Timeout)?
}

/// Write a frame with a timeout, yielding [`FramingError::Timeout`] on expiry.
pub async fn write_frame_timeout<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    payload: &[u8],
    max_payload_bytes: usize,
    timeout: std::time::Duration,
) -> Result<(), FramingError> {
    tokio::time::timeout(timeout, write_frame(writer, payload, max_payload_bytes))
        .await
        .map_err(|_| FramingError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let payload = encode(&serde_json::json!({"hello": "world"}), 1 << 20).unwrap();
        write_frame(&mut a, &payload, 1 << 20).await.unwrap();
        let got = read_frame(&mut b, 1 << 20).await.unwrap();
        let value: serde_json::Value = decode(&got).unwrap();
        assert_eq!(value["hello"], "world");
    }

    #[tokio::test]
    async fn rejects_oversized_payload_at_encode_time() {
        let big = vec![0u8; 100];
        let err = encode(&big, 10).unwrap_err();
        assert!(matches!(err, FramingError::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn connection_closed_on_empty_stream() {
        let (a, mut b) = tokio::io::duplex(16);
        drop(a);
        let err = read_frame(&mut b, 1024).await.unwrap_err();
        assert!(matches!(err, FramingError::ConnectionClosed));
    }
}
