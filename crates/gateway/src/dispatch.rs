// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Method dispatch table (spec §4.1.2, §4.1.3). One async function per
//! method, each returning `Result<Value, GatewayError>`; errors are mapped
//! to the wire taxonomy at this boundary exactly once, mirroring the
//! `to_gateway_error()` convention already used at the supervisor and
//! scheduler boundaries.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use gwd_core::connection::{ClientDescriptor, ConnPhase};
use gwd_core::error::GatewayError;
use gwd_core::ids::{ConnId, SessionId, TurnId};
use gwd_core::Clock;
use gwd_scheduler::SessionDriver;
use gwd_supervisor::{OpenSessionRequest, SupervisorError};
use gwd_worker::WorkerAdapter;

use crate::protocol::{all_events, all_methods, normalize_request_id, RequestFrame, ResponseFrame, PROTOCOL_VERSION};
use crate::state::GatewayState;

pub async fn handle_request<W, C>(state: &GatewayState<W, C>, conn_id: &ConnId, request: RequestFrame) -> ResponseFrame
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let id = normalize_request_id(&request.id);
    let trace_id = request.trace_id.clone();

    if request.method == "connect" {
        return handle_connect(state, conn_id, id, trace_id, request.params).await;
    }

    let Some(conn) = state.connections.snapshot(conn_id) else {
        return ResponseFrame::err(id, trace_id, GatewayError::internal("connection no longer tracked"));
    };
    if !conn.is_authorized(&state.current_token()) {
        return ResponseFrame::err(id, trace_id, GatewayError::unauthorized("call connect first"));
    }

    let result = match request.method.as_str() {
        "health" => handle_health(state),
        "status.deep" => handle_status_deep(state),
        "heartbeat.reload" => handle_heartbeat_reload(state).await,
        "gateway.rotate-token" => handle_rotate_token(state).await,
        "gateway.stop" => handle_gateway_stop(state, request.params),
        "sessions.open" => handle_sessions_open(state, request.params).await,
        "sessions.send" => handle_sessions_send(state, conn_id, request.params).await,
        "sessions.subscribe" => handle_sessions_subscribe(state, conn_id, request.params, true),
        "sessions.unsubscribe" => handle_sessions_subscribe(state, conn_id, request.params, false),
        "sessions.abort" => handle_sessions_abort(state, request.params).await,
        "sessions.close" => handle_sessions_close(state, request.params).await,
        other => Err(GatewayError::method_not_found(other)),
    };

    match result {
        Ok(payload) => ResponseFrame::ok(id, trace_id, payload),
        Err(error) => ResponseFrame::err(id, trace_id, error),
    }
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, GatewayError> {
    serde_json::from_value(params).map_err(|e| GatewayError::invalid_request(format!("invalid params: {e}")))
}

#[derive(Deserialize)]
struct ConnectParams {
    protocol: String,
    token: String,
    nonce: String,
    #[serde(default)]
    client: Option<ClientDescriptor>,
}

async fn handle_connect<W, C>(
    state: &GatewayState<W, C>,
    conn_id: &ConnId,
    id: Value,
    trace_id: Option<String>,
    params: Value,
) -> ResponseFrame
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let Some(conn) = state.connections.snapshot(conn_id) else {
        return ResponseFrame::err(id, trace_id, GatewayError::internal("connection no longer tracked"));
    };
    if conn.phase == ConnPhase::Authenticated {
        return ResponseFrame::err(
            id,
            trace_id,
            GatewayError::bad_state("already_authenticated", "connection is already authenticated"),
        );
    }
    if conn.phase == ConnPhase::Closing {
        return ResponseFrame::err(id, trace_id, GatewayError::bad_state("closing", "connection is closing"));
    }

    let parsed: ConnectParams = match parse_params(params) {
        Ok(p) => p,
        Err(e) => return ResponseFrame::err(id, trace_id, e),
    };

    if parsed.nonce != conn.challenge_nonce || parsed.protocol != PROTOCOL_VERSION {
        return ResponseFrame::err(
            id,
            trace_id,
            GatewayError::unauthorized("challenge nonce or protocol version mismatch"),
        );
    }
    if !gwd_core::connection::constant_time_eq(parsed.token.as_bytes(), state.current_token().as_bytes()) {
        return ResponseFrame::err(id, trace_id, GatewayError::unauthorized("invalid token"));
    }

    state.connections.update(conn_id, |c| {
        c.phase = ConnPhase::Authenticated;
        c.authenticated_token = Some(parsed.token.clone());
        c.client_descriptor = parsed.client.clone();
    });

    let payload = json!({
        "protocol": PROTOCOL_VERSION,
        "server_id": state.server_id,
        "methods": all_methods(),
        "events": all_events(),
        "policy": {
            "max_payload_bytes": state.config.max_payload_bytes,
            "tick_interval_ms": state.config.tick_interval_ms,
        },
    });
    ResponseFrame::ok(id, trace_id, payload)
}

fn handle_health<W: WorkerAdapter, C: Clock + 'static>(state: &GatewayState<W, C>) -> Result<Value, GatewayError> {
    Ok(json!({
        "status": "ok",
        "uptime_ms": state.clock.now_ms().saturating_sub(state.started_at_ms),
        "workers": state.supervisor.current_workers(),
        "queue_depth": state.supervisor.queue_depth(),
    }))
}

fn handle_status_deep<W: WorkerAdapter, C: Clock + 'static>(state: &GatewayState<W, C>) -> Result<Value, GatewayError> {
    let session_ids: Vec<String> = state.supervisor.session_ids().iter().map(|s| s.as_str().to_string()).collect();
    Ok(json!({
        "status": "ok",
        "uptime_ms": state.clock.now_ms().saturating_sub(state.started_at_ms),
        "workers": state.supervisor.current_workers(),
        "queue_depth": state.supervisor.queue_depth(),
        "sessions": session_ids,
        "heartbeat_rule_count": state.heartbeat.policy().rules.len(),
        "active_intent_count": state.intents.list_active().len(),
        "connection_count": state.connections.connection_count(),
    }))
}

async fn handle_heartbeat_reload<W, C>(state: &GatewayState<W, C>) -> Result<Value, GatewayError>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let report = state
        .heartbeat
        .reload(state.driver.as_ref() as &dyn SessionDriver)
        .await
        .map_err(|e| e.to_gateway_error())?;

    Ok(json!({
        "source_path": state.config.heartbeat_policy_path,
        "loaded_at": state.clock.now_ms(),
        "rule_count": report.rule_count,
        "closed_session_ids": report.closed_sessions.iter().map(|s| s.as_str().to_string()).collect::<Vec<_>>(),
    }))
}

async fn handle_rotate_token<W, C>(state: &GatewayState<W, C>) -> Result<Value, GatewayError>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let old_token = state.current_token();
    let new_token = state
        .token_store
        .rotate()
        .map_err(|e| GatewayError::internal(format!("failed to rotate token: {e}")))?;
    *state.token.lock() = new_token;

    let revoked = state.connections.ids_with_token(&old_token);
    for conn_id in &revoked {
        state.connections.close(conn_id);
    }

    Ok(json!({
        "rotated": true,
        "rotated_at": state.clock.now_ms(),
        "revoked_connections": revoked.len(),
    }))
}

#[derive(Deserialize, Default)]
struct GatewayStopParams {
    #[serde(default)]
    reason: Option<String>,
}

fn handle_gateway_stop<W, C>(state: &GatewayState<W, C>, params: Value) -> Result<Value, GatewayError>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let parsed: GatewayStopParams = parse_params(params)?;
    let reason = parsed.reason.unwrap_or_else(|| "requested".to_string());
    state.shutdown.notify_one();
    Ok(json!({ "stopping": true, "reason": reason }))
}

#[derive(Deserialize, Default)]
struct SessionsOpenParams {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    config_path: Option<PathBuf>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    enable_extensions: bool,
}

async fn handle_sessions_open<W, C>(state: &GatewayState<W, C>, params: Value) -> Result<Value, GatewayError>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let parsed: SessionsOpenParams = parse_params(params)?;

    if let Some(cwd) = &parsed.cwd {
        let metadata = std::fs::metadata(cwd)
            .map_err(|_| GatewayError::invalid_request(format!("cwd does not exist: {}", cwd.display())))?;
        if !metadata.is_dir() {
            return Err(GatewayError::invalid_request(format!("cwd is not a directory: {}", cwd.display())));
        }
    }

    let requested_session_id = parsed.session_id.clone();
    let session_id = parsed.session_id.clone().map(SessionId::new);
    let already_open = session_id.as_ref().is_some_and(|id| state.supervisor.has_session(id));

    let opened = state
        .supervisor
        .open_session(OpenSessionRequest {
            session_id,
            cwd: parsed.cwd,
            config_path: parsed.config_path,
            model: parsed.model,
            agent_id: None,
            enable_extensions: parsed.enable_extensions,
        })
        .await
        .map_err(|e| e.to_gateway_error())?;

    let (worker_pid, agent_session_id) = state.supervisor.session_info(&opened).unwrap_or((0, None));

    Ok(json!({
        "session_id": opened.as_str(),
        "requested_session_id": requested_session_id,
        "created": !already_open,
        "worker_pid": worker_pid,
        "agent_session_id": agent_session_id,
    }))
}

#[derive(Deserialize)]
struct SessionsSendParams {
    session_id: String,
    prompt: String,
    #[serde(default)]
    turn_id: Option<String>,
}

async fn handle_sessions_send<W, C>(state: &GatewayState<W, C>, conn_id: &ConnId, params: Value) -> Result<Value, GatewayError>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let parsed: SessionsSendParams = parse_params(params)?;
    let session_id = SessionId::new(parsed.session_id);
    let turn_id = parsed.turn_id.map(TurnId::new).unwrap_or_else(|| TurnId::new(uuid::Uuid::new_v4().to_string()));

    state.connections.update(conn_id, |c| c.subscribe(session_id.clone()));

    let record = state
        .supervisor
        .send_prompt(&session_id, turn_id.clone(), parsed.prompt)
        .await
        .map_err(|e| e.to_gateway_error())?;

    let (_, agent_session_id) = state.supervisor.session_info(&session_id).unwrap_or((0, None));

    Ok(json!({
        "session_id": session_id.as_str(),
        "agent_session_id": agent_session_id,
        "turn_id": record.turn_envelope.turn_id.as_str(),
        "accepted": true,
    }))
}

#[derive(Deserialize)]
struct SessionIdParams {
    session_id: String,
}

fn handle_sessions_subscribe<W, C>(
    state: &GatewayState<W, C>,
    conn_id: &ConnId,
    params: Value,
    subscribe: bool,
) -> Result<Value, GatewayError>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let parsed: SessionIdParams = parse_params(params)?;
    let session_id = SessionId::new(parsed.session_id);
    let changed = state
        .connections
        .update(conn_id, |c| {
            if subscribe {
                c.subscribe(session_id.clone())
            } else {
                c.unsubscribe(&session_id)
            }
        })
        .unwrap_or(false);
    Ok(json!({ "changed": changed }))
}

async fn handle_sessions_abort<W, C>(state: &GatewayState<W, C>, params: Value) -> Result<Value, GatewayError>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let parsed: SessionIdParams = parse_params(params)?;
    let session_id = SessionId::new(parsed.session_id);
    match state.supervisor.abort_session(&session_id).await {
        Ok(()) => Ok(json!({ "existed": true })),
        Err(SupervisorError::SessionNotFound(_)) => Ok(json!({ "existed": false })),
        Err(e) => Err(e.to_gateway_error()),
    }
}

async fn handle_sessions_close<W, C>(state: &GatewayState<W, C>, params: Value) -> Result<Value, GatewayError>
where
    W: WorkerAdapter,
    C: Clock + 'static,
{
    let parsed: SessionIdParams = parse_params(params)?;
    let session_id = SessionId::new(parsed.session_id);
    match state.supervisor.stop_session(&session_id, "client_requested").await {
        Ok(()) => Ok(json!({ "existed": true })),
        Err(SupervisorError::SessionNotFound(_)) => Ok(json!({ "existed": false })),
        Err(e) => Err(e.to_gateway_error()),
    }
}
