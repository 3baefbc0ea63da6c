//! Handlers driving session runners.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::JsonBody;
use super::state::AppState;
use crate::models::{InputToken, RunnerStatus, SessionKey};
use crate::Result;

/// Uniform `{success, message}` reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ack {
    /// Whether the operation took effect.
    pub success: bool,
    /// Human-readable outcome.
    pub message: String,
}

impl Ack {
    /// Successful reply.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

/// `POST /start_algorithm` body.
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// Session key.
    pub session_id: String,
    /// Requested dataset; honoured only if allow-listed.
    #[serde(default)]
    pub dataset: Option<String>,
}

/// `POST /send_input` body.
#[derive(Debug, Deserialize)]
pub struct InputRequest {
    /// Session key.
    pub session_id: String,
    /// Integer choice, as sent by the client.
    pub input: serde_json::Value,
}

/// `POST /stop_algorithm` body.
#[derive(Debug, Deserialize)]
pub struct StopRequest {
    /// Session key.
    pub session_id: String,
}

/// `GET /get_status` query.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Session key.
    pub session_id: String,
}

/// Start or restart the session's program.
///
/// # Errors
///
/// `Validation` for a blank session key, `Spawn` when no program starts.
pub async fn start_algorithm(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<StartRequest>,
) -> Result<Json<Ack>> {
    let key = SessionKey::parse(body.session_id)?;
    let dataset = state.config.program.select_dataset(body.dataset.as_deref());
    let message = state.registry.start(&key, dataset).await?;
    Ok(Json(Ack::ok(message)))
}

/// Forward one integer choice to the session's program.
///
/// # Errors
///
/// `Validation` when the input is not an integer (checked before the
/// registry is consulted), `NoActiveSession` when nothing is running.
pub async fn send_input(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<InputRequest>,
) -> Result<Json<Ack>> {
    let key = SessionKey::parse(body.session_id)?;
    let raw = match &body.input {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    let token = InputToken::parse(&raw)?;
    state.registry.send_input(&key, &token).await?;
    Ok(Json(Ack::ok("Input sent")))
}

/// Stop the session's program and forget the session. Idempotent.
///
/// # Errors
///
/// `Validation` for a blank session key.
pub async fn stop_algorithm(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<StopRequest>,
) -> Result<Json<Ack>> {
    let key = SessionKey::parse(body.session_id)?;
    if !state.registry.stop(&key).await {
        info!(session_id = %key, "stop requested for unknown session");
    }
    Ok(Json(Ack::ok("Algorithm stopped")))
}

/// Liveness and buffered output of the session.
///
/// # Errors
///
/// `Validation` when the query lacks a usable session key.
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<StatusQuery>, axum::extract::rejection::QueryRejection>,
) -> Result<Json<RunnerStatus>> {
    let Query(query) = query?;
    let key = SessionKey::parse(query.session_id)?;
    Ok(Json(state.registry.status(&key)))
}
