//! Handlers writing to the feedback log.
//!
//! Store work is blocking file I/O and runs on the blocking pool. A failed
//! write is reported to the caller and logged; it never affects other
//! sessions.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::{SecondsFormat, Utc};
use tracing::info;

use super::algorithm::Ack;
use super::error::JsonBody;
use super::origin::{client_origin, PeerAddr};
use super::state::AppState;
use crate::models::{CompletionSubmission, FeedbackRecord, FeedbackSubmission, SessionKey};
use crate::persistence::MergeOutcome;
use crate::{AppError, Result};

/// Record study timing for the session.
///
/// # Errors
///
/// `Validation` for a blank session key, `Io` when the log cannot be written.
pub async fn study_completion(
    State(state): State<Arc<AppState>>,
    JsonBody(body): JsonBody<CompletionSubmission>,
) -> Result<Json<Ack>> {
    let key = SessionKey::parse(body.session_id.clone())?;
    let record = body.into_record();
    let outcome = persist(&state, key.clone(), record, false).await?;
    info!(session_id = %key, ?outcome, "study completion recorded");
    Ok(Json(Ack::ok("Study completion recorded")))
}

/// Validate ratings and record the session's feedback.
///
/// # Errors
///
/// `Validation` for a blank session key or a missing, non-integer, or
/// out-of-range rating (nothing is written), `Io` when the log cannot be
/// written.
pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    peer: PeerAddr,
    headers: HeaderMap,
    JsonBody(body): JsonBody<FeedbackSubmission>,
) -> Result<Json<Ack>> {
    let key = SessionKey::parse(body.session_id.clone())?;
    let origin = client_origin(&headers, peer, &state.config.region_header);
    let submitted_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let record = body.into_record(state.config.ratings, origin, submitted_at)?;

    let outcome = persist(&state, key.clone(), record, true).await?;
    info!(session_id = %key, ?outcome, "feedback recorded");
    Ok(Json(Ack::ok("Feedback recorded successfully")))
}

/// Merge `record` into the log on the blocking pool, optionally folding in
/// the session's interaction artifact. The artifact is deleted only after a
/// successful write.
async fn persist(
    state: &Arc<AppState>,
    key: SessionKey,
    mut record: FeedbackRecord,
    collect_interactions: bool,
) -> Result<MergeOutcome> {
    let state = Arc::clone(state);
    tokio::task::spawn_blocking(move || {
        if collect_interactions {
            record.interaction = state.scratch.read_interactions(&key);
        }
        let outcome = state.store.merge_or_append(record, key.as_str());
        if collect_interactions && outcome.is_ok() {
            state.scratch.discard(&key);
        }
        outcome
    })
    .await
    .map_err(|err| AppError::Io(format!("feedback writer task failed: {err}")))?
}
