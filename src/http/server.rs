//! HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::state::AppState;
use super::{algorithm, feedback};
use crate::{AppError, Result};

/// Build the application router.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/start_algorithm", post(algorithm::start_algorithm))
        .route("/send_input", post(algorithm::send_input))
        .route("/stop_algorithm", post(algorithm::stop_algorithm))
        .route("/get_status", get(algorithm::get_status))
        .route("/study_completion", post(feedback::study_completion))
        .route("/submit_feedback", post(feedback::submit_feedback))
        .with_state(state)
}

/// Serve the router on the configured address until `ct` fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the listener cannot bind, or `AppError::Io`
/// if the server fails while running.
pub async fn serve(state: Arc<AppState>, ct: CancellationToken) -> Result<()> {
    let bind = state.config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind HTTP on {bind}: {err}")))?;

    info!(%bind, data_dir = %state.data_dir.display(), "starting HTTP listener");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { ct.cancelled().await })
    .await
    .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("HTTP listener shut down");
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}
