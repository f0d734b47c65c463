use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::services::{dispatcher, pairing};
use crate::state::AppState;

const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Rejects the request when a webhook secret is configured and the header
/// does not carry it.
fn check_secret(headers: &HeaderMap, expected: &str) -> Result<(), StatusCode> {
    if expected.is_empty() {
        return Ok(());
    }
    let provided = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != expected {
        tracing::warn!("webhook request with invalid secret token");
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(())
}

// Processing failures are logged; the update is still acknowledged.

pub async fn telegram_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Err(status) = check_secret(&headers, &state.config.webhook_secret) {
        return status;
    }
    if let Err(e) = dispatcher::receive(&state, &body).await {
        tracing::error!(error = %format!("{e:#}"), "failed to process update");
    }
    StatusCode::OK
}

pub async fn link_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Err(status) = check_secret(&headers, &state.config.webhook_secret) {
        return status;
    }
    if let Err(e) = pairing::receive_link(&state, &body).await {
        tracing::error!(error = %format!("{e:#}"), "failed to process link update");
    }
    StatusCode::OK
}
