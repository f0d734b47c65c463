use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::db::{self, queries};
use crate::errors::AppError;
use crate::services::pairing;
use crate::state::AppState;

fn check_auth(headers: &HeaderMap, expected_token: &str) -> Result<(), AppError> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").unwrap_or("");
    if token.is_empty() || token != expected_token {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

// GET /api/admin/status
#[derive(Serialize)]
pub struct StatusResponse {
    free_places: i64,
    held_places: i64,
    open_purchases: i64,
    conversations: i64,
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let stats = {
        let conn = db::lock(&state.db)?;
        queries::get_dashboard_stats(&conn)?
    };

    Ok(Json(StatusResponse {
        free_places: stats.free_places,
        held_places: stats.held_places,
        open_purchases: stats.open_purchases,
        conversations: stats.conversations,
    }))
}

// POST /api/accounts/:username/link-token
#[derive(Serialize)]
pub struct LinkTokenResponse {
    username: String,
    token: String,
}

pub async fn issue_link_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<LinkTokenResponse>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::NotFound("account".to_string()));
    }

    let (account, token) = {
        let conn = db::lock(&state.db)?;
        pairing::issue_token(&conn, username)?
    };
    tracing::info!(account = %account.username, "issued link token");

    Ok(Json(LinkTokenResponse {
        username: account.username,
        token,
    }))
}
