use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        };

        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

/// Failure of a single conversation handler.
///
/// The first three variants are recovered inside the conversation with a
/// user-facing reply; the last two are infrastructure failures that leave the
/// conversation exactly as it was before the event.
#[derive(Debug, thiserror::Error)]
pub enum BotError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("infrastructure error: {0}")]
    Infra(#[from] anyhow::Error),
}

impl BotError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BotError::Database(_) | BotError::Infra(_))
    }

    /// Text shown to the user for this failure.
    pub fn user_message(&self) -> String {
        match self {
            BotError::Validation(msg) | BotError::Conflict(msg) => msg.clone(),
            BotError::NotFound(_) => "Sorry, this item is no longer available.".to_string(),
            BotError::Database(_) | BotError::Infra(_) => {
                "Sorry, something went wrong. Please try again in a moment.".to_string()
            }
        }
    }
}
