use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::notify::NotifyError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("notification error: {0}")]
    Notify(#[from] NotifyError),

    #[error("session error: {0}")]
    Session(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl AppError {
    pub fn not_found(what: &str, id: &str) -> Self {
        AppError::NotFound(format!("{what} {id}"))
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) | AppError::Session(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidTransition(_) => StatusCode::CONFLICT,
            AppError::Store(StoreError::Unavailable) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Store(_) | AppError::Notify(_) | AppError::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to hand to a client. Backend error text stays in the logs.
    fn public_message(&self) -> String {
        match self {
            AppError::Store(StoreError::Unavailable) => {
                "the data service is unavailable, try again".to_string()
            }
            AppError::Store(_) => "the data service rejected the request".to_string(),
            AppError::Notify(_) => "the notification could not be sent".to_string(),
            AppError::Config(_) => "server configuration error".to_string(),
            AppError::Session(_) => "invalid or expired session".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = Json(serde_json::json!({ "error": self.public_message() }));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
