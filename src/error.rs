use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::api::responses::{ApiResponse, ErrorResponse, ValidationErrorDetail};
use crate::idempotency::ConflictKind;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Request validation failed")]
    InvalidFields(Vec<ValidationErrorDetail>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Idempotency conflict: {0}")]
    IdempotencyConflict(ConflictKind),

    #[error("Idempotency record state error: {0}")]
    IdempotencyState(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidFields(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::IdempotencyConflict(_) => StatusCode::CONFLICT,
            AppError::Database(_)
            | AppError::Migration(_)
            | AppError::Config(_)
            | AppError::IdempotencyState(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code used in the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::InvalidFields(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::PayloadTooLarge(_) => "PAYLOAD_TOO_LARGE",
            AppError::IdempotencyConflict(_) => "IDEMPOTENCY_CONFLICT",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error = match &self {
            AppError::IdempotencyConflict(kind) => {
                ErrorResponse::new(self.code(), kind.message()).with_kind(*kind)
            }
            AppError::Validation(msg) | AppError::NotFound(msg) => {
                ErrorResponse::new(self.code(), msg.clone())
            }
            AppError::InvalidFields(details) => {
                ErrorResponse::new(self.code(), self.to_string()).with_details(details.clone())
            }
            AppError::PayloadTooLarge(_) => ErrorResponse::new(self.code(), self.to_string()),
            _ => {
                // Server-side details stay in the logs.
                tracing::error!(error = %self, "Request failed");
                ErrorResponse::new(self.code(), "An internal error occurred")
            }
        };

        (status, Json(ApiResponse::<()>::error(error))).into_response()
    }
}
