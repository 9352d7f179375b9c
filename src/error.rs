use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Allocator error: {0}")]
    Allocator(#[from] AllocatorError),

    #[error("Scanner error: {0}")]
    Scanner(#[from] ScannerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("External error: {0}")]
    ExternalError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Fingerprint allocation errors
#[derive(Error, Debug)]
pub enum AllocatorError {
    #[error("fingerprint offset space exhausted: all {capacity} offsets outstanding")]
    Exhausted { capacity: u32 },
}

/// Chain explorer query errors
#[derive(Error, Debug, Clone)]
pub enum ScannerError {
    #[error("explorer unreachable: {0}")]
    Unreachable(String),

    #[error("explorer returned HTTP {0}")]
    BadStatus(u16),

    #[error("unexpected response shape: {0}")]
    UnexpectedShape(String),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::InvalidInput(what) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                format!("Invalid input: {}", what),
            ),
            AppError::Allocator(AllocatorError::Exhausted { .. }) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "OFFSET_SPACE_EXHAUSTED",
                "No payment slots available, try again later".to_string(),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::ExternalError(format!("HTTP request error: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
