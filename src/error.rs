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

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised by a ledger client during connect/submit/query round trips
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Ledger rpc error {code}: {message}")]
    Rpc { code: String, message: String },

    #[error("Malformed ledger response: {0}")]
    MalformedResponse(String),

    #[error("Transaction {hash} was not found in a validated ledger")]
    NotValidated { hash: String },

    #[error("Stored memo annotation is not valid JSON: {0}")]
    InvalidMemo(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            LedgerError::Timeout
        } else {
            LedgerError::Transport(error.to_string())
        }
    }
}

/// Errors that abort a backfill ingestion run.
///
/// Partial progress is never rolled back; re-running the ingestion is the
/// recovery path (inserts are idempotent).
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Creating transaction {hash} has no meta block")]
    MissingMeta { hash: String },

    #[error("Creating transaction {hash} is not an EscrowCreate")]
    NotEscrowCreate { hash: String },

    #[error("Creating transaction is missing field {0}")]
    MissingField(&'static str),

    #[error("Escrow release time {0} is not representable")]
    InvalidReleaseTime(i64),
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
            ),
            AppError::InvalidInput(reason) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                format!("Invalid input: {}", reason),
            ),
            AppError::Ledger(e) => (
                StatusCode::BAD_GATEWAY,
                "LEDGER_ERROR",
                format!("Ledger error: {}", e),
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
            details: None,
        });

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        AppError::Ledger(LedgerError::from(error))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("Error converting: {:?}", error))
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
