//! Error taxonomy for the upload endpoint and its HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::{json, Value};
use thiserror::Error as ThisError;

/// Error body message shared by every server-side failure.
pub const PROCESSING_FAILED: &str = "Failed to process files";

#[derive(ThisError, Debug)]
pub enum Error {
    /// The request itself is unusable (no files, too many files).
    #[error("{message}")]
    Validation { message: String },

    /// The multipart body could not be read (bad framing, size limit).
    #[error("Malformed multipart body: {details}")]
    Multipart { status: StatusCode, details: String },

    /// `?profile=` named a prompt profile that is not loaded.
    #[error("Unknown profile: {name}. Available: {available:?}")]
    UnknownProfile { name: String, available: Vec<String> },

    /// The PDF parser or OCR engine rejected a file.
    #[error("Failed to extract text from {file}: {message}")]
    Extraction { file: String, message: String },

    /// The LLM endpoint answered with a non-success status.
    #[error("Upstream error ({status}): {details}")]
    Upstream { status: u16, details: Value },

    /// Anything else, including transport failures.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } | Error::UnknownProfile { .. } => StatusCode::BAD_REQUEST,
            Error::Multipart { status, .. } => *status,
            Error::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::Extraction { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body returned to the caller.
    pub fn body(&self) -> Value {
        match self {
            Error::Validation { message } => json!({ "error": message }),
            Error::Multipart { details, .. } => json!({
                "error": "Malformed multipart body.",
                "details": details,
            }),
            Error::UnknownProfile { .. } => json!({
                "error": "Unknown profile",
                "details": self.to_string(),
            }),
            Error::Upstream { details, .. } => json!({
                "error": PROCESSING_FAILED,
                "details": details,
            }),
            Error::Extraction { .. } => json!({
                "error": PROCESSING_FAILED,
                "details": self.to_string(),
            }),
            Error::Other(e) => json!({
                "error": PROCESSING_FAILED,
                "details": format!("{e:#}"),
            }),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Validation { .. } | Error::Multipart { .. } | Error::UnknownProfile { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::Upstream { .. } => {
                tracing::error!("Upstream error: {}", self);
            }
            Error::Extraction { .. } | Error::Other(_) => {
                tracing::error!("Processing error: {:#}", self);
            }
        }

        (self.status_code(), Json(self.body())).into_response()
    }
}
