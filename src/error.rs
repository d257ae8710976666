// SynthNet Voice Error Taxonomy
// Copyright (c) 2026 Xing_The_Creator | SynthNet

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Coarse classification used by callers to decide whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InvalidState,
    IoError,
    UpstreamError,
}

#[derive(Error, Debug)]
pub enum VoiceApiError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("timed out: {0}")]
    Timeout(String),
}

pub type VoiceResult<T> = Result<T, VoiceApiError>;

impl VoiceApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VoiceApiError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            VoiceApiError::NotFound(_) => ErrorKind::NotFound,
            VoiceApiError::InvalidState(_) => ErrorKind::InvalidState,
            VoiceApiError::Io(_) => ErrorKind::IoError,
            VoiceApiError::Upstream(_) | VoiceApiError::Timeout(_) => ErrorKind::UpstreamError,
        }
    }

    /// Only transient I/O and upstream failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::IoError | ErrorKind::UpstreamError)
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            VoiceApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            VoiceApiError::NotFound(_) => StatusCode::NOT_FOUND,
            VoiceApiError::InvalidState(_) => StatusCode::CONFLICT,
            VoiceApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            VoiceApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            VoiceApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Maps a file-system error, turning a missing file into `NotFound`.
    pub fn from_io(err: std::io::Error, what: impl std::fmt::Display) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            VoiceApiError::NotFound(what.to_string())
        } else {
            VoiceApiError::Io(err)
        }
    }
}

impl From<hound::Error> for VoiceApiError {
    fn from(err: hound::Error) -> Self {
        match err {
            hound::Error::IoError(io) => VoiceApiError::Io(io),
            other => VoiceApiError::Upstream(format!("wave codec: {}", other)),
        }
    }
}

impl From<tokio::task::JoinError> for VoiceApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        VoiceApiError::Upstream(format!("background task failed: {}", err))
    }
}

impl IntoResponse for VoiceApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("[SERVER] {}", self);
        } else {
            tracing::debug!("[SERVER] rejected request: {}", self);
        }
        let body = json!({
            "kind": self.kind(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}
