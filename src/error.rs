//! Error types for the QuickDrop server

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::download::DownloadError;
use crate::storage::PathError;
use crate::upload::UploadError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: &'static str,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            AppError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            AppError::Upload(e) => (e.status_code(), e.code()),
            AppError::Download(e) => match e {
                DownloadError::InvalidPath(PathError::Io(_)) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR")
                }
                DownloadError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "INVALID_PATH"),
                DownloadError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                DownloadError::RangeNotSatisfiable { .. } => {
                    (StatusCode::RANGE_NOT_SATISFIABLE, "RANGE_NOT_SATISFIABLE")
                }
                DownloadError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            },
            AppError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Server-side failures are logged in full and reported generically
        let message = if status.is_server_error() {
            tracing::error!(code = code, "{}", self);
            "An internal error occurred".to_string()
        } else {
            self.to_string()
        };

        let mut response = (status, Json(ErrorResponse { error: message, code })).into_response();

        if let AppError::Download(DownloadError::RangeNotSatisfiable { size, .. }) = &self {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", size)) {
                response.headers_mut().insert(header::CONTENT_RANGE, value);
            }
        }

        response
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        AppError::Upload(self).into_response()
    }
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        AppError::Download(self).into_response()
    }
}
