//! File serving routes
//!
//! Lists the shared directory and streams downloads with byte-range support.

use axum::{
    body::Body,
    extract::{OriginalUri, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    routing::get,
    Json, Router,
};

use crate::download::{ByteRange, DownloadError};
use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::storage::{self, StoredFile};

const DOWNLOAD_PREFIX: &str = "/download/";

/// Create the files router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/files", get(list_files))
        .route("/download/*path", get(download_file))
}

/// GET /files
async fn list_files(State(state): State<AppState>) -> Result<Json<Vec<StoredFile>>> {
    let files = storage::list_files(state.path_guard().root()).await?;
    Ok(Json(files))
}

/// GET /download/*path
///
/// The path is taken from the raw request URI so percent-decoding happens
/// exactly once, inside the path guard.
async fn download_file(
    State(state): State<AppState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> Result<Response> {
    let raw = uri
        .path()
        .strip_prefix(DOWNLOAD_PREFIX)
        .ok_or_else(|| AppError::NotFound(uri.path().to_string()))?;

    let guard = state.path_guard();
    let path = guard.resolve(raw).map_err(|e| {
        tracing::warn!(path = %raw, error = %e, "Rejected download path");
        DownloadError::from(e)
    })?;
    guard
        .ensure_confined(&path)
        .await
        .map_err(DownloadError::from)?;

    // In-progress uploads are hidden from downloads as they are from the listing
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if storage::is_temporary_name(&file_name) {
        return Err(DownloadError::NotFound(raw.to_string()).into());
    }

    // Malformed or multi-range headers fall back to the whole file
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(ByteRange::parse);

    let file = state.streamer().serve(&path, range).await?;

    let content_type = mime_guess::from_path(&path)
        .first_or_octet_stream()
        .to_string();

    let mut builder = Response::builder()
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CONTENT_LENGTH, file.content_length())
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_DISPOSITION, content_disposition(&file_name))
        .header(header::CACHE_CONTROL, "no-cache")
        .header("X-Accel-Buffering", HeaderValue::from_static("no"));

    builder = match file.span {
        Some(span) => builder.status(StatusCode::PARTIAL_CONTENT).header(
            header::CONTENT_RANGE,
            format!("bytes {}-{}/{}", span.start, span.end, file.size),
        ),
        None => builder.status(StatusCode::OK),
    };

    builder
        .body(Body::from_stream(file.stream))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// `attachment` disposition with an RFC 5987 encoded name
fn content_disposition(file_name: &str) -> String {
    format!(
        "attachment; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_encodes_name() {
        assert_eq!(
            content_disposition("My File (1).txt"),
            "attachment; filename*=UTF-8''My%20File%20%281%29.txt"
        );
        assert_eq!(
            content_disposition("résumé.pdf"),
            "attachment; filename*=UTF-8''r%C3%A9sum%C3%A9.pdf"
        );
    }
}
