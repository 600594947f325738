//! Upload Routes
//!
//! HTTP endpoints for chunked and single-request uploads.
//!
//! Endpoints:
//! - POST /upload/chunk - Deliver one chunk of a session
//! - GET /upload/:session_id - Get session status
//! - POST /upload - Upload whole files in one multipart request

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum::body::Bytes;

use crate::config::UploadConfig;
use crate::error::AppError;
use crate::state::AppState;
use crate::upload::{
    ChunkReceipt, ChunkUpload, DirectUploadResponse, SessionSnapshot, UploadError,
};

/// Multipart overhead allowed on top of the chunk itself
const FORM_OVERHEAD: usize = 64 * 1024;

// ============================================================================
// Router
// ============================================================================

/// Create the upload router
pub fn router(config: &UploadConfig) -> Router<AppState> {
    let chunk_limit = usize::try_from(config.max_chunk_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD);

    Router::new()
        .route(
            "/upload/chunk",
            post(upload_chunk).layer(DefaultBodyLimit::max(chunk_limit)),
        )
        .route("/upload/:session_id", get(get_session))
        // The direct uploader enforces its own size ceiling while streaming
        .route("/upload", post(upload_files).layer(DefaultBodyLimit::disable()))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /upload/chunk
///
/// Multipart fields: `sessionId`, `targetName`, `index`, `totalChunks`,
/// `chunkSize`, `chunkHash`, `chunk`.
async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChunkReceipt>, AppError> {
    let mut form = ChunkForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "chunk" => form.data = Some(field.bytes().await.map_err(multipart_error)?),
            "sessionId" | "targetName" | "index" | "totalChunks" | "chunkSize" | "chunkHash" => {
                let value = field.text().await.map_err(multipart_error)?;
                form.set(&name, value);
            }
            _ => tracing::debug!(field = %name, "Ignoring unknown upload field"),
        }
    }

    let upload = form.into_upload()?;

    // Runs detached so a client disconnect cannot interrupt a reassembly
    let coordinator = state.coordinator().clone();
    let receipt = tokio::spawn(async move { coordinator.begin_or_continue(upload).await })
        .await
        .map_err(|e| AppError::Internal(format!("upload task failed: {e}")))??;

    Ok(Json(receipt))
}

/// GET /upload/:session_id
///
/// Report which chunks a session still needs.
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshot>, UploadError> {
    state.coordinator().snapshot(&session_id).await.map(Json)
}

/// POST /upload
///
/// Store every `files` part under its own name, suffixing on collision.
async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DirectUploadResponse>, AppError> {
    let mut uploaded = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("files") {
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        if file_name.is_empty() {
            continue;
        }

        let stored = state.direct_uploader().store(&file_name, field).await?;
        uploaded.push(stored.name);
    }

    if uploaded.is_empty() {
        return Err(AppError::BadRequest("No files".to_string()));
    }

    Ok(Json(DirectUploadResponse { uploaded }))
}

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct ChunkForm {
    session_id: Option<String>,
    target_name: Option<String>,
    index: Option<String>,
    total_chunks: Option<String>,
    chunk_size: Option<String>,
    chunk_hash: Option<String>,
    data: Option<Bytes>,
}

impl ChunkForm {
    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "sessionId" => &mut self.session_id,
            "targetName" => &mut self.target_name,
            "index" => &mut self.index,
            "totalChunks" => &mut self.total_chunks,
            "chunkSize" => &mut self.chunk_size,
            "chunkHash" => &mut self.chunk_hash,
            _ => return,
        };
        *slot = Some(value);
    }

    fn into_upload(self) -> Result<ChunkUpload, UploadError> {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());

        let target_name = self
            .target_name
            .ok_or_else(|| UploadError::InvalidRequest("missing targetName".to_string()))?;
        let index = parse_required("index", self.index)?;
        let total_chunks = parse_required("totalChunks", self.total_chunks)?;
        let chunk_size = non_empty(self.chunk_size)
            .map(|v| parse_number::<u64>("chunkSize", &v))
            .transpose()?;
        let data = self
            .data
            .ok_or_else(|| UploadError::InvalidRequest("missing chunk".to_string()))?;

        Ok(ChunkUpload {
            session_id: non_empty(self.session_id),
            target_name,
            index,
            total_chunks,
            chunk_size,
            chunk_hash: non_empty(self.chunk_hash),
            data,
        })
    }
}

fn parse_required(field: &str, value: Option<String>) -> Result<usize, UploadError> {
    let value = value.ok_or_else(|| UploadError::InvalidRequest(format!("missing {field}")))?;
    parse_number(field, &value)
}

fn parse_number<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, UploadError> {
    value
        .trim()
        .parse()
        .map_err(|_| UploadError::InvalidRequest(format!("{field} is not a number: {value:?}")))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::BadRequest(e.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(fields: &[(&str, &str)]) -> ChunkForm {
        let mut form = ChunkForm::default();
        for (name, value) in fields {
            form.set(name, value.to_string());
        }
        form.data = Some(Bytes::from_static(b"payload"));
        form
    }

    #[test]
    fn test_form_into_upload() {
        let upload = form(&[
            ("sessionId", "abc"),
            ("targetName", "My%20File.txt"),
            ("index", "2"),
            ("totalChunks", " 5 "),
            ("chunkSize", "1048576"),
        ])
        .into_upload()
        .unwrap();

        assert_eq!(upload.session_id.as_deref(), Some("abc"));
        assert_eq!(upload.target_name, "My%20File.txt");
        assert_eq!(upload.index, 2);
        assert_eq!(upload.total_chunks, 5);
        assert_eq!(upload.chunk_size, Some(1048576));
        assert_eq!(upload.chunk_hash, None);
        assert_eq!(&upload.data[..], b"payload");
    }

    #[test]
    fn test_blank_session_id_means_generate() {
        let upload = form(&[
            ("sessionId", "  "),
            ("targetName", "a.txt"),
            ("index", "0"),
            ("totalChunks", "1"),
        ])
        .into_upload()
        .unwrap();
        assert_eq!(upload.session_id, None);
    }

    #[test]
    fn test_form_errors() {
        let missing = form(&[("targetName", "a"), ("totalChunks", "1")]).into_upload();
        assert!(matches!(missing, Err(UploadError::InvalidRequest(_))));

        let garbage = form(&[("targetName", "a"), ("index", "x"), ("totalChunks", "1")]).into_upload();
        assert!(matches!(garbage, Err(UploadError::InvalidRequest(_))));

        let negative = form(&[("targetName", "a"), ("index", "-1"), ("totalChunks", "1")]).into_upload();
        assert!(matches!(negative, Err(UploadError::InvalidRequest(_))));
    }
}
