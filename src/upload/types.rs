//! Upload types for the chunked transfer protocol

use std::collections::BTreeSet;
use std::path::PathBuf;

use axum::body::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::PathError;

// ============================================================================
// Constants
// ============================================================================

/// Longest accepted session id
pub const MAX_SESSION_ID_LEN: usize = 128;

// ============================================================================
// Chunk Upload Types
// ============================================================================

/// One chunk delivery, as parsed from `POST /upload/chunk`
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    /// Client-chosen session id; generated when absent
    pub session_id: Option<String>,

    /// Destination name, percent-encoded by the client
    pub target_name: String,

    /// Zero-based chunk index
    pub index: usize,

    /// Number of chunks the file was split into
    pub total_chunks: usize,

    /// Declared size of every non-final chunk
    pub chunk_size: Option<u64>,

    /// Hex SHA-256 of `data`, verified when present
    pub chunk_hash: Option<String>,

    pub data: Bytes,
}

/// Outcome of a single chunk delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Received,
    Complete,
}

/// Response after uploading a chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub session_id: String,
    pub status: ReceiptStatus,
    pub received_count: usize,
    pub total_chunks: usize,
}

/// Response after a single-request upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectUploadResponse {
    pub uploaded: Vec<String>,
}

// ============================================================================
// Session Types
// ============================================================================

/// Upload session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Receiving chunks
    Open,
    /// All chunks received, concatenating into the destination
    Assembling,
    /// Destination file published
    Complete,
    /// Reassembly failed; staged chunks kept for a retry
    Failed,
    /// Idle past the timeout; staged chunks removed
    Expired,
}

/// Upload session tracked by the coordinator
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub id: String,

    /// Name as supplied by the client
    pub target_name: String,

    /// Validated destination under the shared root
    pub destination: PathBuf,

    pub total_chunks: usize,

    /// Size every non-final chunk must have, once known
    pub chunk_size: Option<u64>,

    /// Length of the final chunk, once received
    pub final_chunk_len: Option<u64>,

    /// Indices persisted so far; a set, so retransmits never double-count
    pub received_chunks: BTreeSet<usize>,

    pub state: SessionState,

    pub created_at: DateTime<Utc>,

    pub last_activity: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        id: String,
        target_name: String,
        destination: PathBuf,
        total_chunks: usize,
        chunk_size: Option<u64>,
    ) -> Self {
        let now = Utc::now();

        Self {
            id,
            target_name,
            destination,
            total_chunks,
            chunk_size,
            final_chunk_len: None,
            received_chunks: BTreeSet::new(),
            state: SessionState::Open,
            created_at: now,
            last_activity: now,
        }
    }

    /// Check if all chunks have been received
    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() == self.total_chunks
    }

    /// Get indices of chunks that still need to be uploaded
    pub fn missing_chunks(&self) -> Vec<usize> {
        (0..self.total_chunks)
            .filter(|i| !self.received_chunks.contains(i))
            .collect()
    }

    /// Whether the session has seen no chunk for longer than `timeout`
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        (now - self.last_activity)
            .to_std()
            .map(|idle| idle > timeout)
            .unwrap_or(false)
    }

    /// Enforce the chunk length rule: every chunk but the last has exactly
    /// `chunk_size` bytes, the last has at most that many.
    ///
    /// Records the inferred chunk size and the final length on success.
    pub fn accept_chunk_len(&mut self, index: usize, len: u64) -> Result<(), UploadError> {
        let is_final = index + 1 == self.total_chunks;

        if is_final {
            if let Some(size) = self.chunk_size {
                if len > size {
                    return Err(UploadError::ChunkSizeMismatch { index, expected: size, actual: len });
                }
            }
            self.final_chunk_len = Some(len);
            return Ok(());
        }

        match self.chunk_size {
            Some(size) if size != len => {
                Err(UploadError::ChunkSizeMismatch { index, expected: size, actual: len })
            }
            Some(_) => Ok(()),
            None => {
                if let Some(final_len) = self.final_chunk_len {
                    if final_len > len {
                        return Err(UploadError::ChunkSizeMismatch {
                            index,
                            expected: final_len,
                            actual: len,
                        });
                    }
                }
                self.chunk_size = Some(len);
                Ok(())
            }
        }
    }

    /// Calculate progress percentage
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        (self.received_chunks.len() as f64 / self.total_chunks as f64) * 100.0
    }

    /// Serializable view for the status endpoint
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            target_name: self.target_name.clone(),
            state: self.state,
            received_count: self.received_chunks.len(),
            total_chunks: self.total_chunks,
            missing_chunks: self.missing_chunks(),
            last_activity: self.last_activity,
        }
    }
}

/// Session status as reported to clients resuming an upload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub session_id: String,
    pub target_name: String,
    pub state: SessionState,
    pub received_count: usize,
    pub total_chunks: usize,
    pub missing_chunks: Vec<usize>,
    pub last_activity: DateTime<Utc>,
}

// ============================================================================
// Error Types
// ============================================================================

/// Upload error types
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Invalid session id: {0:?}")]
    InvalidSessionId(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Session {session_id} conflict: {field} was {recorded}, request has {requested}")]
    SessionConflict {
        session_id: String,
        field: &'static str,
        recorded: String,
        requested: String,
    },

    #[error("Chunk index out of bounds: {index} (total: {total})")]
    ChunkIndexOutOfBounds { index: usize, total: usize },

    #[error("Chunk {index} has {actual} bytes, expected {expected}")]
    ChunkSizeMismatch { index: usize, expected: u64, actual: u64 },

    #[error("Chunk hash mismatch: expected {expected}, got {actual}")]
    ChunkHashMismatch { expected: String, actual: String },

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Missing chunk: {0}")]
    MissingChunk(usize),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::InvalidPath(PathError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidPath(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSessionId(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::SessionExpired(_) => StatusCode::GONE,
            Self::SessionConflict { .. } => StatusCode::CONFLICT,
            Self::ChunkIndexOutOfBounds { .. } => StatusCode::BAD_REQUEST,
            Self::ChunkSizeMismatch { .. } => StatusCode::BAD_REQUEST,
            Self::ChunkHashMismatch { .. } => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::MissingChunk(_) => StatusCode::CONFLICT,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath(PathError::Io(_)) => "IO_ERROR",
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::InvalidSessionId(_) => "INVALID_SESSION_ID",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::SessionExpired(_) => "SESSION_EXPIRED",
            Self::SessionConflict { .. } => "SESSION_CONFLICT",
            Self::ChunkIndexOutOfBounds { .. } => "CHUNK_INDEX_OUT_OF_BOUNDS",
            Self::ChunkSizeMismatch { .. } => "CHUNK_SIZE_MISMATCH",
            Self::ChunkHashMismatch { .. } => "CHUNK_HASH_MISMATCH",
            Self::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            Self::MissingChunk(_) => "MISSING_CHUNK",
            Self::Io(_) => "IO_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(total: usize) -> UploadSession {
        UploadSession::new(
            "s1".to_string(),
            "movie.mkv".to_string(),
            PathBuf::from("/share/movie.mkv"),
            total,
            None,
        )
    }

    #[test]
    fn test_chunk_size_inferred_from_first_full_chunk() {
        let mut s = session(3);
        s.accept_chunk_len(0, 10).unwrap();
        assert_eq!(s.chunk_size, Some(10));

        assert!(matches!(
            s.accept_chunk_len(1, 9),
            Err(UploadError::ChunkSizeMismatch { index: 1, expected: 10, actual: 9 })
        ));
        s.accept_chunk_len(2, 4).unwrap();
        assert!(s.accept_chunk_len(2, 11).is_err());
    }

    #[test]
    fn test_final_chunk_first_bounds_later_chunks() {
        let mut s = session(3);
        s.accept_chunk_len(2, 5).unwrap();
        assert!(s.accept_chunk_len(0, 4).is_err());
        s.accept_chunk_len(0, 10).unwrap();
        s.accept_chunk_len(1, 10).unwrap();
    }

    #[test]
    fn test_missing_chunks_and_progress() {
        let mut s = session(4);
        s.received_chunks.insert(2);
        s.received_chunks.insert(0);
        s.received_chunks.insert(2);

        assert_eq!(s.missing_chunks(), vec![1, 3]);
        assert_eq!(s.progress(), 50.0);
        assert!(!s.is_complete());
    }

    #[test]
    fn test_idle_detection() {
        let s = session(1);
        let timeout = std::time::Duration::from_secs(60);
        assert!(!s.is_idle(s.last_activity + chrono::Duration::seconds(30), timeout));
        assert!(s.is_idle(s.last_activity + chrono::Duration::seconds(61), timeout));
        // Clock skew backwards never counts as idle
        assert!(!s.is_idle(s.last_activity - chrono::Duration::seconds(600), timeout));
    }

    #[test]
    fn test_error_codes() {
        let err = UploadError::SessionConflict {
            session_id: "s1".into(),
            field: "totalChunks",
            recorded: "3".into(),
            requested: "4".into(),
        };
        assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
        assert_eq!(err.code(), "SESSION_CONFLICT");

        let err = UploadError::from(PathError::Empty);
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "INVALID_PATH");
    }
}
