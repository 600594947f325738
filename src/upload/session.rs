//! Upload Coordinator
//!
//! Tracks chunked upload sessions:
//! - Registry of sessions, each behind its own mutex
//! - Chunk validation and delegation to the chunk store
//! - Single-shot reassembly once every index has arrived
//! - Background expiry of idle sessions

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::chunk_store::{compute_hash, verify_hash, ChunkStore};
use super::types::{
    ChunkReceipt, ChunkUpload, ReceiptStatus, SessionSnapshot, SessionState, UploadError,
    UploadSession, MAX_SESSION_ID_LEN,
};
use crate::storage::PathGuard;

type SessionHandle = Arc<Mutex<UploadSession>>;

/// Shortest period the background sweep runs at
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Upload Coordinator
// ============================================================================

/// Owns every upload session
#[derive(Clone)]
pub struct UploadCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    /// Active sessions indexed by ID
    sessions: RwLock<HashMap<String, SessionHandle>>,

    chunk_store: ChunkStore,

    path_guard: PathGuard,

    /// Idle time after which a session expires
    idle_timeout: Duration,

    /// Largest accepted chunk body
    max_chunk_bytes: u64,
}

impl UploadCoordinator {
    pub fn new(
        chunk_store: ChunkStore,
        path_guard: PathGuard,
        idle_timeout: Duration,
        max_chunk_bytes: u64,
    ) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                sessions: RwLock::new(HashMap::new()),
                chunk_store,
                path_guard,
                idle_timeout,
                max_chunk_bytes,
            }),
        }
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.inner.chunk_store
    }

    // ========================================================================
    // Chunk Delivery
    // ========================================================================

    /// Accept one chunk, creating the session on first contact.
    ///
    /// The session's mutex is held from validation through reassembly, so
    /// writes to the same index are serialized and the completion check
    /// fires once even when several final chunks race.
    pub async fn begin_or_continue(&self, upload: ChunkUpload) -> Result<ChunkReceipt, UploadError> {
        let session_id = match upload.session_id.as_deref() {
            Some(id) => {
                validate_session_id(id)?;
                id.to_string()
            }
            None => Uuid::new_v4().to_string(),
        };

        if upload.total_chunks == 0 {
            return Err(UploadError::InvalidRequest("totalChunks must be at least 1".to_string()));
        }
        if upload.index >= upload.total_chunks {
            return Err(UploadError::ChunkIndexOutOfBounds {
                index: upload.index,
                total: upload.total_chunks,
            });
        }

        let len = upload.data.len() as u64;
        if len > self.inner.max_chunk_bytes {
            return Err(UploadError::PayloadTooLarge {
                size: len,
                max: self.inner.max_chunk_bytes,
            });
        }

        if let Some(expected) = upload.chunk_hash.as_deref() {
            if !verify_hash(&upload.data, expected) {
                return Err(UploadError::ChunkHashMismatch {
                    expected: expected.to_string(),
                    actual: compute_hash(&upload.data),
                });
            }
        }

        let destination = match self.inner.path_guard.resolve(&upload.target_name) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    target_name = %upload.target_name,
                    error = %e,
                    "Rejected upload target"
                );
                return Err(e.into());
            }
        };
        self.inner.path_guard.ensure_confined(&destination).await?;

        let handle = self
            .get_or_create(&session_id, &upload, destination.clone())
            .await;
        let mut session = handle.lock().await;

        if session.state == SessionState::Expired {
            return Err(UploadError::SessionExpired(session_id));
        }

        check_conflict(&session, &destination, &upload)?;

        if session.state == SessionState::Complete {
            // Retransmit after success; the published file is already final
            return Ok(receipt(&session, ReceiptStatus::Complete));
        }

        session.accept_chunk_len(upload.index, len)?;

        self.inner
            .chunk_store
            .write_chunk(&session.id, upload.index, &upload.data)
            .await?;

        session.received_chunks.insert(upload.index);
        session.last_activity = Utc::now();

        tracing::debug!(
            session_id = %session.id,
            chunk_index = upload.index,
            chunks_received = session.received_chunks.len(),
            total_chunks = session.total_chunks,
            progress = format!("{:.1}%", session.progress()),
            "Chunk received"
        );

        if !session.is_complete() {
            return Ok(receipt(&session, ReceiptStatus::Received));
        }

        self.assemble(&mut session).await?;
        Ok(receipt(&session, ReceiptStatus::Complete))
    }

    /// Reassemble a session whose chunk set is complete. Caller holds the lock.
    async fn assemble(&self, session: &mut UploadSession) -> Result<(), UploadError> {
        session.state = SessionState::Assembling;

        tracing::info!(
            session_id = %session.id,
            target_name = %session.target_name,
            chunks = session.total_chunks,
            "Assembling file from chunks"
        );

        let result = self
            .inner
            .chunk_store
            .reassemble(&session.id, session.total_chunks, &session.destination)
            .await;

        match result {
            Ok(size) => {
                session.state = SessionState::Complete;
                session.last_activity = Utc::now();

                tracing::info!(
                    session_id = %session.id,
                    destination = %session.destination.display(),
                    size = size,
                    "Upload session completed"
                );

                if let Err(e) = self.inner.chunk_store.cleanup(&session.id).await {
                    // The file is published; leftovers are retried by the sweep
                    tracing::warn!(session_id = %session.id, error = %e, "Failed to clean up staged chunks");
                }
                Ok(())
            }
            Err(e) => {
                session.state = SessionState::Failed;
                session.last_activity = Utc::now();

                tracing::error!(
                    session_id = %session.id,
                    error = %e,
                    "Reassembly failed; staged chunks kept"
                );
                Err(e)
            }
        }
    }

    async fn get_or_create(
        &self,
        session_id: &str,
        upload: &ChunkUpload,
        destination: std::path::PathBuf,
    ) -> SessionHandle {
        if let Some(handle) = self.inner.sessions.read().await.get(session_id) {
            return handle.clone();
        }

        let mut sessions = self.inner.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(
                    session_id = %session_id,
                    target_name = %upload.target_name,
                    total_chunks = upload.total_chunks,
                    "Created upload session"
                );
                Arc::new(Mutex::new(UploadSession::new(
                    session_id.to_string(),
                    upload.target_name.clone(),
                    destination,
                    upload.total_chunks,
                    upload.chunk_size,
                )))
            })
            .clone()
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    /// Status of a session, waiting for any in-flight chunk to finish
    pub async fn snapshot(&self, session_id: &str) -> Result<SessionSnapshot, UploadError> {
        let handle = self
            .inner
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| UploadError::SessionNotFound(session_id.to_string()))?;

        let session = handle.lock().await;
        Ok(session.snapshot())
    }

    /// Get session count
    pub async fn session_count(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Expire sessions idle as of now
    ///
    /// Returns the number of sessions expired or forgotten
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_idle_at(Utc::now()).await
    }

    /// Expire sessions idle as of `now`.
    ///
    /// Open and Failed sessions become Expired and lose their staged chunks.
    /// The Expired session stays registered for one more idle timeout so a
    /// late client sees `SESSION_EXPIRED` instead of silently starting over.
    /// Idle Complete and Expired sessions are forgotten. Sessions busy with
    /// a chunk are skipped until the next sweep.
    pub async fn sweep_idle_at(&self, now: DateTime<Utc>) -> usize {
        let handles: Vec<(String, SessionHandle)> = {
            let sessions = self.inner.sessions.read().await;
            sessions.iter().map(|(id, h)| (id.clone(), h.clone())).collect()
        };

        let mut expired = 0;
        let mut forgotten = 0;
        for (id, handle) in handles {
            let Ok(mut session) = handle.try_lock() else {
                continue;
            };
            if !session.is_idle(now, self.inner.idle_timeout) {
                continue;
            }

            if matches!(session.state, SessionState::Open | SessionState::Failed) {
                session.state = SessionState::Expired;
                session.received_chunks.clear();
                session.last_activity = now;
                expired += 1;

                match self.inner.chunk_store.cleanup(&id).await {
                    Ok(count) => tracing::debug!(
                        session_id = %id,
                        target_name = %session.target_name,
                        chunks = count,
                        "Expired idle upload session"
                    ),
                    Err(e) => tracing::warn!(
                        session_id = %id,
                        error = %e,
                        "Failed to remove staged chunks of expired session"
                    ),
                }
                continue;
            }

            let mut sessions = self.inner.sessions.write().await;
            if sessions.get(&id).is_some_and(|current| Arc::ptr_eq(current, &handle)) {
                sessions.remove(&id);
                forgotten += 1;
            }
        }

        if expired + forgotten > 0 {
            tracing::info!(expired = expired, forgotten = forgotten, "Swept idle upload sessions");
        }

        expired + forgotten
    }

    /// Start background sweep task
    ///
    /// A zero interval is raised to [`MIN_SWEEP_INTERVAL`].
    pub fn start_sweep_task(self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let interval = interval.max(MIN_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                self.sweep_expired().await;
            }
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Ids that collide with static routes under `/upload/`
const RESERVED_SESSION_IDS: &[&str] = &["chunk"];

/// Session ids name staging directories, so only a safe alphabet is allowed
fn validate_session_id(id: &str) -> Result<(), UploadError> {
    let valid = !id.is_empty()
        && !RESERVED_SESSION_IDS.contains(&id)
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

    if valid {
        Ok(())
    } else {
        Err(UploadError::InvalidSessionId(id.to_string()))
    }
}

fn check_conflict(
    session: &UploadSession,
    destination: &std::path::Path,
    upload: &ChunkUpload,
) -> Result<(), UploadError> {
    let conflict = |field, recorded: String, requested: String| UploadError::SessionConflict {
        session_id: session.id.clone(),
        field,
        recorded,
        requested,
    };

    if session.destination != destination {
        return Err(conflict(
            "targetName",
            session.target_name.clone(),
            upload.target_name.clone(),
        ));
    }
    if session.total_chunks != upload.total_chunks {
        return Err(conflict(
            "totalChunks",
            session.total_chunks.to_string(),
            upload.total_chunks.to_string(),
        ));
    }
    if let (Some(recorded), Some(requested)) = (session.chunk_size, upload.chunk_size) {
        if recorded != requested {
            return Err(conflict("chunkSize", recorded.to_string(), requested.to_string()));
        }
    }
    Ok(())
}

fn receipt(session: &UploadSession, status: ReceiptStatus) -> ChunkReceipt {
    ChunkReceipt {
        session_id: session.id.clone(),
        status,
        received_count: session.received_chunks.len(),
        total_chunks: session.total_chunks,
    }
}

// ============================================================================
// Tests
// ============================================================================
