//! Chunk Store
//!
//! On-disk staging for uploaded chunks before assembly. Layout is
//! `{staging_root}/{session_id}/{index}`; the store never decides which
//! session or index to touch, it only does what the coordinator asks.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use uuid::Uuid;

use super::types::UploadError;
use crate::storage::TEMP_PREFIX;

/// Buffer used when concatenating chunks into the destination
const ASSEMBLY_BUFFER: usize = 1024 * 1024;

/// Local filesystem chunk staging
#[derive(Debug, Clone)]
pub struct ChunkStore {
    staging_root: PathBuf,
}

impl ChunkStore {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
        }
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.staging_root.join(session_id)
    }

    pub fn chunk_path(&self, session_id: &str, index: usize) -> PathBuf {
        self.session_dir(session_id).join(index.to_string())
    }

    /// Persist one chunk.
    ///
    /// Writes go to a uniquely named sibling, are synced, then renamed over
    /// `{index}`, so a retransmit replaces the chunk whole and a concurrent
    /// reader never sees a torn file. Last write wins.
    pub async fn write_chunk(
        &self,
        session_id: &str,
        index: usize,
        data: &[u8],
    ) -> Result<u64, UploadError> {
        let dir = self.session_dir(session_id);
        fs::create_dir_all(&dir).await?;

        let final_path = self.chunk_path(session_id, index);
        let temp_path = dir.join(format!("{}.tmp.{}", index, Uuid::new_v4()));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &final_path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!(
            session_id = %session_id,
            chunk_index = index,
            size = data.len(),
            "Chunk staged"
        );

        Ok(data.len() as u64)
    }

    /// Concatenate chunks `0..total_chunks` into `destination`.
    ///
    /// Every chunk must be present before anything is written. Output goes
    /// to a temporary file beside the destination and is renamed into place
    /// only after it is flushed and synced. Returns the assembled size.
    pub async fn reassemble(
        &self,
        session_id: &str,
        total_chunks: usize,
        destination: &Path,
    ) -> Result<u64, UploadError> {
        for index in 0..total_chunks {
            match fs::metadata(self.chunk_path(session_id, index)).await {
                Ok(meta) if meta.is_file() => {}
                Ok(_) => return Err(UploadError::MissingChunk(index)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(UploadError::MissingChunk(index))
                }
                Err(e) => return Err(e.into()),
            }
        }

        let parent = destination
            .parent()
            .ok_or_else(|| UploadError::InvalidRequest("destination has no parent".to_string()))?;
        fs::create_dir_all(parent).await?;
        let temp_path = parent.join(format!("{}{}.part", TEMP_PREFIX, Uuid::new_v4()));

        match self.write_assembled(session_id, total_chunks, &temp_path).await {
            Ok(size) => {
                if let Err(e) = fs::rename(&temp_path, destination).await {
                    let _ = fs::remove_file(&temp_path).await;
                    return Err(e.into());
                }
                Ok(size)
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn write_assembled(
        &self,
        session_id: &str,
        total_chunks: usize,
        temp_path: &Path,
    ) -> Result<u64, UploadError> {
        let file = fs::File::create(temp_path).await?;
        let mut writer = BufWriter::with_capacity(ASSEMBLY_BUFFER, file);
        let mut total = 0u64;

        for index in 0..total_chunks {
            let chunk = match fs::File::open(self.chunk_path(session_id, index)).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(UploadError::MissingChunk(index))
                }
                Err(e) => return Err(e.into()),
            };
            let mut reader = BufReader::with_capacity(ASSEMBLY_BUFFER, chunk);
            total += tokio::io::copy_buf(&mut reader, &mut writer).await?;
        }

        writer.flush().await?;
        writer.get_ref().sync_all().await?;

        Ok(total)
    }

    /// Delete all staged chunks and the session directory.
    ///
    /// Returns how many chunk files were removed; a session with nothing
    /// staged is not an error.
    pub async fn cleanup(&self, session_id: &str) -> Result<usize, UploadError> {
        let dir = self.session_dir(session_id);

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            fs::remove_file(entry.path()).await?;
            count += 1;
        }

        fs::remove_dir(&dir).await?;
        Ok(count)
    }
}

/// Compute SHA-256 hash of data
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Verify hash matches data, ignoring hex case
pub fn verify_hash(data: &[u8], expected_hash: &str) -> bool {
    compute_hash(data).eq_ignore_ascii_case(expected_hash.trim())
}
