//! Single-request uploads
//!
//! Streams a whole file body to disk without chunking. Used by the browser
//! form; large transfers from constrained clients use the chunked protocol.

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use uuid::Uuid;

use super::types::UploadError;
use crate::storage::{PathGuard, TEMP_PREFIX};

/// Give up finding a free name after this many suffixes
const MAX_NAME_ATTEMPTS: usize = 10_000;

/// Writes streamed uploads into the shared directory without overwriting
#[derive(Debug, Clone)]
pub struct DirectUploader {
    path_guard: PathGuard,
    max_file_bytes: u64,
}

/// A file published by [`DirectUploader::store`]
#[derive(Debug, Clone)]
pub struct StoredUpload {
    /// Name relative to the shared root, including any `_N` suffix
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

impl DirectUploader {
    pub fn new(path_guard: PathGuard, max_file_bytes: u64) -> Self {
        Self {
            path_guard,
            max_file_bytes,
        }
    }

    /// Stream `body` into the shared directory under `file_name`.
    ///
    /// The name is used verbatim. When it is taken, `stem_1.ext`,
    /// `stem_2.ext`, ... is tried. Publication is a hard link from the
    /// temporary file, which fails rather than clobbers an existing name.
    pub async fn store<S, E>(&self, file_name: &str, body: S) -> Result<StoredUpload, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let requested = self.path_guard.resolve_decoded(file_name)?;
        self.path_guard.ensure_confined(&requested).await?;

        let parent = requested
            .parent()
            .ok_or_else(|| UploadError::InvalidRequest("destination has no parent".to_string()))?
            .to_path_buf();
        fs::create_dir_all(&parent).await?;

        // Removed on every exit path, including a client disconnect dropping this future
        let temp = TempFile(parent.join(format!("{}{}.part", TEMP_PREFIX, Uuid::new_v4())));
        let size = self.write_body(&temp.0, body).await?;
        let path = self.publish(&temp.0, &requested).await?;

        let name = path
            .strip_prefix(self.path_guard.root())
            .unwrap_or(&path)
            .to_string_lossy()
            .into_owned();

        tracing::info!(name = %name, size = size, "Stored direct upload");

        Ok(StoredUpload { name, path, size })
    }

    async fn write_body<S, E>(&self, temp_path: &Path, body: S) -> Result<u64, UploadError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let mut body = std::pin::pin!(body);
        let file = fs::File::create(temp_path).await?;
        let mut writer = BufWriter::new(file);
        let mut size = 0u64;

        while let Some(piece) = body.next().await {
            let piece = piece.map_err(|e| UploadError::Io(std::io::Error::other(e)))?;
            size += piece.len() as u64;
            if size > self.max_file_bytes {
                return Err(UploadError::PayloadTooLarge {
                    size,
                    max: self.max_file_bytes,
                });
            }
            writer.write_all(&piece).await?;
        }

        writer.flush().await?;
        writer.get_ref().sync_all().await?;
        Ok(size)
    }

    async fn publish(&self, temp_path: &Path, requested: &Path) -> Result<PathBuf, UploadError> {
        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = numbered_name(requested, attempt);
            match fs::hard_link(temp_path, &candidate).await {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(UploadError::InvalidRequest(format!(
            "no free name for {}",
            requested.display()
        )))
    }
}

struct TempFile(PathBuf);

impl Drop for TempFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// `dir/stem.ext` for attempt 0, `dir/stem_N.ext` afterwards
fn numbered_name(path: &Path, attempt: usize) -> PathBuf {
    if attempt == 0 {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, attempt, ext.to_string_lossy()),
        None => format!("{}_{}", stem, attempt),
    };
    path.with_file_name(file_name)
}
