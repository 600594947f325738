//! Range Streamer
//!
//! Serves stored files as block-sized byte streams. Reads are
//! non-destructive; dropping the stream mid-way just closes the file.

use std::path::Path;

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, Take};
use tokio_util::io::ReaderStream;

use super::range::{ByteRange, Span, Unsatisfiable};
use crate::storage::PathError;

/// Download error types
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Range not satisfiable: start {start}, size {size}")]
    RangeNotSatisfiable { start: u64, size: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Unsatisfiable> for DownloadError {
    fn from(e: Unsatisfiable) -> Self {
        DownloadError::RangeNotSatisfiable {
            start: e.start,
            size: e.size,
        }
    }
}

/// Byte stream over an opened file
pub type FileStream = ReaderStream<Take<fs::File>>;

/// An opened file ready to be streamed
pub struct RangedFile {
    /// Total size of the file on disk
    pub size: u64,

    /// Emitted interval; `None` when the whole file is sent
    pub span: Option<Span>,

    pub stream: FileStream,
}

impl RangedFile {
    /// Number of bytes the stream will yield
    pub fn content_length(&self) -> u64 {
        self.span.map_or(self.size, |span| span.len())
    }

    pub fn is_partial(&self) -> bool {
        self.span.is_some()
    }
}

/// Opens files for full or partial streaming
#[derive(Debug, Clone)]
pub struct RangeStreamer {
    block_size: usize,
}

impl RangeStreamer {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Open `path` and position it for `range`.
    ///
    /// The reported size and the streamed bytes always belong to the same
    /// file, even if `path` is replaced while the download runs.
    ///
    /// Fails with `NotFound` unless `path` is an existing regular file and
    /// with `RangeNotSatisfiable` when the range starts at or past the end.
    pub async fn serve(
        &self,
        path: &Path,
        range: Option<ByteRange>,
    ) -> Result<RangedFile, DownloadError> {
        let not_found = || DownloadError::NotFound(path.display().to_string());

        // Size comes from the opened handle so a concurrent rename over
        // `path` cannot pair one file's length with another file's bytes
        let mut file = match fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };
        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        let size = metadata.len();
        let span = range.map(|r| r.resolve(size)).transpose()?;

        let (start, len) = match span {
            Some(span) => (span.start, span.len()),
            None => (0, size),
        };
        if start > 0 {
            file.seek(std::io::SeekFrom::Start(start)).await?;
        }

        tracing::debug!(
            path = %path.display(),
            size = size,
            start = start,
            len = len,
            "Streaming file"
        );

        Ok(RangedFile {
            size,
            span,
            stream: ReaderStream::with_capacity(file.take(len), self.block_size),
        })
    }
}
