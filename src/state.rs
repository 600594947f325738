//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::download::RangeStreamer;
use crate::storage::PathGuard;
use crate::upload::{ChunkStore, DirectUploader, UploadCoordinator};

/// Error type for state initialization
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Failed to prepare shared directory {path}: {source}")]
    ShareDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to prepare staging directory {path}: {source}")]
    StagingDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    path_guard: PathGuard,
    coordinator: UploadCoordinator,
    direct_uploader: DirectUploader,
    streamer: RangeStreamer,
}

impl AppState {
    /// Create a new application state
    ///
    /// Creates the shared and staging directories if they are missing.
    pub fn new(config: Config) -> Result<Self, StateError> {
        let path_guard =
            PathGuard::new(&config.storage.share_dir).map_err(|source| StateError::ShareDir {
                path: config.storage.share_dir.display().to_string(),
                source,
            })?;

        std::fs::create_dir_all(&config.storage.staging_dir).map_err(|source| {
            StateError::StagingDir {
                path: config.storage.staging_dir.display().to_string(),
                source,
            }
        })?;

        let coordinator = UploadCoordinator::new(
            ChunkStore::new(&config.storage.staging_dir),
            path_guard.clone(),
            config.upload.session_timeout,
            config.upload.max_chunk_bytes,
        );
        let direct_uploader = DirectUploader::new(path_guard.clone(), config.upload.max_file_bytes);
        let streamer = RangeStreamer::new(config.download.block_bytes);

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                path_guard,
                coordinator,
                direct_uploader,
                streamer,
            }),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the path guard for the shared directory
    pub fn path_guard(&self) -> &PathGuard {
        &self.inner.path_guard
    }

    /// Get the upload coordinator
    pub fn coordinator(&self) -> &UploadCoordinator {
        &self.inner.coordinator
    }

    /// Get the single-request uploader
    pub fn direct_uploader(&self) -> &DirectUploader {
        &self.inner.direct_uploader
    }

    /// Get the download streamer
    pub fn streamer(&self) -> &RangeStreamer {
        &self.inner.streamer
    }
}
