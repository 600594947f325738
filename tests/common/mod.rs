//! Common test utilities and fixtures.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use quickdrop_server::config::{Config, DownloadConfig, ServerConfig, StorageConfig, UploadConfig};
use quickdrop_server::{routes, AppState};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "quickdrop-test-boundary";

/// A router backed by temporary share and staging directories
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub share: TempDir,
    pub staging: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut Config)) -> Self {
        let share = TempDir::new().unwrap();
        let staging = TempDir::new().unwrap();

        let mut config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            storage: StorageConfig {
                share_dir: share.path().to_path_buf(),
                staging_dir: staging.path().to_path_buf(),
            },
            upload: UploadConfig {
                session_timeout: Duration::from_secs(60),
                sweep_interval: Duration::from_secs(60),
                max_chunk_bytes: 16 * 1024 * 1024,
                max_file_bytes: 64 * 1024 * 1024,
            },
            download: DownloadConfig { block_bytes: 64 * 1024 },
        };
        configure(&mut config);

        let state = AppState::new(config).unwrap();
        let router = routes::router(state.clone());

        Self {
            router,
            state,
            share,
            staging,
        }
    }

    pub fn share_path(&self) -> &Path {
        self.share.path()
    }

    pub fn write_shared(&self, name: &str, data: &[u8]) {
        let path = self.share.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, data).unwrap();
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        (status, headers, body)
    }

    pub async fn post_multipart(&self, uri: &str, form: MultipartBody) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(form.finish()))
            .unwrap();

        let (status, _, body) = self.send(request).await;
        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, json)
    }

    /// POST one chunk of a session
    pub async fn send_chunk(
        &self,
        session_id: &str,
        target_name: &str,
        index: usize,
        total_chunks: usize,
        data: &[u8],
    ) -> (StatusCode, Value) {
        let form = MultipartBody::new()
            .text("sessionId", session_id)
            .text("targetName", target_name)
            .text("index", &index.to_string())
            .text("totalChunks", &total_chunks.to_string())
            .file("chunk", "blob", data);
        self.post_multipart("/upload/chunk", form).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.send(request).await
    }

    pub async fn get_range(&self, uri: &str, range: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let request = Request::builder()
            .uri(uri)
            .header("Range", range)
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }
}

/// Hand-built `multipart/form-data` body
#[derive(Default)]
pub struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                BOUNDARY, name, file_name
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.bytes
            .extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        self.bytes
    }
}

/// Deterministic, non-repeating-looking test payload
pub fn test_data(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + i / 251) % 256) as u8).collect()
}

pub fn split_into_chunks(data: &[u8], chunk_size: usize) -> Vec<Vec<u8>> {
    data.chunks(chunk_size).map(|c| c.to_vec()).collect()
}
