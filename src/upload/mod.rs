//! Chunked Upload Module
//!
//! Implements resumable uploads of arbitrarily large files:
//! - Client splits the file into fixed-size chunks
//! - Each chunk is staged on disk under its session and index
//! - Once every index has arrived the chunks are concatenated in index
//!   order and atomically published under the shared directory
//!
//! Protocol Flow:
//! 1. Client picks (or lets the server pick) a session id
//! 2. Client posts chunks in any order, retrying failed ones
//! 3. The chunk that completes the set triggers reassembly
//! 4. Idle sessions are expired by a background sweep

pub mod chunk_store;
pub mod direct;
pub mod session;
pub mod types;

pub use chunk_store::{compute_hash, verify_hash, ChunkStore};
pub use direct::{DirectUploader, StoredUpload};
pub use session::UploadCoordinator;
pub use types::*;
