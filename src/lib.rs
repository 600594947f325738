//! QuickDrop Server Library
//!
//! Resumable file transfer between devices on a local network.
//! The server binary is in main.rs.
//!
//! # Modules
//!
//! - `upload`: chunked upload sessions, staging and reassembly
//! - `download`: byte-range streaming of shared files
//! - `storage`: path validation and listing of the shared directory
//! - `routes`: HTTP surface

pub mod config;
pub mod download;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;
pub mod upload;

pub use config::Config;
pub use state::AppState;
