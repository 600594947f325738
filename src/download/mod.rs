//! Download Module
//!
//! Range-aware streaming of files from the shared directory, so an
//! interrupted download can resume at its first missing byte.

pub mod range;
pub mod streamer;

pub use range::{ByteRange, Span, Unsatisfiable};
pub use streamer::{DownloadError, FileStream, RangeStreamer, RangedFile};
