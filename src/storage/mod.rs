//! Storage module for the shared transfer directory
//!
//! Path validation and listing of the directory both peers exchange files through.

mod listing;
mod path_guard;
mod types;

pub use listing::{is_temporary_name, list_files, TEMP_PREFIX};
pub use path_guard::{PathError, PathGuard};
pub use types::*;
