//! Storage types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A file present in the shared directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub name: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}
