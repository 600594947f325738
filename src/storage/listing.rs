//! Shared directory listing

use std::path::Path;

use chrono::{DateTime, Utc};

use super::types::StoredFile;

/// Prefix of in-progress files written next to their final destination
pub const TEMP_PREFIX: &str = ".quickdrop-";

/// Whether a directory entry is an unpublished temporary file
pub fn is_temporary_name(name: &str) -> bool {
    name.starts_with(TEMP_PREFIX)
}

/// List regular files directly under `root`, sorted case-insensitively by name.
pub async fn list_files(root: &Path) -> std::io::Result<Vec<StoredFile>> {
    let mut files = Vec::new();
    let mut entries = tokio::fs::read_dir(root).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_temporary_name(&name) {
            continue;
        }

        // Follows symlinks; a dangling link is skipped rather than failing the listing
        let metadata = match tokio::fs::metadata(entry.path()).await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::debug!(name = %name, error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        files.push(StoredFile {
            name,
            size: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
        });
    }

    files.sort_by_key(|f| f.name.to_lowercase());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_lists_only_published_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("beta.txt"), b"12345").unwrap();
        std::fs::write(dir.path().join("Alpha.pdf"), b"1").unwrap();
        std::fs::write(dir.path().join(".quickdrop-123.part"), b"partial").unwrap();
        std::fs::create_dir(dir.path().join("folder")).unwrap();

        let files = list_files(dir.path()).await.unwrap();
        let names: Vec<_> = files.iter().map(|f| f.name.as_str()).collect();

        assert_eq!(names, vec!["Alpha.pdf", "beta.txt"]);
        assert_eq!(files[1].size, 5);
        assert!(files[0].modified.is_some());
    }

    #[tokio::test]
    async fn test_missing_root_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = list_files(&dir.path().join("absent")).await;
        assert!(result.is_err());
    }
}
