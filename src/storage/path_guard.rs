//! Path Guard
//!
//! Maps client-supplied relative names onto the shared root directory.
//! Uploads and downloads go through the same checks, so a name that can be
//! written can always be read back under the exact same spelling.

use std::path::{Component, Path, PathBuf};

/// Reasons a client-supplied name is refused
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("File name is empty")]
    Empty,

    #[error("File name is not valid percent-encoded UTF-8: {0}")]
    Encoding(String),

    #[error("Absolute paths are not allowed: {0}")]
    Absolute(String),

    #[error("Parent directory segments are not allowed: {0}")]
    Traversal(String),

    #[error("File name contains a NUL byte")]
    NulByte,

    #[error("Path resolves outside the shared directory: {0}")]
    EscapesRoot(String),

    #[error("Failed to inspect path: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolves names against a single shared root
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Create the root if needed and pin it to its canonical form
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.canonicalize()?,
        })
    }

    /// Canonical shared root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Percent-decode `raw` and resolve it under the root.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, PathError> {
        let decoded =
            urlencoding::decode(raw).map_err(|_| PathError::Encoding(raw.to_string()))?;
        self.resolve_decoded(&decoded)
    }

    /// Resolve an already-decoded name under the root.
    ///
    /// Purely lexical: characters are never replaced or stripped. Only `..`
    /// segments, absolute forms and NUL bytes are refused, since the
    /// destination filesystem enforces its own naming rules anyway.
    pub fn resolve_decoded(&self, name: &str) -> Result<PathBuf, PathError> {
        if name.is_empty() {
            return Err(PathError::Empty);
        }
        if name.contains('\0') {
            return Err(PathError::NulByte);
        }
        if name.starts_with('/') || name.starts_with('\\') {
            return Err(PathError::Absolute(name.to_string()));
        }

        // Clients on other platforms may use either separator
        if name.split(['/', '\\']).any(|segment| segment == "..") {
            return Err(PathError::Traversal(name.to_string()));
        }

        let mut relative = PathBuf::new();
        for component in Path::new(name).components() {
            match component {
                Component::Normal(part) => relative.push(part),
                Component::CurDir => {}
                Component::ParentDir => return Err(PathError::Traversal(name.to_string())),
                Component::RootDir | Component::Prefix(_) => {
                    return Err(PathError::Absolute(name.to_string()))
                }
            }
        }

        if relative.as_os_str().is_empty() {
            return Err(PathError::Empty);
        }

        let resolved = self.root.join(relative);
        if !resolved.starts_with(&self.root) {
            return Err(PathError::EscapesRoot(name.to_string()));
        }

        Ok(resolved)
    }

    /// Verify that symlinks along `path` do not lead outside the root.
    ///
    /// Canonicalizes the nearest existing ancestor (or the path itself when it
    /// exists) on the blocking pool.
    pub async fn ensure_confined(&self, path: &Path) -> Result<(), PathError> {
        let root = self.root.clone();
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || confined_sync(&root, &path))
            .await
            .map_err(|e| PathError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}"))))?
    }
}

fn confined_sync(root: &Path, path: &Path) -> Result<(), PathError> {
    let mut candidate = Some(path);
    while let Some(current) = candidate {
        match std::fs::symlink_metadata(current) {
            Ok(_) => {
                let canonical = current
                    .canonicalize()
                    .map_err(|_| PathError::EscapesRoot(path.display().to_string()))?;
                if !canonical.starts_with(root) {
                    return Err(PathError::EscapesRoot(path.display().to_string()));
                }
                return Ok(());
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                candidate = current.parent();
            }
            Err(err) => return Err(PathError::Io(err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn guard() -> (TempDir, PathGuard) {
        let dir = TempDir::new().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        (dir, guard)
    }

    #[test]
    fn test_rejects_traversal() {
        let (_dir, guard) = guard();

        assert!(matches!(guard.resolve("../../etc/passwd"), Err(PathError::Traversal(_))));
        assert!(matches!(guard.resolve("a/../../b"), Err(PathError::Traversal(_))));
        assert!(matches!(guard.resolve("..\\secret"), Err(PathError::Traversal(_))));
        assert!(matches!(guard.resolve("%2e%2e%2fsecret"), Err(PathError::Traversal(_))));
    }

    #[test]
    fn test_rejects_absolute_and_empty() {
        let (_dir, guard) = guard();

        assert!(matches!(guard.resolve("/etc/passwd"), Err(PathError::Absolute(_))));
        assert!(matches!(guard.resolve("%2Fetc%2Fpasswd"), Err(PathError::Absolute(_))));
        assert!(matches!(guard.resolve(""), Err(PathError::Empty)));
        assert!(matches!(guard.resolve("./"), Err(PathError::Empty)));
        assert!(matches!(guard.resolve("a%00b"), Err(PathError::NulByte)));
    }

    #[test]
    fn test_keeps_names_verbatim() {
        let (_dir, guard) = guard();

        let plain = guard.resolve("My File (1).txt").unwrap();
        assert_eq!(plain, guard.root().join("My File (1).txt"));

        let encoded = guard.resolve("My%20File%20%281%29.txt").unwrap();
        assert_eq!(encoded, plain);

        let unicode = guard.resolve("%E7%85%A7%E7%89%87 d\u{e9}j\u{e0}.jpg").unwrap();
        assert_eq!(unicode, guard.root().join("照片 déjà.jpg"));

        // Dots inside a name are not traversal
        let dotted = guard.resolve("archive..tar.gz").unwrap();
        assert_eq!(dotted, guard.root().join("archive..tar.gz"));
    }

    #[test]
    fn test_nested_relative_paths() {
        let (_dir, guard) = guard();
        let nested = guard.resolve("photos/./2024/img.png").unwrap();
        assert_eq!(nested, guard.root().join("photos").join("2024").join("img.png"));
    }

    #[test]
    fn test_decoded_names_are_not_decoded_twice() {
        let (_dir, guard) = guard();
        let literal = guard.resolve_decoded("100%25 done.txt").unwrap();
        assert_eq!(literal, guard.root().join("100%25 done.txt"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected() {
        let (dir, guard) = guard();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let path = guard.resolve("link/file.txt").unwrap();
        assert!(matches!(
            guard.ensure_confined(&path).await,
            Err(PathError::EscapesRoot(_))
        ));

        let inside = guard.resolve("new/file.txt").unwrap();
        assert!(guard.ensure_confined(&inside).await.is_ok());
    }
}
