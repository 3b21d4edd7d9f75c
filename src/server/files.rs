use crate::errors::{Result, StreamError};
use std::path::{Component, Path, PathBuf};

/// True when `name` is exactly one plain path component.
#[must_use]
pub fn is_safe_file_name(name: &str) -> bool {
    if name.is_empty() || name.contains(['/', '\\', '\0']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

/// Outcome of looking a requested name up under the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    InvalidName,
    Missing,
    File { path: PathBuf, size: u64 },
}

/// The canonicalized directory files are served from.
#[derive(Debug, Clone)]
pub struct DataRoot {
    root: PathBuf,
}

impl DataRoot {
    /// # Errors
    /// Returns a configuration error if `path` does not name a directory.
    pub fn open(path: &Path) -> Result<Self> {
        let root = path.canonicalize().map_err(|e| {
            StreamError::Config(format!("data root {} is not accessible: {e}", path.display()))
        })?;
        if !root.is_dir() {
            return Err(StreamError::Config(format!("data root {} is not a directory", root.display())));
        }
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolves `name` to a regular file that stays inside the root after
    /// symlinks are followed.
    pub async fn lookup(&self, name: &str) -> Lookup {
        if !is_safe_file_name(name) {
            return Lookup::InvalidName;
        }
        let Ok(path) = tokio::fs::canonicalize(self.root.join(name)).await else {
            return Lookup::Missing;
        };
        if !path.starts_with(&self.root) {
            return Lookup::Missing;
        }
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Lookup::File { path, size: meta.len() },
            _ => Lookup::Missing,
        }
    }
}
