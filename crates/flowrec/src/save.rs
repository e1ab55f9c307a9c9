//! Where exports end up.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::ExportError;

/// Suggested CSV file name, e.g. `action-recording-2024-01-15.csv`.
pub fn tabular_file_name(at: DateTime<Utc>) -> String {
    format!("action-recording-{}.csv", at.format("%Y-%m-%d"))
}

/// Suggested document file name, e.g. `workflow-1705312800000.json`.
pub fn document_file_name(at: DateTime<Utc>, extension: &str) -> String {
    format!("workflow-{}.{extension}", at.timestamp_millis())
}

/// Persists encoded export bytes under a suggested name.
pub trait FileSaver: Send + Sync {
    /// Returns the path actually written.
    ///
    /// # Errors
    ///
    /// Returns `ExportError::Write` if the bytes cannot be written.
    fn save(&self, suggested_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError>;
}

/// Writes into one directory. An existing file is never overwritten; the
/// name gets a `-1`, `-2`, ... suffix instead.
#[derive(Debug, Clone)]
pub struct DirectorySaver {
    dir: PathBuf,
}

impl DirectorySaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn free_path(&self, suggested_name: &str) -> PathBuf {
        let candidate = self.dir.join(suggested_name);
        if !candidate.exists() {
            return candidate;
        }

        let (stem, extension) = match suggested_name.rsplit_once('.') {
            Some((stem, ext)) => (stem, format!(".{ext}")),
            None => (suggested_name, String::new()),
        };
        (1u32..)
            .map(|n| self.dir.join(format!("{stem}-{n}{extension}")))
            .find(|path| !path.exists())
            .unwrap_or(candidate)
    }
}

impl FileSaver for DirectorySaver {
    fn save(&self, suggested_name: &str, bytes: &[u8]) -> Result<PathBuf, ExportError> {
        fs::create_dir_all(&self.dir).map_err(|source| ExportError::Write {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.free_path(suggested_name);
        fs::write(&path, bytes).map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;

        info!(path = %path.display(), bytes = bytes.len(), "Export written");
        Ok(path)
    }
}
