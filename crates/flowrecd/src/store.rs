//! Persistent key-value store and the session-log persister.
//!
//! The store holds JSON values under string keys with no transactions.
//! The persister mirrors the coordinator's log under
//! [`PERSISTED_LOG_KEY`] so a restarted daemon can restore it. Storage
//! errors are logged and never stop recording.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use flowrec_core::{LogEntry, PERSISTED_LOG_KEY};

use crate::coordinator::{CoordinatorEvent, CoordinatorHandle};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),

    #[error("store {operation} failed for {path}: {reason}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        reason: String,
    },

    #[error("stored value for {key} is not valid: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Asynchronous get/set of JSON values.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> StoreResult<()>;

    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> StoreResult<()>;
}

fn validate_key(key: &str) -> StoreResult<()> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// One `<key>.json` file per key under a directory.
///
/// Writes go to a temp file first and are renamed into place, so a crash
/// mid-write leaves the previous value.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{key}.json")))
    }
}

fn io_error(operation: &'static str, path: &Path, e: std::io::Error) -> StoreError {
    StoreError::Io {
        operation,
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl KeyValueStore for JsonFileStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let path = self.path_for(key)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, e)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_error("create_dir", &self.dir, e))?;

        let bytes = serde_json::to_vec(&value).map_err(|e| StoreError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, bytes)
            .await
            .map_err(|e| io_error("write", &temp_path, e))?;
        tokio::fs::rename(&temp_path, &path)
            .await
            .map_err(|e| io_error("rename", &path, e))
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error("remove", &path, e)),
        }
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Non-persistent store, used when persistence is disabled and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        validate_key(key)?;
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StoreResult<()> {
        validate_key(key)?;
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.values.lock().await.remove(key);
        Ok(())
    }
}

// ============================================================================
// Session log persistence
// ============================================================================

/// Reads the persisted session log. A missing key is an empty log.
///
/// # Errors
///
/// Returns `StoreError::Corrupt` if the stored value is not a log.
pub async fn load_log(store: &dyn KeyValueStore) -> StoreResult<Vec<LogEntry>> {
    match store.get(PERSISTED_LOG_KEY).await? {
        None => Ok(Vec::new()),
        Some(value) => serde_json::from_value(value).map_err(|e| StoreError::Corrupt {
            key: PERSISTED_LOG_KEY.to_string(),
            reason: e.to_string(),
        }),
    }
}

async fn save_log(store: &dyn KeyValueStore, entries: &[LogEntry]) -> StoreResult<()> {
    let value = serde_json::to_value(entries).map_err(|e| StoreError::Corrupt {
        key: PERSISTED_LOG_KEY.to_string(),
        reason: e.to_string(),
    })?;
    store.set(PERSISTED_LOG_KEY, value).await
}

/// Spawns the task that mirrors the log into `store` until `cancel` fires
/// or the coordinator goes away.
pub fn spawn_persister(
    handle: CoordinatorHandle,
    store: Arc<dyn KeyValueStore>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let mut events = handle.subscribe();

    tokio::spawn(async move {
        debug!("Log persister started");
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };

            let result = match event {
                Ok(CoordinatorEvent::RecordingStarted { .. }) => {
                    save_log(store.as_ref(), &[]).await
                }
                Ok(CoordinatorEvent::ActionRecorded { .. }) => {
                    save_log(store.as_ref(), &handle.get_log().await).await
                }
                Ok(CoordinatorEvent::LogCleared) => store.remove(PERSISTED_LOG_KEY).await,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Persister lagged, resyncing full log");
                    save_log(store.as_ref(), &handle.get_log().await).await
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            if let Err(e) = result {
                warn!(error = %e, "Failed to persist session log");
            }
        }
        info!("Log persister stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowrec_core::{ActionKind, ActionRecord, CaptureStamp, ContextId, PageIdentity};
    use serde_json::json;

    fn entry(stamp: i64) -> LogEntry {
        let action = ActionRecord::new(
            ActionKind::Click,
            "Click \"Go\"",
            "URL: https://example.com",
            CaptureStamp::from_millis(stamp),
            &PageIdentity::new("https://example.com", ""),
        );
        LogEntry::new(action, ContextId::new("tab-1"), CaptureStamp::from_millis(stamp))
    }

    #[tokio::test]
    async fn test_file_store_set_get_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state"));

        assert_eq!(store.get("workflowActions").await.unwrap(), None);
        store.set("workflowActions", json!([1, 2])).await.unwrap();
        assert_eq!(store.get("workflowActions").await.unwrap(), Some(json!([1, 2])));
        assert!(!dir.path().join("state/workflowActions.json.tmp").exists());

        store.remove("workflowActions").await.unwrap();
        assert_eq!(store.get("workflowActions").await.unwrap(), None);
        // Second remove is fine.
        store.remove("workflowActions").await.unwrap();
    }

    #[tokio::test]
    async fn test_keys_cannot_escape_the_directory() {
        let store = JsonFileStore::new("/tmp/flowrec-test");
        assert!(matches!(
            store.get("../etc/passwd").await,
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            MemoryStore::new().set("", json!(null)).await,
            Err(StoreError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("workflowActions.json"), "{not json").unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(
            store.get("workflowActions").await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_load_log_roundtrip() {
        let store = MemoryStore::new();
        assert!(load_log(&store).await.unwrap().is_empty());

        save_log(&store, &[entry(1), entry(2)]).await.unwrap();
        let restored = load_log(&store).await.unwrap();
        assert_eq!(restored, vec![entry(1), entry(2)]);
    }

    #[tokio::test]
    async fn test_load_log_rejects_wrong_shape() {
        let store = MemoryStore::new();
        store.set(PERSISTED_LOG_KEY, json!({"nope": true})).await.unwrap();
        assert!(matches!(load_log(&store).await, Err(StoreError::Corrupt { .. })));
    }
}
