//! Persistence of the last known result per endpoint.
//!
//! # Design
//! The store is a key-value blob: the whole `endpoint id -> CallResult` map
//! is read once when callers are built and written back as a unit. A
//! corrupt entry for one endpoint is dropped on load instead of discarding
//! every endpoint's history.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::StoreError;
use crate::result::CallResult;

pub type StoredResults = BTreeMap<String, CallResult>;

/// Key-value persistence for call results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn load(&self) -> Result<StoredResults, StoreError>;
    async fn save(&self, results: &StoredResults) -> Result<(), StoreError>;
}

/// Results kept as a pretty-printed JSON object in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn load(&self) -> Result<StoredResults, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoredResults::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(StoredResults::new());
        }
        let entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(&raw)?;
        Ok(decode_entries(entries))
    }

    async fn save(&self, results: &StoredResults) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(results)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn decode_entries(entries: BTreeMap<String, serde_json::Value>) -> StoredResults {
    entries
        .into_iter()
        .filter_map(|(id, value)| match serde_json::from_value::<CallResult>(value) {
            Ok(result) => Some((id, result)),
            Err(e) => {
                warn!(endpoint = %id, error = %e, "discarding unreadable stored result");
                None
            }
        })
        .collect()
}

/// In-process store. Counts saves so owners can observe persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    results: Mutex<StoredResults>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_results(results: StoredResults) -> Self {
        Self {
            results: Mutex::new(results),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(&self) -> StoredResults {
        self.results.lock().clone()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn load(&self) -> Result<StoredResults, StoreError> {
        Ok(self.snapshot())
    }

    async fn save(&self, results: &StoredResults) -> Result<(), StoreError> {
        *self.results.lock() = results.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(code: u16) -> CallResult {
        let mut result = CallResult::failure("body");
        result.status_code = code;
        result
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("results.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_returns_same_results() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("results.json"));
        let mut results = StoredResults::new();
        results.insert("a".to_string(), sample(200));
        results.insert("b".to_string(), sample(0));
        store.save(&results).await.unwrap();

        assert_eq!(store.load().await.unwrap(), results);
        assert!(!dir.path().join("results.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_entry_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(
            &path,
            r#"{
                "good": {"status_code": 200, "fetched_at": "2024-01-01T00:00:00Z", "body": "ok"},
                "bad": {"status_code": "nope"}
            }"#,
        )
        .unwrap();
        let loaded = JsonFileStore::new(&path).load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["good"].body, "ok");
    }

    #[tokio::test]
    async fn non_json_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        std::fs::write(&path, "not json").unwrap();
        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, StoreError::Serde(_)));
    }

    #[tokio::test]
    async fn memory_store_counts_saves() {
        let store = MemoryStore::new();
        let mut results = StoredResults::new();
        results.insert("a".to_string(), sample(201));
        store.save(&results).await.unwrap();
        store.save(&results).await.unwrap();
        assert_eq!(store.save_count(), 2);
        assert_eq!(store.load().await.unwrap(), results);
    }
}
