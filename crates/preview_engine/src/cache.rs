use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use preview_logging::{preview_debug, preview_warn};
use thiserror::Error;

use crate::filename::cache_file_name;
use crate::normalize::cache_key;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::{CacheEntry, EnrichmentResult};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("url cannot be used as a cache key: {0}")]
    InvalidKey(String),
    #[error("failed to persist cache entry: {0}")]
    Persist(#[from] PersistError),
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("cache io error: {0}")]
    Io(#[from] io::Error),
    #[error("cache worker failed: {0}")]
    Worker(String),
}

/// Keyed store of finalized results. Keys are normalised internally, so
/// `get` and `put` accept the raw bookmark URL.
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    /// Pure keyed read; freshness is the caller's decision.
    async fn get(&self, url: &str) -> Option<CacheEntry>;

    /// Replace any entry for `url`. The entry expires `ttl` after `result.fetched_at`.
    async fn put(&self, url: &str, result: &EnrichmentResult, ttl: Duration)
        -> Result<(), CacheError>;

    async fn remove(&self, url: &str) -> Result<(), CacheError>;
}

fn entry_for(url: &str, result: &EnrichmentResult, ttl: Duration) -> CacheEntry {
    let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
    let expires_at = result
        .fetched_at
        .checked_add_signed(ttl)
        .unwrap_or(chrono::DateTime::<chrono::Utc>::MAX_UTC);
    CacheEntry {
        url: url.to_string(),
        result: result.clone(),
        expires_at,
    }
}

fn key_for(url: &str) -> Result<String, CacheError> {
    cache_key(url).map_err(|err| CacheError::InvalidKey(err.message))
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_key(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().ok()?.get(key).cloned()
    }

    fn insert_key(&self, key: String, entry: CacheEntry) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(key, entry);
        }
    }

    fn remove_key(&self, key: &str) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(key);
        }
    }
}

#[async_trait::async_trait]
impl Cache for MemoryCache {
    async fn get(&self, url: &str) -> Option<CacheEntry> {
        let key = key_for(url).ok()?;
        self.get_key(&key)
    }

    async fn put(
        &self,
        url: &str,
        result: &EnrichmentResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = key_for(url)?;
        self.insert_key(key, entry_for(url, result, ttl));
        Ok(())
    }

    async fn remove(&self, url: &str) -> Result<(), CacheError> {
        let key = key_for(url)?;
        self.remove_key(&key);
        Ok(())
    }
}

/// One JSON file per key, replaced atomically, fronted by an in-memory copy.
/// Writers for the same key are serialised by a per-key async lock.
#[derive(Debug)]
pub struct DiskCache {
    writer: AtomicFileWriter,
    memory: MemoryCache,
    key_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DiskCache {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        crate::persist::ensure_dir(&dir)?;
        Ok(Self {
            writer: AtomicFileWriter::new(dir),
            memory: MemoryCache::new(),
            key_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        self.writer.dir()
    }

    /// Delete every stored entry.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let mut removed = 0;
        for dir_entry in fs::read_dir(self.dir())? {
            let path = dir_entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if let Ok(mut entries) = self.memory.entries.write() {
            entries.clear();
        }
        Ok(removed)
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = match self.key_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Forget the lock for `key` unless another writer still holds a handle.
    fn release_lock(&self, key: &str, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = match self.key_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // One handle in the map, one in `lock`.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(key);
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir().join(cache_file_name(key))
    }
}

#[async_trait::async_trait]
impl Cache for DiskCache {
    async fn get(&self, url: &str) -> Option<CacheEntry> {
        let key = key_for(url).ok()?;
        if let Some(entry) = self.memory.get_key(&key) {
            return Some(entry);
        }

        let path = self.path_for(&key);
        let read = tokio::task::spawn_blocking(move || fs::read(&path)).await;
        let bytes = match read {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(err)) if err.kind() == io::ErrorKind::NotFound => return None,
            Ok(Err(err)) => {
                preview_warn!("cache read failed for {}: {}", url, err);
                return None;
            }
            Err(err) => {
                preview_warn!("cache read task failed for {}: {}", url, err);
                return None;
            }
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) => {
                self.memory.insert_key(key, entry.clone());
                Some(entry)
            }
            Err(err) => {
                preview_warn!("ignoring corrupt cache entry for {}: {}", url, err);
                None
            }
        }
    }

    async fn put(
        &self,
        url: &str,
        result: &EnrichmentResult,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = key_for(url)?;
        let entry = entry_for(url, result, ttl);
        let encoded = serde_json::to_vec(&entry)?;

        let lock = self.lock_for(&key);
        let written = {
            let _guard = lock.lock().await;
            let writer = self.writer.clone();
            let filename = cache_file_name(&key);
            tokio::task::spawn_blocking(move || writer.write(&filename, &encoded))
                .await
                .map_err(|err| CacheError::Worker(err.to_string()))
                .and_then(|written| written.map_err(CacheError::from))
        };
        self.release_lock(&key, lock);
        written?;

        preview_debug!("cached {} until {}", url, entry.expires_at);
        self.memory.insert_key(key, entry);
        Ok(())
    }

    async fn remove(&self, url: &str) -> Result<(), CacheError> {
        let key = key_for(url)?;
        let lock = self.lock_for(&key);
        let removed = {
            let _guard = lock.lock().await;
            self.memory.remove_key(&key);
            let path = self.path_for(&key);
            tokio::task::spawn_blocking(move || match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(err) => Err(err),
            })
            .await
            .map_err(|err| CacheError::Worker(err.to_string()))
            .and_then(|removed| removed.map_err(CacheError::from))
        };
        self.release_lock(&key, lock);
        removed
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::Outcome;

    fn result(url: &str) -> EnrichmentResult {
        EnrichmentResult {
            url: url.to_string(),
            metadata: None,
            thumbnail: None,
            fetched_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            outcome: Outcome::Ok,
            error_kind: None,
        }
    }

    fn lock_count(cache: &DiskCache) -> usize {
        cache.key_locks.lock().unwrap().len()
    }

    #[tokio::test]
    async fn write_locks_are_released_after_use() {
        let temp = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(temp.path()).unwrap();
        let ttl = Duration::from_secs(60);

        for i in 0..5 {
            let url = format!("https://site{i}.example/");
            cache.put(&url, &result(&url), ttl).await.unwrap();
        }
        assert_eq!(lock_count(&cache), 0);

        let url = "https://site0.example/";
        cache.remove(url).await.unwrap();
        assert_eq!(lock_count(&cache), 0);
        let path = cache.path_for(&key_for(url).unwrap());
        assert!(!path.exists());
        assert!(cache.get(url).await.is_none());

        cache.remove(url).await.unwrap();
    }

    #[tokio::test]
    async fn a_held_lock_survives_release_by_another_writer() {
        let temp = tempfile::tempdir().unwrap();
        let cache = DiskCache::open(temp.path()).unwrap();
        let key = "https://a.example/";

        let first = cache.lock_for(key);
        let second = cache.lock_for(key);
        cache.release_lock(key, first);
        assert_eq!(lock_count(&cache), 1);
        cache.release_lock(key, second);
        assert_eq!(lock_count(&cache), 0);
    }
}
