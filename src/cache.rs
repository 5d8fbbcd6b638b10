//! Disk-backed JSON cache with a time-to-live and a size bound.
//!
//! Each entry is stored as `<sha256(key)>.json` in the cache directory. A
//! single `cache_index.json` records the original key, creation time and size
//! of every entry.
//!
//! The cache is an optimization: every I/O or decode failure is logged and
//! treated as a miss, never returned to the caller.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::persist::write_atomic;

/// Name of the index file inside the cache directory.
pub const INDEX_FILE_NAME: &str = "cache_index.json";

/// Default entry lifetime (1 hour).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

/// Default size bound used by [`Cache::cleanup`] (100 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;

const INDEX_VERSION: u32 = 1;

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current wall-clock time.
    fn now(&self) -> SystemTime;
}

/// The real wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    key: String,
    created_at_ms: u64,
    size_bytes: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheIndex {
    version: u32,
    entries: HashMap<String, IndexEntry>,
}

impl Default for CacheIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            entries: HashMap::new(),
        }
    }
}

/// Disk-backed key/value cache.
///
/// Safe to share across tasks; index mutations are serialized by a mutex.
#[derive(Debug)]
pub struct Cache {
    dir: PathBuf,
    max_age: Duration,
    clock: Arc<dyn Clock>,
    index: Mutex<CacheIndex>,
}

impl Cache {
    /// Opens (or creates) a cache in `dir` using the system clock.
    #[must_use]
    pub fn open(dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self::with_clock(dir, max_age, Arc::new(SystemClock))
    }

    /// Opens a cache with an explicit clock.
    #[must_use]
    pub fn with_clock(dir: impl Into<PathBuf>, max_age: Duration, clock: Arc<dyn Clock>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create cache directory");
        }
        let index = load_index(&dir.join(INDEX_FILE_NAME));
        debug!(dir = %dir.display(), entries = index.entries.len(), "cache opened");
        Self {
            dir,
            max_age,
            clock,
            index: Mutex::new(index),
        }
    }

    /// Returns the cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the number of indexed entries, fresh or stale.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_index().entries.len()
    }

    /// Returns true if the index is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the sum of indexed entry sizes in bytes.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.lock_index()
            .entries
            .values()
            .map(|entry| entry.size_bytes)
            .sum()
    }

    /// Looks up `key`.
    ///
    /// Returns `None` when the key is absent, older than the configured
    /// lifetime, or its payload cannot be read or decoded. Expired entries are
    /// removed as a side effect.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let hash = hash_key(key);
        let mut index = self.lock_index();
        let entry = index.entries.get(&hash)?;

        let age_ms = self.now_ms().saturating_sub(entry.created_at_ms);
        if u128::from(age_ms) > self.max_age.as_millis() {
            debug!(key, age_ms, "cache entry expired");
            index.entries.remove(&hash);
            self.remove_entry_file(&hash);
            self.save_index(&index);
            return None;
        }

        let path = self.entry_path(&hash);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, path = %path.display(), error = %e, "cache payload unreadable");
                index.entries.remove(&hash);
                self.save_index(&index);
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "cache payload corrupt, discarding");
                index.entries.remove(&hash);
                self.remove_entry_file(&hash);
                self.save_index(&index);
                None
            }
        }
    }

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key, error = %e, "cannot serialize cache payload");
                return;
            }
        };

        let hash = hash_key(key);
        let path = self.entry_path(&hash);
        if let Err(e) = write_atomic(&path, &bytes) {
            warn!(key, path = %path.display(), error = %e, "cannot write cache payload");
            return;
        }

        let mut index = self.lock_index();
        index.entries.insert(
            hash,
            IndexEntry {
                key: key.to_string(),
                created_at_ms: self.now_ms(),
                size_bytes: bytes.len() as u64,
            },
        );
        self.save_index(&index);
        debug!(key, size = bytes.len(), "cache entry stored");
    }

    /// Removes `key` if present.
    pub fn invalidate(&self, key: &str) {
        let hash = hash_key(key);
        let mut index = self.lock_index();
        if index.entries.remove(&hash).is_some() {
            self.remove_entry_file(&hash);
            self.save_index(&index);
        }
    }

    /// Evicts entries oldest-first until the total size is at most `max_bytes`.
    ///
    /// Sizes are taken from the files on disk. The index is persisted once, after
    /// eviction finishes.
    pub fn cleanup(&self, max_bytes: u64) -> usize {
        let mut index = self.lock_index();

        let mut entries: Vec<(String, u64, u64)> = index
            .entries
            .iter()
            .map(|(hash, entry)| {
                let size = fs::metadata(self.entry_path(hash))
                    .map_or(entry.size_bytes, |meta| meta.len());
                (hash.clone(), entry.created_at_ms, size)
            })
            .collect();
        let mut total: u64 = entries.iter().map(|(_, _, size)| size).sum();

        if total <= max_bytes {
            return 0;
        }

        entries.sort_by_key(|(_, created_at, _)| *created_at);

        let mut evicted = 0;
        for (hash, _, size) in entries {
            if total <= max_bytes {
                break;
            }
            index.entries.remove(&hash);
            self.remove_entry_file(&hash);
            total = total.saturating_sub(size);
            evicted += 1;
        }

        self.save_index(&index);
        info!(evicted, remaining_bytes = total, max_bytes, "cache cleanup complete");
        evicted
    }

    /// Removes entries older than the configured lifetime and returns how many.
    pub fn purge_expired(&self) -> usize {
        let now_ms = self.now_ms();
        let mut index = self.lock_index();
        let expired: Vec<String> = index
            .entries
            .iter()
            .filter(|(_, entry)| {
                u128::from(now_ms.saturating_sub(entry.created_at_ms)) > self.max_age.as_millis()
            })
            .map(|(hash, _)| hash.clone())
            .collect();
        if expired.is_empty() {
            return 0;
        }
        for hash in &expired {
            index.entries.remove(hash);
            self.remove_entry_file(hash);
        }
        self.save_index(&index);
        debug!(purged = expired.len(), "expired cache entries removed");
        expired.len()
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut index = self.lock_index();
        let hashes: Vec<String> = index.entries.keys().cloned().collect();
        for hash in &hashes {
            self.remove_entry_file(hash);
        }
        index.entries.clear();
        self.save_index(&index);
        info!(removed = hashes.len(), "cache cleared");
    }

    fn lock_index(&self) -> MutexGuard<'_, CacheIndex> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry_path(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{hash}.json"))
    }

    fn remove_entry_file(&self, hash: &str) {
        let path = self.entry_path(hash);
        if let Err(e) = fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %path.display(), error = %e, "cannot remove cache entry");
        }
    }

    fn save_index(&self, index: &CacheIndex) {
        let path = self.dir.join(INDEX_FILE_NAME);
        match serde_json::to_vec_pretty(index) {
            Ok(bytes) => {
                if let Err(e) = write_atomic(&path, &bytes) {
                    warn!(path = %path.display(), error = %e, "cannot save cache index");
                }
            }
            Err(e) => warn!(error = %e, "cannot serialize cache index"),
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn now_ms(&self) -> u64 {
        self.clock
            .now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_millis() as u64)
    }
}

/// Returns the lowercase hex SHA-256 digest of `key`.
#[must_use]
pub fn hash_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

fn load_index(path: &Path) -> CacheIndex {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return CacheIndex::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read cache index, starting empty");
            return CacheIndex::default();
        }
    };
    match serde_json::from_slice::<CacheIndex>(&bytes) {
        Ok(index) if index.version == INDEX_VERSION => index,
        Ok(index) => {
            warn!(version = index.version, "unsupported cache index version, starting empty");
            CacheIndex::default()
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "corrupt cache index, starting empty");
            CacheIndex::default()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manual_cache(dir: &Path, max_age: Duration) -> (Cache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(UNIX_EPOCH + Duration::from_secs(1_700_000_000)));
        let cache = Cache::with_clock(dir, max_age, clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_hash_key_is_sha256_hex() {
        assert_eq!(
            hash_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_set_then_get_returns_value() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = manual_cache(dir.path(), DEFAULT_MAX_AGE);
        cache.set("k", &vec!["a".to_string(), "b".to_string()]);
        let value: Vec<String> = cache.get("k").unwrap();
        assert_eq!(value, vec!["a", "b"]);
        assert!(dir.path().join(format!("{}.json", hash_key("k"))).exists());
        assert!(dir.path().join(INDEX_FILE_NAME).exists());
    }

    #[test]
    fn test_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = manual_cache(dir.path(), DEFAULT_MAX_AGE);
        assert!(cache.get::<String>("nope").is_none());
    }

    #[test]
    fn test_entry_expires_after_max_age() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = manual_cache(dir.path(), Duration::from_secs(60));
        cache.set("k", &1u32);

        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get::<u32>("k"), Some(1));

        clock.advance(Duration::from_millis(1));
        assert_eq!(cache.get::<u32>("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired_keeps_fresh_entries() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = manual_cache(dir.path(), Duration::from_secs(60));
        cache.set("old", &1u32);
        clock.advance(Duration::from_secs(45));
        cache.set("new", &2u32);
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get::<u32>("new"), Some(2));
        assert!(!dir.path().join(format!("{}.json", hash_key("old"))).exists());
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn test_corrupt_payload_is_miss() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = manual_cache(dir.path(), DEFAULT_MAX_AGE);
        cache.set("k", &1u32);
        fs::write(dir.path().join(format!("{}.json", hash_key("k"))), b"{not json").unwrap();
        assert_eq!(cache.get::<u32>("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_corrupt_index_starts_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(INDEX_FILE_NAME), b"garbage").unwrap();
        let cache = Cache::open(dir.path(), DEFAULT_MAX_AGE);
        assert!(cache.is_empty());
        cache.set("k", &"v");
        assert_eq!(cache.get::<String>("k").as_deref(), Some("v"));
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let cache = Cache::open(dir.path(), DEFAULT_MAX_AGE);
            cache.set("persist", &42u64);
        }
        let reopened = Cache::open(dir.path(), DEFAULT_MAX_AGE);
        assert_eq!(reopened.get::<u64>("persist"), Some(42));
    }

    #[test]
    fn test_invalidate_removes_entry() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = manual_cache(dir.path(), DEFAULT_MAX_AGE);
        cache.set("k", &1u8);
        cache.invalidate("k");
        assert!(cache.get::<u8>("k").is_none());
        assert!(!dir.path().join(format!("{}.json", hash_key("k"))).exists());
    }

    #[test]
    fn test_cleanup_evicts_oldest_first() {
        let dir = TempDir::new().unwrap();
        let (cache, clock) = manual_cache(dir.path(), DEFAULT_MAX_AGE);
        let payload = "x".repeat(100);
        for key in ["first", "second", "third"] {
            cache.set(key, &payload);
            clock.advance(Duration::from_secs(1));
        }
        let entry_size = cache.total_bytes() / 3;

        let evicted = cache.cleanup(entry_size * 2);

        assert_eq!(evicted, 1);
        assert!(cache.get::<String>("first").is_none());
        assert!(cache.get::<String>("second").is_some());
        assert!(cache.get::<String>("third").is_some());
    }

    #[test]
    fn test_cleanup_under_bound_is_noop() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = manual_cache(dir.path(), DEFAULT_MAX_AGE);
        cache.set("k", &"small");
        assert_eq!(cache.cleanup(DEFAULT_MAX_BYTES), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = TempDir::new().unwrap();
        let (cache, _) = manual_cache(dir.path(), DEFAULT_MAX_AGE);
        cache.set("a", &1);
        cache.set("b", &2);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
