//! URL-keyed cache store with TTL freshness and epoch-wide purge.
//!
//! Entries live at `{root}/{md5(url)}.cache`; the file mtime is the
//! freshness clock. A sentinel file named `{md5("timestamp")}.cache` anchors
//! the cache epoch: once the sentinel itself goes stale the entire cache
//! directory is deleted and recreated, bounding growth from abandoned keys
//! whose per-entry TTL check is never hit again.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use md5::{Digest, Md5};
use tracing::{debug, info};

use crate::config::CacheConfig;

/// Name seed for the epoch sentinel file.
const EPOCH_SENTINEL_SEED: &str = "timestamp";

/// Extension shared by cache entries and the sentinel.
const CACHE_EXT: &str = ".cache";

// ---------------------------------------------------------------------------
// CacheStore
// ---------------------------------------------------------------------------

/// Owns the on-disk cache directory for remote fetch bodies.
#[derive(Debug, Clone)]
pub struct CacheStore {
    root: PathBuf,
    ttl: Duration,
}

impl CacheStore {
    /// Create a new [`CacheStore`] from the cache configuration.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            root: config.root.clone(),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// Cache key for a request URL: lowercase-hex MD5 of the exact URL string.
    pub fn key_for(url: &str) -> String {
        let mut hasher = Md5::new();
        hasher.update(url.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// On-disk path of the entry for `key`.
    fn entry_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}{CACHE_EXT}"))
    }

    /// On-disk path of the epoch sentinel.
    fn sentinel_path(&self) -> PathBuf {
        self.root
            .join(format!("{}{CACHE_EXT}", Self::key_for(EPOCH_SENTINEL_SEED)))
    }

    /// Look up a fresh entry. Absent and stale entries are both a miss; the
    /// caller reacts identically (live fetch) either way.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        let mtime = std::fs::metadata(&path).ok()?.modified().ok()?;
        if !is_fresh(mtime, SystemTime::now(), self.ttl) {
            debug!(key, "cache entry stale");
            return None;
        }
        std::fs::read(&path).ok()
    }

    /// Store `body` as the entry for `key`, superseding any previous body.
    pub fn put(&self, key: &str, body: &[u8]) -> Result<()> {
        std::fs::create_dir_all(&self.root).with_context(|| {
            format!("failed to create cache directory: {}", self.root.display())
        })?;
        let path = self.entry_path(key);
        std::fs::write(&path, body)
            .with_context(|| format!("failed to write cache entry: {}", path.display()))?;
        debug!(key, bytes = body.len(), "cache entry written");
        Ok(())
    }

    /// Establish or roll the cache epoch.
    ///
    /// No sentinel: create the cache directory (if needed) and a fresh
    /// sentinel. Expired sentinel: delete the whole cache directory
    /// recursively, recreate it, and write a fresh sentinel. Returns `true`
    /// when a purge happened.
    pub fn maintain_epoch(&self) -> Result<bool> {
        let sentinel = self.sentinel_path();

        let purge = match std::fs::metadata(&sentinel) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .with_context(|| format!("failed to stat sentinel: {}", sentinel.display()))?;
                !is_fresh(mtime, SystemTime::now(), self.ttl)
            }
            Err(_) => false,
        };

        if purge {
            std::fs::remove_dir_all(&self.root).with_context(|| {
                format!("failed to purge cache directory: {}", self.root.display())
            })?;
            info!(root = %self.root.display(), "cache epoch expired, directory purged");
        }

        if purge || !sentinel.exists() {
            std::fs::create_dir_all(&self.root).with_context(|| {
                format!("failed to create cache directory: {}", self.root.display())
            })?;
            std::fs::write(&sentinel, b"")
                .with_context(|| format!("failed to write sentinel: {}", sentinel.display()))?;
            debug!(root = %self.root.display(), "cache epoch established");
        }

        Ok(purge)
    }

    /// Root directory of the cache (for health reporting).
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Freshness predicate: an entry modified at `mtime` is fresh at `now` iff
/// strictly less than `ttl` has elapsed. A clock that went backwards counts
/// as fresh (elapsed time of zero).
fn is_fresh(mtime: SystemTime, now: SystemTime, ttl: Duration) -> bool {
    match now.duration_since(mtime) {
        Ok(age) => age < ttl,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store(root: &Path, ttl_secs: u64) -> CacheStore {
        CacheStore::new(&CacheConfig {
            root: root.to_path_buf(),
            ttl_secs,
            epoch_check_interval_secs: 60,
        })
    }

    #[test]
    fn key_for_is_md5_hex() {
        // MD5("hello world")
        assert_eq!(
            CacheStore::key_for("hello world"),
            "5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
        assert_eq!(CacheStore::key_for("http://otherhost/x.json").len(), 32);
    }

    #[test]
    fn put_then_get_returns_body() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 3600);

        let key = CacheStore::key_for("http://otherhost/x.json");
        store.put(&key, br#"{"a":1}"#).unwrap();
        assert_eq!(store.get(&key).unwrap(), br#"{"a":1}"#);
    }

    #[test]
    fn get_misses_on_absent_entry() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 3600);
        assert!(store.get(&CacheStore::key_for("http://nowhere/")).is_none());
    }

    #[test]
    fn zero_ttl_makes_every_entry_stale() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 0);

        let key = CacheStore::key_for("http://otherhost/x.json");
        store.put(&key, b"body").unwrap();
        assert!(store.get(&key).is_none());
    }

    #[test]
    fn freshness_boundary_is_exclusive() {
        let ttl = Duration::from_secs(3600);
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000);

        assert!(is_fresh(mtime, mtime + Duration::from_secs(3599), ttl));
        assert!(!is_fresh(mtime, mtime + ttl, ttl));
        assert!(!is_fresh(mtime, mtime + Duration::from_secs(7200), ttl));
        // Clock went backwards: treat as fresh.
        assert!(is_fresh(mtime, mtime - Duration::from_secs(10), ttl));
    }

    #[test]
    fn maintain_epoch_creates_directory_and_sentinel() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("cache");
        let store = store(&root, 3600);

        let purged = store.maintain_epoch().unwrap();
        assert!(!purged);
        assert!(root.is_dir());
        assert!(store.sentinel_path().is_file());
    }

    #[test]
    fn maintain_epoch_is_stable_while_fresh() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 3600);

        store.maintain_epoch().unwrap();
        let key = CacheStore::key_for("http://otherhost/x.json");
        store.put(&key, b"body").unwrap();

        let purged = store.maintain_epoch().unwrap();
        assert!(!purged);
        assert_eq!(store.get(&key).unwrap(), b"body");
    }

    #[test]
    fn expired_epoch_purges_every_entry() {
        let dir = tempdir().unwrap();
        let store = store(dir.path(), 0);

        store.maintain_epoch().unwrap();
        let key = CacheStore::key_for("http://otherhost/x.json");
        store.put(&key, b"body").unwrap();

        // TTL of zero: the sentinel is already expired, so the purge is
        // directory-wide regardless of when individual entries were written.
        let purged = store.maintain_epoch().unwrap();
        assert!(purged);
        assert!(!store.entry_path(&key).exists());
        assert!(store.sentinel_path().is_file());
    }
}
