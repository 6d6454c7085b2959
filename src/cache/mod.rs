// Content-addressed, TTL-expiring review cache
//
// One JSON file per entry, named by the cache key. The cache is best-effort:
// write failures are logged and swallowed, and any entry that cannot be
// trusted (malformed, expired) is deleted on read.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::review::types::ReviewComment;

/// Embedded in every cache key; bump whenever the shape or semantics of the
/// cached payload changes, so stale entries miss instead of crashing.
pub const PIPELINE_VERSION: &str = "v3";

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    timestamp: DateTime<Utc>,
    cache_key: String,
    review: Vec<ReviewComment>,
}

pub struct CacheStore {
    dir: PathBuf,
    ttl_days: i64,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>, ttl_days: i64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;
        Ok(Self { dir, ttl_days })
    }

    /// Deterministic key over (filepath, diff, pipeline version). Identical
    /// inputs always hit; any differing input yields a different key.
    pub fn cache_key(filepath: &str, diff: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(filepath.as_bytes());
        hasher.update(b":");
        hasher.update(diff.as_bytes());
        hasher.update(b":");
        hasher.update(PIPELINE_VERSION.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Look up a cached review. Missing, malformed, and expired entries are
    /// all misses; the latter two are deleted as a side effect.
    pub fn get(&self, key: &str) -> Option<Vec<ReviewComment>> {
        let path = self.entry_path(key);
        let contents = fs::read_to_string(&path).ok()?;

        let entry: CacheEntry = match serde_json::from_str(&contents) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Invalid cache file {}: {}", path.display(), e);
                remove_entry(&path);
                return None;
            }
        };

        if self.is_expired(&entry.timestamp) {
            debug!("Cache expired for key {}...", &key[..8.min(key.len())]);
            remove_entry(&path);
            return None;
        }

        debug!("Cache hit for key {}...", &key[..8.min(key.len())]);
        Some(entry.review)
    }

    /// Persist a review result. Best-effort: failures are logged, never
    /// propagated. The entry is written to a temp file and renamed into
    /// place so concurrent readers never observe a partial write.
    pub fn set(&self, key: &str, review: &[ReviewComment]) {
        let entry = CacheEntry {
            timestamp: Utc::now(),
            cache_key: key.to_string(),
            review: review.to_vec(),
        };

        let json = match serde_json::to_string_pretty(&entry) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize cache entry: {}", e);
                return;
            }
        };

        let tmp_path = self.dir.join(format!(".{}.json.tmp", key));
        let final_path = self.entry_path(key);
        if let Err(e) =
            fs::write(&tmp_path, json).and_then(|_| fs::rename(&tmp_path, &final_path))
        {
            warn!("Failed to save cache entry {}: {}", final_path.display(), e);
        }
    }

    /// Delete every cache entry. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_files()? {
            remove_entry(&path);
            removed += 1;
        }
        Ok(removed)
    }

    /// Delete expired and unreadable entries. Returns the number removed.
    pub fn clear_expired(&self) -> usize {
        let mut removed = 0;
        let Ok(paths) = self.entry_files() else {
            return 0;
        };
        for path in paths {
            let expired = match fs::read_to_string(&path)
                .ok()
                .and_then(|c| serde_json::from_str::<CacheEntry>(&c).ok())
            {
                Some(entry) => self.is_expired(&entry.timestamp),
                None => true, // unreadable entries are dead weight
            };
            if expired {
                remove_entry(&path);
                removed += 1;
            }
        }
        if removed > 0 {
            debug!("Removed {} expired cache entries", removed);
        }
        removed
    }

    fn is_expired(&self, timestamp: &DateTime<Utc>) -> bool {
        Utc::now() - *timestamp > Duration::days(self.ttl_days)
    }

    fn entry_files(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read cache directory {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

fn remove_entry(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!("Failed to remove cache file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::types::Severity;

    fn sample_comments() -> Vec<ReviewComment> {
        vec![ReviewComment {
            filepath: "src/app.py".to_string(),
            line: 10,
            comment: "possible null dereference".to_string(),
            severity: Severity::Critical,
            linter_confirmed: None,
            linter_evidence: None,
            verified: None,
            verification_reasoning: None,
        }]
    }

    #[test]
    fn test_roundtrip_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), 7).unwrap();

        let key = CacheStore::cache_key("src/app.py", "diff text");
        cache.set(&key, &sample_comments());

        let cached = cache.get(&key).unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].filepath, "src/app.py");
        assert_eq!(cached[0].line, 10);
    }

    #[test]
    fn test_missing_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), 7).unwrap();
        assert!(cache.get("deadbeef").is_none());
    }

    #[test]
    fn test_malformed_entry_is_deleted_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), 7).unwrap();

        let path = dir.path().join("badkey.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(cache.get("badkey").is_none());
        assert!(!path.exists(), "self-healing cache must delete bad entries");
    }

    #[test]
    fn test_expired_entry_is_a_miss_and_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), 7).unwrap();

        let key = "expiredkey";
        let entry = CacheEntry {
            timestamp: Utc::now() - Duration::days(8),
            cache_key: key.to_string(),
            review: sample_comments(),
        };
        let path = dir.path().join(format!("{}.json", key));
        fs::write(&path, serde_json::to_string(&entry).unwrap()).unwrap();

        assert!(cache.get(key).is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_cache_key_determinism_and_sensitivity() {
        let a = CacheStore::cache_key("src/app.py", "diff");
        let b = CacheStore::cache_key("src/app.py", "diff");
        assert_eq!(a, b);

        assert_ne!(a, CacheStore::cache_key("src/other.py", "diff"));
        assert_ne!(a, CacheStore::cache_key("src/app.py", "diff2"));
    }

    #[test]
    fn test_clear_removes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), 7).unwrap();

        cache.set("k1", &sample_comments());
        cache.set("k2", &sample_comments());

        assert_eq!(cache.clear().unwrap(), 2);
        assert!(cache.get("k1").is_none());
    }

    #[test]
    fn test_clear_expired_counts_only_dead_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), 7).unwrap();

        cache.set("fresh", &sample_comments());

        let stale = CacheEntry {
            timestamp: Utc::now() - Duration::days(30),
            cache_key: "stale".to_string(),
            review: vec![],
        };
        fs::write(
            dir.path().join("stale.json"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();
        fs::write(dir.path().join("corrupt.json"), "garbage").unwrap();

        assert_eq!(cache.clear_expired(), 2);
        assert!(cache.get("fresh").is_some());
    }

    #[test]
    fn test_set_leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheStore::new(dir.path(), 7).unwrap();
        cache.set("k1", &sample_comments());

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
