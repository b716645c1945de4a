//! Compiled-document cache.
//!
//! Entries are `<key>.pdf` files in one directory, where the key is the SHA-256 of
//! the template id, template source and content. Expiry is by age only.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
const ENTRY_EXT: &str = "pdf";

/// `sha256(id ␀ source ␀ content)` as lowercase hex.
pub fn cache_key(template_id: &str, template_source: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(template_source.as_bytes());
    hasher.update([0u8]);
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct DocumentCache {
    dir: PathBuf,
    ttl: Duration,
}

impl DocumentCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXT}"))
    }

    /// Cached bytes for `key` if present and younger than the TTL.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.get_at(key, SystemTime::now()).await
    }

    pub async fn get_at(&self, key: &str, now: SystemTime) -> Option<Vec<u8>> {
        let path = self.entry_path(key);
        let meta = tokio::fs::metadata(&path).await.ok()?;
        if !is_fresh(&meta, self.ttl, now) {
            debug!("Cache entry {key} expired");
            return None;
        }
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("Cache hit for {key}");
                Some(bytes)
            }
            Err(e) => {
                warn!("Could not read cache entry {}: {e}", path.display());
                None
            }
        }
    }

    /// Stores `bytes` under `key`. Failures are logged, never returned.
    pub async fn put(&self, key: &str, bytes: &[u8]) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!("Could not create cache directory {}: {e}", self.dir.display());
            return;
        }
        let path = self.entry_path(key);
        // Readers only ever see a complete entry: write aside, then rename over it.
        let staging = self
            .dir
            .join(format!("{key}.{ENTRY_EXT}.{}.tmp", Uuid::new_v4().simple()));
        let written = match tokio::fs::write(&staging, bytes).await {
            Ok(()) => tokio::fs::rename(&staging, &path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            warn!("Could not write cache entry {}: {e}", path.display());
            let _ = tokio::fs::remove_file(&staging).await;
        }
    }

    /// Removes every entry older than the TTL, returning how many went.
    pub async fn evict_expired(&self) -> usize {
        self.evict_expired_at(SystemTime::now()).await
    }

    pub async fn evict_expired_at(&self, now: SystemTime) -> usize {
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return 0;
        };
        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Cache directory scan stopped: {e}");
                    break;
                }
            };
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if is_fresh(&meta, self.ttl, now) {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not evict {}: {e}", path.display()),
            }
        }
        if removed > 0 {
            debug!("Evicted {removed} cached documents");
        }
        removed
    }
}

fn is_fresh(meta: &std::fs::Metadata, ttl: Duration, now: SystemTime) -> bool {
    meta.modified()
        .ok()
        .map(|modified| now.duration_since(modified).unwrap_or_default() < ttl)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_depends_on_every_input() {
        let base = cache_key("Default_Resume", "\\documentclass{article}", "hello");
        assert_eq!(base.len(), 64);
        assert_eq!(base, cache_key("Default_Resume", "\\documentclass{article}", "hello"));
        assert_ne!(base, cache_key("John_Miller_CV", "\\documentclass{article}", "hello"));
        assert_ne!(base, cache_key("Default_Resume", "\\documentclass{report}", "hello"));
        assert_ne!(base, cache_key("Default_Resume", "\\documentclass{article}", "bye"));
    }

    #[test]
    fn test_key_fields_do_not_run_together() {
        assert_ne!(cache_key("ab", "c", ""), cache_key("a", "bc", ""));
    }

    #[tokio::test]
    async fn test_put_then_get_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::new(dir.path().join("previews"), DEFAULT_TTL);
        assert!(cache.get("k").await.is_none());

        cache.put("k", b"%PDF").await;
        assert_eq!(cache.get("k").await.as_deref(), Some(&b"%PDF"[..]));
    }

    #[tokio::test]
    async fn test_expired_entry_is_a_miss_and_evicted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::new(dir.path(), DEFAULT_TTL);
        cache.put("old", b"%PDF").await;
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let later = SystemTime::now() + Duration::from_secs(2 * 60 * 60);
        assert!(cache.get_at("old", later).await.is_none());
        assert_eq!(cache.evict_expired_at(later).await, 1);
        assert!(!dir.path().join("old.pdf").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_evict_keeps_fresh_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DocumentCache::new(dir.path(), DEFAULT_TTL);
        cache.put("fresh", b"%PDF").await;
        assert_eq!(cache.evict_expired().await, 0);
        assert!(cache.get("fresh").await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_reads_never_see_partial_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = std::sync::Arc::new(DocumentCache::new(dir.path(), DEFAULT_TTL));
        let document = vec![b'x'; 4 * 1024 * 1024];
        cache.put("big", &document).await;

        let writer = {
            let cache = std::sync::Arc::clone(&cache);
            let document = document.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    cache.put("big", &document).await;
                }
            })
        };
        let reader = {
            let cache = std::sync::Arc::clone(&cache);
            tokio::spawn(async move {
                let mut lengths = Vec::new();
                for _ in 0..200 {
                    if let Some(bytes) = cache.get("big").await {
                        lengths.push(bytes.len());
                    }
                }
                lengths
            })
        };

        writer.await.unwrap();
        let lengths = reader.await.unwrap();
        assert!(!lengths.is_empty());
        assert!(lengths.iter().all(|&len| len == document.len()), "{lengths:?}");
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty() {
        let cache = DocumentCache::new("/no/such/cache/dir", DEFAULT_TTL);
        assert!(cache.get("k").await.is_none());
        assert_eq!(cache.evict_expired().await, 0);
    }
}
