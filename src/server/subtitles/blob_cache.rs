use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use lru::LruCache;
use nanoid::nanoid;
use tokio::sync::Mutex;

const MAX_TOTAL_BYTES: usize = 64 * 1024 * 1024;
const MAX_IDLE: std::time::Duration = std::time::Duration::from_secs(3600);
// generous cap on entry count so the cache doesn't grow unbounded on many tiny
// blobs before the byte budget kicks in
const MAX_ENTRIES: usize = 4096;

struct Entry {
    bytes: Vec<u8>,
    inserted_at: Instant,
}

/// `Arc<Mutex<lru::LruCache<..>>>` sized by total bytes, not entry count - a plain
/// mutex-guarded map rather than a full actor system. evicts LRU-first once
/// `MAX_TOTAL_BYTES` is exceeded, and lazily drops entries idle past `MAX_IDLE` on
/// each insert.
#[derive(Clone)]
pub struct BlobCache {
    inner: Arc<Mutex<Inner>>,
}

struct Inner {
    cache: LruCache<String, Entry>,
    total_bytes: usize,
}

impl BlobCache {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                cache: LruCache::new(NonZeroUsize::new(MAX_ENTRIES).unwrap()),
                total_bytes: 0,
            })),
        }
    }

    pub async fn insert(&self, bytes: Vec<u8>) -> String {
        let handle = nanoid!();
        self.put(handle.clone(), bytes).await;
        handle
    }

    /// inserts under a caller-chosen key rather than minting a random handle -
    /// used when the lookup key is already stable, e.g. a converted subtitle
    /// keyed by its source download URL.
    pub async fn put(&self, key: String, bytes: Vec<u8>) {
        let size = bytes.len();

        let mut inner = self.inner.lock().await;
        inner.evict_idle();

        inner.cache.put(
            key,
            Entry {
                bytes,
                inserted_at: Instant::now(),
            },
        );
        inner.total_bytes += size;
        inner.evict_over_budget();
    }

    pub async fn get(&self, handle: &str) -> Option<Vec<u8>> {
        let mut inner = self.inner.lock().await;
        inner.cache.get(handle).map(|entry| entry.bytes.clone())
    }
}

impl Default for BlobCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn evict_idle(&mut self) {
        let stale: Vec<String> = self
            .cache
            .iter()
            .filter(|(_, entry)| entry.inserted_at.elapsed() > MAX_IDLE)
            .map(|(key, _)| key.clone())
            .collect();

        for key in stale {
            if let Some(entry) = self.cache.pop(&key) {
                self.total_bytes = self.total_bytes.saturating_sub(entry.bytes.len());
            }
        }
    }

    fn evict_over_budget(&mut self) {
        while self.total_bytes > MAX_TOTAL_BYTES {
            match self.cache.pop_lru() {
                Some((_, entry)) => self.total_bytes = self.total_bytes.saturating_sub(entry.bytes.len()),
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_blob() {
        let cache = BlobCache::new();
        let handle = cache.insert(b"hello world".to_vec()).await;
        assert_eq!(cache.get(&handle).await, Some(b"hello world".to_vec()));
    }

    #[tokio::test]
    async fn evicts_lru_once_over_byte_budget() {
        let cache = BlobCache::new();
        let big = vec![0u8; MAX_TOTAL_BYTES - 1024];
        let first = cache.insert(big).await;

        let second_big = vec![1u8; 2048];
        cache.insert(second_big).await;

        assert!(cache.get(&first).await.is_none());
    }
}
