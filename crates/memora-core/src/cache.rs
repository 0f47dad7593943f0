//! Bounded, thread-safe embedding cache with strict FIFO eviction.
//!
//! Holds derived vectors only, never image bytes. One instance is shared by
//! every matcher worker for the lifetime of the process. Lookups never
//! refresh an entry: eviction order is insertion order.
//!
//! Computation happens outside the lock, so two workers missing on the same
//! key may both compute; the later insert overwrites the earlier one. The
//! engine is deterministic, so both values are equal.

use crate::types::Embedding;
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 128;

/// Stable cache key: hex SHA-256 of either a URL or downloaded content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key by reference-photo URL. A photo replaced at the same URL keeps
    /// serving the old embedding until evicted.
    pub fn for_url(url: &str) -> Self {
        Self::digest(b"url:", url.as_bytes())
    }

    /// Key by photo content, immune to replaced photos but requires the download.
    pub fn for_content(bytes: &[u8]) -> Self {
        Self::digest(b"content:", bytes)
    }

    fn digest(domain: &[u8], data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        hasher.update(data);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// How reference-photo embeddings are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheKeying {
    #[default]
    Url,
    Content,
}

impl std::str::FromStr for CacheKeying {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "url" => Ok(Self::Url),
            "content" => Ok(Self::Content),
            other => Err(format!("unknown cache keying '{other}' (expected url or content)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Embedding>,
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

pub struct EmbeddingCache {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.inner.lock().entries.contains_key(key)
    }

    /// Look up an embedding. Counts a hit or a miss; does not affect eviction order.
    pub fn get(&self, key: &CacheKey) -> Option<Embedding> {
        let mut inner = self.inner.lock();
        match inner.entries.get(key).cloned() {
            Some(embedding) => {
                inner.hits += 1;
                Some(embedding)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store an embedding, evicting the oldest insertions beyond capacity.
    ///
    /// Overwriting an existing key keeps its original queue position.
    pub fn insert(&self, key: CacheKey, embedding: Embedding) {
        if self.capacity == 0 {
            return;
        }

        let mut inner = self.inner.lock();
        if inner.entries.insert(key.clone(), embedding).is_none() {
            inner.order.push_back(key);
        }

        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            inner.evictions += 1;
            tracing::trace!(key = oldest.as_str(), "evicted embedding");
        }
    }

    /// Return the cached embedding, or run `compute` and cache a `Some` result.
    pub fn get_or_compute<F>(&self, key: &CacheKey, compute: F) -> Option<Embedding>
    where
        F: FnOnce() -> Option<Embedding>,
    {
        if let Some(hit) = self.get(key) {
            return Some(hit);
        }

        let embedding = compute()?;
        self.insert(key.clone(), embedding.clone());
        Some(embedding)
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            size: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
        }
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn emb(v: f32) -> Embedding {
        Embedding::new(vec![v, 1.0])
    }

    fn key(i: usize) -> CacheKey {
        CacheKey::for_url(&format!("https://photos.example/{i}.jpg"))
    }

    #[test]
    fn test_fifo_evicts_exactly_first_inserted() {
        let n = 5;
        let cache = EmbeddingCache::new(n);
        for i in 0..=n {
            cache.insert(key(i), emb(i as f32));
        }
        assert_eq!(cache.len(), n);
        assert!(!cache.contains(&key(0)));
        for i in 1..=n {
            assert!(cache.contains(&key(i)), "key {i} should survive");
        }
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_access_does_not_refresh_order() {
        let cache = EmbeddingCache::new(2);
        cache.insert(key(0), emb(0.0));
        cache.insert(key(1), emb(1.0));
        // An LRU cache would now keep key 0.
        assert!(cache.get(&key(0)).is_some());
        cache.insert(key(2), emb(2.0));
        assert!(!cache.contains(&key(0)));
        assert!(cache.contains(&key(1)));
        assert!(cache.contains(&key(2)));
    }

    #[test]
    fn test_overwrite_keeps_position() {
        let cache = EmbeddingCache::new(2);
        cache.insert(key(0), emb(0.0));
        cache.insert(key(1), emb(1.0));
        cache.insert(key(0), emb(9.0));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key(0)), Some(emb(9.0)));

        cache.insert(key(2), emb(2.0));
        assert!(!cache.contains(&key(0)));
        assert!(cache.contains(&key(1)));
    }

    #[test]
    fn test_get_or_compute_hit_skips_compute() {
        let cache = EmbeddingCache::new(4);
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(emb(0.5))
        };

        assert_eq!(cache.get_or_compute(&key(1), compute), Some(emb(0.5)));
        assert_eq!(
            cache.get_or_compute(&key(1), || {
                calls.fetch_add(1, Ordering::SeqCst);
                Some(emb(0.7))
            }),
            Some(emb(0.5))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_get_or_compute_none_not_stored() {
        let cache = EmbeddingCache::new(4);
        assert_eq!(cache.get_or_compute(&key(1), || None), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let cache = EmbeddingCache::new(0);
        assert_eq!(cache.get_or_compute(&key(1), || Some(emb(1.0))), Some(emb(1.0)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_keys_stable_and_domain_separated() {
        let url = "https://photos.example/a.jpg";
        assert_eq!(CacheKey::for_url(url), CacheKey::for_url(url));
        assert_ne!(CacheKey::for_url(url), CacheKey::for_url("https://photos.example/b.jpg"));
        assert_ne!(CacheKey::for_url(url), CacheKey::for_content(url.as_bytes()));
        assert_eq!(CacheKey::for_url(url).as_str().len(), 64);
    }

    #[test]
    fn test_cache_keying_parse() {
        assert_eq!("url".parse::<CacheKeying>(), Ok(CacheKeying::Url));
        assert_eq!("Content".parse::<CacheKeying>(), Ok(CacheKeying::Content));
        assert!("md5".parse::<CacheKeying>().is_err());
    }

    #[test]
    fn test_concurrent_inserts_respect_bound() {
        let cache = Arc::new(EmbeddingCache::new(16));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        // Threads overlap on keys to exercise duplicate computes.
                        let k = key((t * 50 + i) % 200);
                        cache.get_or_compute(&k, || Some(emb(i as f32)));
                        assert!(cache.len() <= 16);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cache.len(), 16);
    }
}
