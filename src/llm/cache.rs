//! Reply memoization for repeated generation calls.
//!
//! Judge calls for an identical (model, family, task, prompt) tuple are
//! memoized in a bounded least-recently-used cache. The cache is an arena of
//! nodes linked by index into a recency list, with a map from key to slot,
//! so lookups, promotions and evictions never scan.
//!
//! # Usage
//!
//! ```ignore
//! use grade_forge::llm::{CachedGenerator, CommandGenerator};
//!
//! let judge = CachedGenerator::new(CommandGenerator::new("judge-cli"), 256);
//! let reply = judge.generate(&request).await?;
//! println!("hit rate: {:.2}", judge.stats().hit_rate());
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{GenerationRequest, Generator};
use crate::error::GenerationError;

/// Hex-encoded SHA-256 of cached content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash(String);

impl ContentHash {
    /// Hashes every field of a request. Fields are length-prefixed so that
    /// moving text between adjacent fields changes the key.
    pub fn from_request(request: &GenerationRequest) -> Self {
        let mut hasher = Sha256::new();
        for field in [
            &request.model,
            &request.task_family,
            &request.task_id,
            &request.prompt,
        ] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Bounded map evicting the least recently used entry.
///
/// `head` is the most recently used slot, `tail` the eviction candidate.
/// A capacity of zero disables storage entirely.
#[derive(Debug)]
pub struct LruCache<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    nodes: Vec<Node<K, V>>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Returns the value for `key` and marks it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let slot = *self.index.get(key)?;
        self.detach(slot);
        self.push_front(slot);
        Some(&self.nodes[slot].value)
    }

    /// Inserts or replaces `key`, evicting the least recently used entry
    /// when full. Returns the evicted key, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<K> {
        if self.capacity == 0 {
            return None;
        }

        if let Some(&slot) = self.index.get(&key) {
            self.nodes[slot].value = value;
            self.detach(slot);
            self.push_front(slot);
            return None;
        }

        if self.nodes.len() < self.capacity {
            let slot = self.nodes.len();
            self.nodes.push(Node {
                key: key.clone(),
                value,
                prev: None,
                next: None,
            });
            self.index.insert(key, slot);
            self.push_front(slot);
            return None;
        }

        // Full: reuse the tail slot in place.
        let slot = self.tail?;
        self.detach(slot);
        let evicted = std::mem::replace(&mut self.nodes[slot].key, key.clone());
        self.nodes[slot].value = value;
        self.index.remove(&evicted);
        self.index.insert(key, slot);
        self.push_front(slot);
        Some(evicted)
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[slot].prev = None;
        self.nodes[slot].next = None;
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].prev = None;
        self.nodes[slot].next = self.head;
        if let Some(h) = self.head {
            self.nodes[h].prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Hit rate in `[0.0, 1.0]`, or 0.0 before any access.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheState {
    entries: LruCache<ContentHash, String>,
    stats: CacheStats,
}

/// Generator wrapper that memoizes successful replies.
///
/// Errors are never cached, so a transient failure is retried on the next call.
pub struct CachedGenerator<G> {
    inner: G,
    state: Mutex<CacheState>,
}

impl<G: Generator> CachedGenerator<G> {
    pub fn new(inner: G, capacity: usize) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().expect("cache lock poisoned").stats.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl<G: Generator> Generator for CachedGenerator<G> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let key = ContentHash::from_request(request);

        {
            let mut state = self.state.lock().expect("cache lock poisoned");
            let cached = state.entries.get(&key).cloned();
            match cached {
                Some(reply) => {
                    state.stats.hits += 1;
                    debug!(key = %key, "Reply cache hit");
                    return Ok(reply);
                }
                None => state.stats.misses += 1,
            }
        }

        let reply = self.inner.generate(request).await?;

        let mut state = self.state.lock().expect("cache lock poisoned");
        if state.entries.put(key, reply.clone()).is_some() {
            state.stats.evictions += 1;
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_content_hash_is_stable() {
        let request = GenerationRequest::new("hello", "m", "md", "t");
        let a = ContentHash::from_request(&request);
        assert_eq!(a, ContentHash::from_request(&request.clone()));
        let changed = GenerationRequest::new("hello!", "m", "md", "t");
        assert_ne!(a, ContentHash::from_request(&changed));
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_request_hash_separates_fields() {
        let a = GenerationRequest::new("ab", "m", "md", "t");
        let b = GenerationRequest::new("b", "m", "md", "ta");
        assert_ne!(ContentHash::from_request(&a), ContentHash::from_request(&b));
    }

    #[test]
    fn test_lru_evicts_least_recent() {
        let mut cache = LruCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        assert_eq!(cache.get(&"a"), Some(&1));

        assert_eq!(cache.put("c", 3), Some("b"));
        assert!(!cache.contains(&"b"));
        assert_eq!(cache.get(&"a"), Some(&1));
        assert_eq!(cache.get(&"c"), Some(&3));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_lru_update_refreshes_recency() {
        let mut cache = LruCache::new(2);
        cache.put("a", 1);
        cache.put("b", 2);
        cache.put("a", 10);

        assert_eq!(cache.put("c", 3), Some("b"));
        assert_eq!(cache.get(&"a"), Some(&10));
    }

    #[test]
    fn test_lru_single_slot_and_zero_capacity() {
        let mut one = LruCache::new(1);
        one.put(1, "x");
        assert_eq!(one.put(2, "y"), Some(1));
        assert_eq!(one.get(&2), Some(&"y"));
        assert_eq!(one.len(), 1);

        let mut zero = LruCache::new(0);
        assert_eq!(zero.put(1, "x"), None);
        assert!(zero.is_empty());
        assert_eq!(zero.get(&1), None);
    }

    #[test]
    fn test_lru_long_churn_keeps_bound() {
        let mut cache = LruCache::new(3);
        for i in 0..100 {
            cache.put(i, i * 2);
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get(&99), Some(&198));
        assert_eq!(cache.get(&97), Some(&194));
        assert_eq!(cache.get(&96), None);
    }

    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Generator for CountingGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if request.prompt == "fail" {
                return Err(GenerationError::Timeout { seconds: 1 });
            }
            Ok(format!("reply {}", n))
        }
    }

    #[tokio::test]
    async fn test_cached_generator_memoizes_successes() {
        let cached = CachedGenerator::new(
            CountingGenerator {
                calls: AtomicUsize::new(0),
            },
            4,
        );
        let request = GenerationRequest::new("prompt", "arbiter", "arbiter", "md");

        assert_eq!(cached.generate(&request).await.unwrap(), "reply 0");
        assert_eq!(cached.generate(&request).await.unwrap(), "reply 0");
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 1, evictions: 0 });

        let failing = GenerationRequest::new("fail", "arbiter", "arbiter", "md");
        assert!(cached.generate(&failing).await.is_err());
        assert!(cached.generate(&failing).await.is_err());
        assert_eq!(cached.len(), 1);
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 3);
    }
}
