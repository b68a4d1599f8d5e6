// src/canonical/cache.rs
use log::info;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::canonical::resolver::CanonicalOutcome;

/// Per-worker memo of canonicalization results, keyed by the raw input URL.
pub struct CanonicalCache {
    entries: LruCache<String, CanonicalOutcome>,
    pub hits: usize,
    pub misses: usize,
}

pub type SharedCanonicalCache = Arc<Mutex<CanonicalCache>>;

impl CanonicalCache {
    pub fn new(capacity: usize) -> Self {
        info!("Initializing CanonicalCache with capacity: {}", capacity);
        Self {
            entries: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, url: &str) -> Option<CanonicalOutcome> {
        match self.entries.get(url) {
            Some(outcome) => {
                self.hits += 1;
                Some(outcome.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn put(&mut self, url: &str, outcome: CanonicalOutcome) {
        self.entries.put(url.to_string(), outcome);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub fn create_shared_cache(capacity: usize) -> SharedCanonicalCache {
    Arc::new(Mutex::new(CanonicalCache::new(capacity)))
}
