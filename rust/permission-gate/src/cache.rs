//! In-memory cache of remote permission decisions.
//!
//! Entries are keyed by `resource:action` and stay valid until their age
//! exceeds the TTL; an entry exactly `ttl` old is still fresh.
//! Capacity is bounded with LRU eviction so a long-running session can't
//! grow it without limit.

use log::debug;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// Default freshness window for a cached decision (5 minutes).
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of cached decisions.
pub const DEFAULT_CAPACITY: usize = 1024;

/// A cached remote decision.
#[derive(Debug, Clone, Copy)]
struct CachedDecision {
    allowed: bool,
    cached_at: Instant,
}

/// TTL cache for `resource:action` decisions.
pub struct PermissionCache {
    entries: LruCache<String, CachedDecision>,
    ttl: Duration,
    hits: u64,
    misses: u64,
}

impl PermissionCache {
    /// Create a cache. A zero capacity is bumped to one.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            ttl,
            hits: 0,
            misses: 0,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a fresh decision.
    pub fn get(&mut self, key: &str) -> Option<bool> {
        self.get_at(key, Instant::now())
    }

    /// Look up a fresh decision as of `now`. Stale entries are dropped.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<bool> {
        let ttl = self.ttl;
        match self.entries.get(key).copied() {
            Some(entry) if now.saturating_duration_since(entry.cached_at) <= ttl => {
                self.hits += 1;
                debug!("Permission cache hit for {}", key);
                Some(entry.allowed)
            }
            Some(_) => {
                self.entries.pop(key);
                self.misses += 1;
                debug!("Permission cache entry for {} expired", key);
                None
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a decision, replacing any previous one for the key.
    pub fn insert(&mut self, key: &str, allowed: bool) {
        self.insert_at(key, allowed, Instant::now());
    }

    pub fn insert_at(&mut self, key: &str, allowed: bool, now: Instant) {
        self.entries.put(
            key.to_string(),
            CachedDecision {
                allowed,
                cached_at: now,
            },
        );
    }

    /// Drop a single key. Returns whether it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.pop(key).is_some()
    }

    /// Drop every entry regardless of freshness.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop every stale entry. Returns the number removed.
    pub fn prune_expired(&mut self) -> usize {
        self.prune_expired_at(Instant::now())
    }

    pub fn prune_expired_at(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let stale: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.cached_at) > ttl)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &stale {
            self.entries.pop(key);
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        };

        CacheStats {
            entries: self.entries.len(),
            capacity: self.entries.cap().get(),
            hits: self.hits,
            misses: self.misses,
            hit_rate,
        }
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}
