//! Gate configuration.

use crate::cache::{DEFAULT_CAPACITY, DEFAULT_TTL};
use std::time::Duration;

/// Settings for the HTTP client and the decision cache.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// API base URL, without the `/api/...` suffix.
    pub base_url: String,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            cache_ttl: DEFAULT_TTL,
            cache_capacity: DEFAULT_CAPACITY,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl GateConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `PERMGATE_URL`, `PERMGATE_CACHE_TTL_SECS` and
    /// `PERMGATE_CACHE_CAPACITY`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = match lookup("PERMGATE_URL") {
            Some(url) => Self::new(&url),
            None => Self::default(),
        };
        if let Some(secs) = lookup("PERMGATE_CACHE_TTL_SECS").and_then(|v| v.parse().ok()) {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = lookup("PERMGATE_CACHE_CAPACITY").and_then(|v| v.parse().ok()) {
            config.cache_capacity = capacity;
        }
        config
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}
