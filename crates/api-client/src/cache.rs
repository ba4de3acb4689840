//! Short-lived memoization of GET responses.
//!
//! Entries are keyed by a canonical encoding of endpoint + query parameters
//! and expire after a configurable TTL. Expired entries are evicted lazily on
//! lookup; there is no background sweeper. Any successful mutating call drops
//! the whole cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use crate::time::{Clock, delta_from_std};

/// Deterministic cache key for an endpoint and its query parameters.
///
/// Parameter names are sorted before encoding so map iteration order cannot
/// produce distinct keys for the same logical request.
pub(crate) fn cache_key(endpoint: &str, params: &[(&str, &str)]) -> String {
    if params.is_empty() {
        return endpoint.to_owned();
    }

    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));

    let query = sorted
        .iter()
        .map(|(name, value)| {
            format!("{}={}", urlencoding::encode(name), urlencoding::encode(value))
        })
        .collect::<Vec<_>>()
        .join("&");

    format!("{endpoint}?{query}")
}

#[derive(Debug, Clone)]
struct CacheEntry {
    body: Value,
    stored_at: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: TimeDelta,
    clock: Arc<dyn Clock>,
}

impl ResponseCache {
    pub(crate) fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: delta_from_std(ttl),
            clock,
        }
    }

    /// Entries at or past the TTL are treated as misses and removed.
    pub(crate) fn lookup(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock();
        let entry = entries.get(key)?;

        let age = self.clock.now().signed_duration_since(entry.stored_at);
        if age >= self.ttl {
            debug!(key, "evicting expired cache entry");
            entries.remove(key);
            return None;
        }

        Some(entry.body.clone())
    }

    pub(crate) fn store(&self, key: String, body: Value) {
        let entry = CacheEntry {
            body,
            stored_at: self.clock.now(),
        };
        self.entries.lock().insert(key, entry);
    }

    pub(crate) fn invalidate_all(&self) {
        let mut entries = self.entries.lock();
        if !entries.is_empty() {
            debug!(count = entries.len(), "invalidating response cache");
        }
        entries.clear();
    }
}
