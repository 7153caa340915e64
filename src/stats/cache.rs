use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Key/value cache backend with per-entry expiry.
pub trait CacheStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
}

pub fn get_json<T: DeserializeOwned>(cache: &dyn CacheStore, key: &str) -> Result<Option<T>> {
    match cache.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn put_json<T: Serialize>(
    cache: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<()> {
    cache.put(key, serde_json::to_string(value)?, ttl)
}

/// Puts between two sweeps of expired entries.
pub const SWEEP_INTERVAL: usize = 256;

/// Deadline for an entry written now; `None` when `ttl` is too large to represent.
pub(crate) fn expiry(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

pub(crate) fn is_live(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.is_none_or(|deadline| deadline > now)
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// In-process cache backend.
///
/// Expired entries are dropped when read, and every [`SWEEP_INTERVAL`] puts
/// the whole map is swept so keys that are never read again do not pile up.
#[derive(Default)]
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    puts: AtomicUsize,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| is_live(entry.expires_at, Instant::now()))
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.entries.retain(|_, entry| is_live(entry.expires_at, now));
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if is_live(entry.expires_at, now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries
            .remove_if(key, |_, entry| !is_live(entry.expires_at, now));
        Ok(None)
    }

    fn put(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: expiry(ttl),
            },
        );

        let puts = self.puts.fetch_add(1, Ordering::Relaxed) + 1;
        if puts % SWEEP_INTERVAL == 0 {
            self.purge_expired();
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}
