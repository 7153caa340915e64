use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::cache::{SWEEP_INTERVAL, expiry, is_live};

/// Process-wide bookkeeping for cache stampede prevention and invalidation.
///
/// Owns the set of keys currently being computed and, per repository, the
/// secondary-tier keys that were written, each with the deadline of its cache
/// entry. Losing an entry only costs a redundant write or a missed invalidation.
#[derive(Default)]
pub struct CacheCoordinator {
    in_flight: DashMap<String, ()>,
    active_keys: Mutex<HashMap<i64, HashMap<String, Option<Instant>>>>,
    registrations: AtomicUsize,
}

/// Exclusive right to compute one key. Released on drop.
pub struct ComputeGuard {
    coordinator: Arc<CacheCoordinator>,
    key: String,
}

impl Drop for ComputeGuard {
    fn drop(&mut self) {
        self.coordinator.in_flight.remove(&self.key);
    }
}

impl CacheCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers the caller as the sole computer of `key`, or returns `None`
    /// if someone else already is.
    pub fn try_acquire(self: &Arc<Self>, key: &str) -> Option<ComputeGuard> {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(ComputeGuard {
                    coordinator: Arc::clone(self),
                    key: key.to_string(),
                })
            }
        }
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.in_flight.contains_key(key)
    }

    /// Remembers that `key` holds data derived from `repo_id` until `ttl` runs out.
    ///
    /// Registrations whose entry has expired are pruned, for this repository
    /// on every call and for all repositories every [`SWEEP_INTERVAL`] calls.
    pub fn register(&self, repo_id: i64, key: &str, ttl: Duration) {
        let now = Instant::now();
        let sweep = (self.registrations.fetch_add(1, Ordering::Relaxed) + 1) % SWEEP_INTERVAL == 0;

        let mut active = self.active_keys.lock().unwrap_or_else(|e| e.into_inner());
        let keys = active.entry(repo_id).or_default();
        keys.retain(|_, expires_at| is_live(*expires_at, now));
        keys.insert(key.to_string(), expiry(ttl));

        if sweep {
            active.retain(|_, keys| {
                keys.retain(|_, expires_at| is_live(*expires_at, now));
                !keys.is_empty()
            });
        }
    }

    /// Removes and returns every key registered for `repo_id`.
    pub fn take_keys(&self, repo_id: i64) -> Vec<String> {
        let mut active = self.active_keys.lock().unwrap_or_else(|e| e.into_inner());
        active
            .remove(&repo_id)
            .map(|keys| keys.into_keys().collect())
            .unwrap_or_default()
    }

    pub fn registered_keys(&self, repo_id: i64) -> usize {
        let active = self.active_keys.lock().unwrap_or_else(|e| e.into_inner());
        active.get(&repo_id).map_or(0, HashMap::len)
    }

    /// Number of repositories with at least one registered key.
    pub fn tracked_repos(&self) -> usize {
        let active = self.active_keys.lock().unwrap_or_else(|e| e.into_inner());
        active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_holder_per_key() {
        let coordinator = CacheCoordinator::new();
        let guard = coordinator.try_acquire("a").unwrap();
        assert!(coordinator.try_acquire("a").is_none());
        assert!(coordinator.try_acquire("b").is_some());
        assert!(coordinator.is_in_flight("a"));

        drop(guard);
        assert!(!coordinator.is_in_flight("a"));
        assert!(coordinator.try_acquire("a").is_some());
    }

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_take_keys_is_per_repo() {
        let coordinator = CacheCoordinator::new();
        coordinator.register(1, "x", TTL);
        coordinator.register(1, "y", TTL);
        coordinator.register(1, "x", TTL);
        coordinator.register(2, "z", TTL);

        let mut keys = coordinator.take_keys(1);
        keys.sort();
        assert_eq!(keys, vec!["x", "y"]);
        assert!(coordinator.take_keys(1).is_empty());
        assert_eq!(coordinator.registered_keys(2), 1);
    }

    #[test]
    fn test_expired_registrations_are_pruned() {
        let coordinator = CacheCoordinator::new();
        coordinator.register(1, "live", TTL);
        coordinator.register(1, "stale", Duration::ZERO);
        coordinator.register(1, "other", TTL);
        assert_eq!(coordinator.registered_keys(1), 2);

        // Repositories that are never invalidated still get dropped.
        for repo_id in 100..100 + SWEEP_INTERVAL as i64 {
            coordinator.register(repo_id, "k", Duration::ZERO);
        }
        assert!(coordinator.tracked_repos() < SWEEP_INTERVAL);
        assert_eq!(coordinator.registered_keys(1), 2);
    }

    #[test]
    fn test_instances_are_isolated() {
        let a = CacheCoordinator::new();
        let b = CacheCoordinator::new();
        let _guard = a.try_acquire("k").unwrap();
        assert!(b.try_acquire("k").is_some());
    }
}
