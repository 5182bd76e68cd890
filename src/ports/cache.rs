//! Hot-state port for in-memory data access.
//!
//! Defines the contract for the fast, best-effort path (spec §3's
//! Hot-State Store): porter availability, last-known location, and the
//! per-key rate limiters used by the location-update and API surfaces.

use crate::types::entities::{AvailabilityState, LastLocation};
use crate::types::primitives::{GeoCoordinate, PorterId};

// ═══════════════════════════════════════════════════════════════════════════════
// HOT STATE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the hot-state store.
///
/// # Durability
///
/// Everything behind this trait is best-effort: a restart or eviction may
/// silently drop state. Callers that need durability use the corresponding
/// durable-store port instead (availability has none; location is also
/// snapshotted to [`crate::ports::LocationSnapshotStore`] on a cadence).
///
/// # Implementation Notes
///
/// Implementations should:
/// - Use TTL-based expiration for availability entries
///   (`availabilityStateTtlSeconds`)
/// - Keep `set_availability` atomic with respect to the online-porter index
///   used by [`Self::online_porter_ids`] — a write that updates the state
///   but not the index produces a porter that is "online" but absent from
///   `onlinePorterIds`, or vice versa
/// - Be thread-safe (this trait requires `Send + Sync`)
pub trait HotStateStore: Send + Sync {
    /// Get a porter's cached availability state.
    fn get_availability(&self, porter_id: PorterId) -> Option<AvailabilityState>;

    /// Set a porter's availability state and update the online-porter index
    /// used by [`Self::online_porter_ids`] in the same logical operation.
    fn set_availability(&self, state: &AvailabilityState);

    /// Remove a porter from the online-porter index (spec §4.1 `goOffline`).
    fn clear_availability(&self, porter_id: PorterId);

    /// Find porters whose last-known precise location is within
    /// `radius_meters` of `center` (spec §4.2 `findNearbyPorters`).
    ///
    /// Scans [`Self::get_last_location`]'s backing index, not
    /// [`Self::get_availability`]'s coarse location — the caller is
    /// responsible for intersecting with [`Self::online_porter_ids`] when
    /// `onlineOnly` is requested, and with the Durable Store for
    /// verification/suspension eligibility (spec §3 `PorterProfile`
    /// invariant). Implemented as a scan+filter (spec §9's resolution of
    /// the `findNearbyPorters` open question); the seam exists so a
    /// spatial-index-backed implementation can replace this without
    /// changing callers.
    fn porters_near(&self, center: GeoCoordinate, radius_meters: f64) -> Vec<(PorterId, GeoCoordinate)>;

    /// List the ids of every porter currently tracked as online.
    ///
    /// Backs spec §4.1's `onlinePorterIds`/`onlinePorterCount`.
    fn online_porter_ids(&self) -> Vec<PorterId>;

    /// Get a porter's last known precise location.
    fn get_last_location(&self, porter_id: PorterId) -> Option<LastLocation>;

    /// Set a porter's last known precise location.
    fn set_last_location(&self, location: &LastLocation);

    /// Check rate limit and record attempt.
    ///
    /// Returns `true` if the request is allowed (under limit).
    /// Returns `false` if rate limited.
    ///
    /// # Arguments
    ///
    /// * `key` - Rate limit key (e.g., `"location:{porter_id}"`, `"api:{user_id}"`)
    /// * `limit` - Maximum requests allowed
    /// * `window_secs` - Time window in seconds
    fn check_rate_limit(&self, key: &str, limit: u32, window_secs: u64) -> bool;

    /// Get remaining rate limit quota.
    ///
    /// Returns `None` if key hasn't been seen.
    fn get_rate_limit_remaining(&self, key: &str, limit: u32, window_secs: u64) -> Option<u32>;

    /// Clear all cached data. Use sparingly — intended for test teardown.
    fn clear_all(&self);

    /// Get hot-store statistics for monitoring.
    fn stats(&self) -> HotStoreStats;
}

/// Hot-store statistics for monitoring.
#[derive(Debug, Clone, Default)]
pub struct HotStoreStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of porters currently tracked as online.
    pub online_count: usize,
}

impl HotStoreStats {
    /// Calculate the cache hit rate as a percentage.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(
    clippy::expect_used,
    clippy::significant_drop_tightening,
    clippy::clone_on_copy
)]
pub mod mocks {
    //! Mock implementations for testing.

    use std::collections::HashMap;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicU64, Ordering};

    use super::{AvailabilityState, GeoCoordinate, HotStateStore, HotStoreStats, LastLocation, PorterId};

    /// Simple in-memory hot-state store for testing.
    #[derive(Debug, Default)]
    pub struct MockHotStateStore {
        availability: RwLock<HashMap<PorterId, AvailabilityState>>,
        locations: RwLock<HashMap<PorterId, LastLocation>>,
        rate_limits: RwLock<HashMap<String, (u32, u64)>>,
        hits: AtomicU64,
        misses: AtomicU64,
    }

    impl MockHotStateStore {
        /// Create a new mock hot-state store.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl HotStateStore for MockHotStateStore {
        fn get_availability(&self, porter_id: PorterId) -> Option<AvailabilityState> {
            let availability = self.availability.read().expect("lock poisoned");
            match availability.get(&porter_id) {
                Some(state) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Some(state.clone())
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    None
                }
            }
        }

        fn set_availability(&self, state: &AvailabilityState) {
            let mut availability = self.availability.write().expect("lock poisoned");
            availability.insert(state.porter_id, state.clone());
        }

        fn clear_availability(&self, porter_id: PorterId) {
            let mut availability = self.availability.write().expect("lock poisoned");
            availability.remove(&porter_id);
        }

        fn porters_near(&self, center: GeoCoordinate, radius_meters: f64) -> Vec<(PorterId, GeoCoordinate)> {
            let locations = self.locations.read().expect("lock poisoned");
            locations
                .values()
                .map(|location| (location.porter_id, location.coordinate))
                .filter(|(_, coord)| center.haversine_distance_meters(coord) <= radius_meters)
                .collect()
        }

        fn online_porter_ids(&self) -> Vec<PorterId> {
            let availability = self.availability.read().expect("lock poisoned");
            availability
                .values()
                .filter(|state| state.online)
                .map(|state| state.porter_id)
                .collect()
        }

        fn get_last_location(&self, porter_id: PorterId) -> Option<LastLocation> {
            let locations = self.locations.read().expect("lock poisoned");
            locations.get(&porter_id).cloned()
        }

        fn set_last_location(&self, location: &LastLocation) {
            let mut locations = self.locations.write().expect("lock poisoned");
            locations.insert(location.porter_id, location.clone());
        }

        fn check_rate_limit(&self, key: &str, limit: u32, window_secs: u64) -> bool {
            let mut limits = self.rate_limits.write().expect("lock poisoned");
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time went backwards")
                .as_secs();

            let (count, window_start) = limits.entry(key.to_string()).or_insert((0, now));

            if now - *window_start >= window_secs {
                *count = 0;
                *window_start = now;
            }

            if *count < limit {
                *count += 1;
                true
            } else {
                false
            }
        }

        fn get_rate_limit_remaining(&self, key: &str, limit: u32, window_secs: u64) -> Option<u32> {
            let limits = self.rate_limits.read().expect("lock poisoned");
            let now = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time went backwards")
                .as_secs();

            limits.get(key).map(|(count, window_start)| {
                if now - *window_start >= window_secs {
                    limit
                } else {
                    limit.saturating_sub(*count)
                }
            })
        }

        fn clear_all(&self) {
            self.availability.write().expect("lock poisoned").clear();
            self.locations.write().expect("lock poisoned").clear();
            self.rate_limits.write().expect("lock poisoned").clear();
        }

        fn stats(&self) -> HotStoreStats {
            HotStoreStats {
                hits: self.hits.load(Ordering::Relaxed),
                misses: self.misses.load(Ordering::Relaxed),
                online_count: self
                    .availability
                    .read()
                    .expect("lock poisoned")
                    .values()
                    .filter(|s| s.online)
                    .count(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mocks::MockHotStateStore;
    use super::*;

    #[test]
    fn hot_store_stats_hit_rate() {
        let stats = HotStoreStats { hits: 80, misses: 20, online_count: 10 };
        assert!((stats.hit_rate() - 80.0).abs() < f64::EPSILON);
    }

    #[test]
    fn hot_store_stats_hit_rate_zero() {
        let stats = HotStoreStats::default();
        assert!((stats.hit_rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn mock_hot_store_rate_limit() {
        let store = MockHotStateStore::new();

        assert!(store.check_rate_limit("test", 3, 60));
        assert!(store.check_rate_limit("test", 3, 60));
        assert!(store.check_rate_limit("test", 3, 60));
        assert!(!store.check_rate_limit("test", 3, 60));
    }
}
