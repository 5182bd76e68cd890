//! In-memory hot-state store implementation using moka and dashmap.
//!
//! Provides the fast, best-effort path described by spec §3's Hot-State
//! Store: porter availability, last-known precise location, and per-key
//! rate limiting — all without a database round-trip.
//!
//! # TTL Strategy
//!
//! | Cache | TTL | Rationale |
//! |-------|-----|-----------|
//! | Availability | `availabilityStateTtlSeconds` (default 1h) | Matches spec P5's online-membership deadline |
//! | Last location | `availabilityStateTtlSeconds` | Precise location is only useful while the porter is plausibly online |
//!
//! # Rate Limiting
//!
//! Uses dashmap for high-concurrency sliding-window rate limiting:
//! - Key format: `{identifier}:{window_start}`
//! - Automatic cleanup of expired windows via [`MemoryHotStore::cleanup_rate_limits`]
//!
//! # Usage
//!
//! ```ignore
//! use porter_dispatch_core::store::MemoryHotStore;
//! use porter_dispatch_core::ports::HotStateStore;
//!
//! let store = MemoryHotStore::new(10_000, 10_000, Duration::from_secs(3600));
//!
//! if store.check_rate_limit("location:porter-1", 10, 1) {
//!     // process location update
//! } else {
//!     // 429
//! }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use moka::sync::Cache as MokaCache;
use tracing::debug;

use crate::ports::{HotStateStore, HotStoreStats};
use crate::types::entities::{AvailabilityState, LastLocation};
use crate::types::primitives::{GeoCoordinate, PorterId};

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY HOT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// High-performance in-memory hot-state store using moka and dashmap.
///
/// Implements the [`HotStateStore`] port with:
/// - TTL-based expiration on both the availability and location caches
/// - Thread-safe concurrent access
/// - Hit/miss statistics for monitoring
///
/// # Thread Safety
///
/// All operations are thread-safe. The store can be shared across tasks via
/// `Arc<MemoryHotStore>`.
#[derive(Debug)]
pub struct MemoryHotStore {
    /// Availability state by porter id. This cache IS the online-porter
    /// index: [`Self::online_porter_ids`] filters it directly, so
    /// `set_availability` and `clear_availability` never need a second
    /// write to stay in sync.
    availability: MokaCache<PorterId, AvailabilityState>,

    /// Last known precise location by porter id.
    locations: MokaCache<PorterId, LastLocation>,

    /// Rate limiter: `{key}:{window_start}` -> (window_start, count).
    rate_limits: Arc<DashMap<String, (u64, u32)>>,

    /// Cache hit counter.
    hits: AtomicU64,

    /// Cache miss counter.
    misses: AtomicU64,
}

impl MemoryHotStore {
    /// Create a new hot store with the given capacities and TTL.
    #[must_use]
    pub fn new(availability_max_capacity: u64, location_max_capacity: u64, ttl: Duration) -> Self {
        Self {
            availability: MokaCache::builder()
                .max_capacity(availability_max_capacity)
                .time_to_live(ttl)
                .build(),
            locations: MokaCache::builder()
                .max_capacity(location_max_capacity)
                .time_to_live(ttl)
                .build(),
            rate_limits: Arc::new(DashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Clean up stale rate-limit windows.
    ///
    /// Should be called periodically to bound memory growth. Returns the
    /// number of entries removed.
    pub fn cleanup_rate_limits(&self, max_age_secs: u64) -> usize {
        let now = current_timestamp();
        let cutoff = now.saturating_sub(max_age_secs);

        let before = self.rate_limits.len();
        self.rate_limits.retain(|_, (window_start, _)| *window_start > cutoff);
        let after = self.rate_limits.len();

        let removed = before.saturating_sub(after);
        if removed > 0 {
            debug!(removed, "cleaned up rate limit entries");
        }
        removed
    }

    /// Run pending cache maintenance tasks.
    ///
    /// Moka performs maintenance lazily; this forces it to run immediately.
    /// Useful for tests or before taking memory measurements.
    pub fn run_pending_tasks(&self) {
        self.availability.run_pending_tasks();
        self.locations.run_pending_tasks();
    }
}

impl Default for MemoryHotStore {
    fn default() -> Self {
        Self::new(200_000, 200_000, Duration::from_secs(3600))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HOT STATE STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

impl HotStateStore for MemoryHotStore {
    fn get_availability(&self, porter_id: PorterId) -> Option<AvailabilityState> {
        let result = self.availability.get(&porter_id);
        if result.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn set_availability(&self, state: &AvailabilityState) {
        self.availability.insert(state.porter_id, state.clone());
        debug!(porter_id = %state.porter_id, online = state.online, "cached availability");
    }

    fn clear_availability(&self, porter_id: PorterId) {
        self.availability.invalidate(&porter_id);
        debug!(%porter_id, "cleared availability");
    }

    fn porters_near(&self, center: GeoCoordinate, radius_meters: f64) -> Vec<(PorterId, GeoCoordinate)> {
        // Moka doesn't support a spatial index, so we scan+filter the
        // bounded last-known-location cache directly (spec §9's resolution
        // of `findNearbyPorters`). Acceptable because the set of tracked
        // locations is small relative to total porters. Online-only
        // filtering and verification eligibility are applied by the caller
        // (`LocationService::find_nearby_porters`), not here.
        self.locations
            .iter()
            .map(|(id, location)| (*id, location.coordinate))
            .filter(|(_, coord)| center.haversine_distance_meters(coord) <= radius_meters)
            .collect()
    }

    fn online_porter_ids(&self) -> Vec<PorterId> {
        self.availability
            .iter()
            .filter(|(_, state)| state.online)
            .map(|(id, _)| *id)
            .collect()
    }

    fn get_last_location(&self, porter_id: PorterId) -> Option<LastLocation> {
        self.locations.get(&porter_id)
    }

    fn set_last_location(&self, location: &LastLocation) {
        self.locations.insert(location.porter_id, location.clone());
    }

    fn check_rate_limit(&self, key: &str, limit: u32, window_secs: u64) -> bool {
        let now = current_timestamp();
        let window_start = now - (now % window_secs.max(1));
        let cache_key = format!("{key}:{window_start}");

        let mut entry = self.rate_limits.entry(cache_key).or_insert((window_start, 0));

        if entry.0 != window_start {
            *entry = (window_start, 1);
            true
        } else if entry.1 < limit {
            entry.1 += 1;
            true
        } else {
            false
        }
    }

    fn get_rate_limit_remaining(&self, key: &str, limit: u32, window_secs: u64) -> Option<u32> {
        let now = current_timestamp();
        let window_start = now - (now % window_secs.max(1));
        let cache_key = format!("{key}:{window_start}");

        self.rate_limits.get(&cache_key).map(|entry| {
            if entry.0 == window_start {
                limit.saturating_sub(entry.1)
            } else {
                limit
            }
        })
    }

    fn clear_all(&self) {
        self.availability.invalidate_all();
        self.locations.invalidate_all();
        self.rate_limits.clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        debug!("cleared all hot-store state");
    }

    fn stats(&self) -> HotStoreStats {
        let online_count = self.availability.iter().filter(|(_, state)| state.online).count();

        HotStoreStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            online_count,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Get current Unix timestamp in seconds.
fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn store() -> MemoryHotStore {
        MemoryHotStore::new(1_000, 1_000, Duration::from_secs(3600))
    }

    fn availability(porter_id: PorterId, online: bool, coarse_location: Option<GeoCoordinate>) -> AvailabilityState {
        AvailabilityState { porter_id, online, last_seen: Utc::now(), coarse_location }
    }

    #[test]
    fn availability_round_trips() {
        let store = store();
        let porter_id = PorterId::new();
        store.set_availability(&availability(porter_id, true, None));

        let got = store.get_availability(porter_id).expect("should be cached");
        assert!(got.online);
    }

    #[test]
    fn clear_availability_removes_entry() {
        let store = store();
        let porter_id = PorterId::new();
        store.set_availability(&availability(porter_id, true, None));
        store.clear_availability(porter_id);

        assert!(store.get_availability(porter_id).is_none());
    }

    #[test]
    fn porters_near_filters_by_radius() {
        let store = store();
        let downtown = GeoCoordinate::new(40.7128, -74.0060).unwrap();
        let far_away = GeoCoordinate::new(34.0522, -118.2437).unwrap();

        let near_porter = PorterId::new();
        let far_porter = PorterId::new();

        store.set_last_location(&LastLocation {
            porter_id: near_porter,
            coordinate: downtown,
            accuracy_meters: None,
            timestamp: Utc::now(),
            order_id: None,
        });
        store.set_last_location(&LastLocation {
            porter_id: far_porter,
            coordinate: far_away,
            accuracy_meters: None,
            timestamp: Utc::now(),
            order_id: None,
        });

        let nearby = store.porters_near(downtown, 5_000.0);
        let ids: Vec<_> = nearby.iter().map(|(id, _)| *id).collect();

        assert!(ids.contains(&near_porter));
        assert!(!ids.contains(&far_porter));
    }

    #[test]
    fn porters_near_zero_radius_requires_exact_match() {
        let store = store();
        let point = GeoCoordinate::new(40.7128, -74.0060).unwrap();
        let nearby_but_not_exact = GeoCoordinate::new(40.7129, -74.0061).unwrap();

        let exact_porter = PorterId::new();
        let close_porter = PorterId::new();

        store.set_last_location(&LastLocation {
            porter_id: exact_porter,
            coordinate: point,
            accuracy_meters: None,
            timestamp: Utc::now(),
            order_id: None,
        });
        store.set_last_location(&LastLocation {
            porter_id: close_porter,
            coordinate: nearby_but_not_exact,
            accuracy_meters: None,
            timestamp: Utc::now(),
            order_id: None,
        });

        let nearby = store.porters_near(point, 0.0);
        let ids: Vec<_> = nearby.iter().map(|(id, _)| *id).collect();

        assert_eq!(ids, vec![exact_porter]);
    }

    #[test]
    fn last_location_round_trips() {
        let store = store();
        let porter_id = PorterId::new();
        let coordinate = GeoCoordinate::new(1.0, 1.0).unwrap();
        store.set_last_location(&LastLocation {
            porter_id,
            coordinate,
            accuracy_meters: Some(5.0),
            timestamp: Utc::now(),
            order_id: None,
        });

        let got = store.get_last_location(porter_id).expect("should be cached");
        assert_eq!(got.coordinate, coordinate);
    }

    #[test]
    fn rate_limit_allows_up_to_limit_then_blocks() {
        let store = store();
        assert!(store.check_rate_limit("porter-1", 3, 60));
        assert!(store.check_rate_limit("porter-1", 3, 60));
        assert!(store.check_rate_limit("porter-1", 3, 60));
        assert!(!store.check_rate_limit("porter-1", 3, 60));
    }

    #[test]
    fn rate_limit_remaining_reflects_usage() {
        let store = store();
        store.check_rate_limit("porter-1", 5, 60);
        store.check_rate_limit("porter-1", 5, 60);

        assert_eq!(store.get_rate_limit_remaining("porter-1", 5, 60), Some(3));
        assert_eq!(store.get_rate_limit_remaining("unseen-key", 5, 60), None);
    }

    #[test]
    fn clear_all_resets_everything() {
        let store = store();
        let porter_id = PorterId::new();
        store.set_availability(&availability(porter_id, true, None));
        store.check_rate_limit("porter-1", 5, 60);

        store.clear_all();

        assert!(store.get_availability(porter_id).is_none());
        assert_eq!(store.get_rate_limit_remaining("porter-1", 5, 60), None);
    }

    #[test]
    fn online_porter_ids_excludes_offline() {
        let store = store();
        let online = PorterId::new();
        let offline = PorterId::new();
        store.set_availability(&availability(online, true, None));
        store.set_availability(&availability(offline, false, None));
        store.run_pending_tasks();

        let ids = store.online_porter_ids();
        assert!(ids.contains(&online));
        assert!(!ids.contains(&offline));
    }

    #[test]
    fn stats_report_online_count() {
        let store = store();
        store.set_availability(&availability(PorterId::new(), true, None));
        store.set_availability(&availability(PorterId::new(), false, None));
        store.run_pending_tasks();

        let stats = store.stats();
        assert_eq!(stats.online_count, 1);
    }
}
