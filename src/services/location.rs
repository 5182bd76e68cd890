//! Location service (spec §4.1 / §2 `LocationService`).
//!
//! Updates the hot-state last-known location on every report, periodically
//! durably snapshotting it (spec's `locationSnapshotIntervalSeconds`), and
//! answers nearby-porter queries over the hot-state online index.

use std::sync::Arc;

use tracing::warn;

use crate::error::{AppError, DomainError, Result};
use crate::ports::{Clock, EventPublisher, HotStateStore, LocationSnapshotStore, PorterStore};
use crate::services::auth::AuthContext;
use crate::types::entities::{LastLocation, LocationSnapshot};
use crate::types::events::{DispatchEvent, EventMetadata, PorterLocationUpdatedEvent};
use crate::types::primitives::{CorrelationId, GeoCoordinate, OrderId, PorterId};

/// Updates and queries porter location state.
///
/// Generic over the hot-state cache (`H`), the durable snapshot store (`L`),
/// the porter store (`P`, used to filter `findNearbyPorters` results down
/// to verified/non-suspended porters), and a [`Clock`] (`C`).
#[derive(Debug)]
pub struct LocationService<H, L, P, C> {
    hot_store: Arc<H>,
    snapshot_store: Arc<L>,
    porter_store: Arc<P>,
    publisher: Arc<dyn EventPublisher>,
    clock: C,
    snapshot_interval: chrono::Duration,
    update_rate_per_second: u32,
}

impl<H, L, P, C> LocationService<H, L, P, C>
where
    H: HotStateStore,
    L: LocationSnapshotStore,
    P: PorterStore,
    C: Clock,
{
    /// Build a new location service. `snapshot_interval` is the minimum gap
    /// between durable snapshots for the same porter
    /// (`locationSnapshotIntervalSeconds`). `update_rate_per_second` caps
    /// per-porter location updates (`locationUpdateRatePerSecond`).
    pub fn new(
        hot_store: Arc<H>,
        snapshot_store: Arc<L>,
        porter_store: Arc<P>,
        publisher: Arc<dyn EventPublisher>,
        clock: C,
        snapshot_interval: chrono::Duration,
        update_rate_per_second: u32,
    ) -> Self {
        Self {
            hot_store,
            snapshot_store,
            porter_store,
            publisher,
            clock,
            snapshot_interval,
            update_rate_per_second,
        }
    }

    /// Record a location report for `porter_id` (spec §4.1 `updateLocation`).
    ///
    /// Always updates the hot-state last-known location and publishes a
    /// [`DispatchEvent::PorterLocationUpdated`] event. Durably snapshots the
    /// location only if no snapshot has been taken for this porter within
    /// `snapshot_interval`. Rejects the call with [`AppError::RateLimited`]
    /// once the porter exceeds `locationUpdateRatePerSecond` (spec §4.2
    /// "Rate limit" / §5 backpressure — excess is shed, not buffered).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InvalidCoordinate`] if `lat`/`lng` are out of
    /// range, or [`AppError::RateLimited`] if the porter's update rate is
    /// exceeded.
    pub async fn update_location(
        &self,
        _ctx: &AuthContext,
        porter_id: PorterId,
        lat: f64,
        lng: f64,
        accuracy_meters: Option<f64>,
        order_id: Option<OrderId>,
    ) -> Result<LastLocation> {
        let rate_limit_key = format!("location:{porter_id}");
        if !self.hot_store.check_rate_limit(&rate_limit_key, self.update_rate_per_second, 1) {
            return Err(AppError::RateLimited);
        }

        let coordinate = GeoCoordinate::new(lat, lng)?;
        let now = self.clock.now();

        let location = LastLocation {
            porter_id,
            coordinate,
            accuracy_meters,
            timestamp: now,
            order_id,
        };
        self.hot_store.set_last_location(&location);

        // Durable snapshotting (steps 2-3 of spec §4.2) is best-effort: the
        // hot write above has already landed, and neither the cadence check
        // nor the snapshot insert nor the event publish may fail the call.
        let should_snapshot = match self.snapshot_store.list_for_porter(porter_id, None, 1).await {
            Ok(history) => history
                .first()
                .is_none_or(|last| now - last.captured_at >= self.snapshot_interval),
            Err(err) => {
                warn!(porter_id = %porter_id, error = %err, "failed to read snapshot cadence, skipping snapshot");
                false
            }
        };

        if should_snapshot {
            let snapshot = LocationSnapshot {
                id: uuid::Uuid::now_v7(),
                porter_id,
                coordinate,
                order_id,
                captured_at: now,
            };
            if let Err(err) = self.snapshot_store.save(&snapshot).await {
                warn!(porter_id = %porter_id, error = %err, "failed to persist location snapshot");
            }
        }

        let event = DispatchEvent::PorterLocationUpdated(PorterLocationUpdatedEvent {
            meta: EventMetadata::new(CorrelationId::new(), now),
            porter_id,
            lat: coordinate.lat(),
            lng: coordinate.lng(),
            accuracy: accuracy_meters,
            order_id,
        });
        if let Err(err) = self.publisher.publish(&event).await {
            warn!(porter_id = %porter_id, error = %err, "failed to publish location-updated event");
        }

        Ok(location)
    }

    /// Get a porter's last known location from the hot-state store.
    #[must_use]
    pub fn last_location(&self, porter_id: PorterId) -> Option<LastLocation> {
        self.hot_store.get_last_location(porter_id)
    }

    /// Get last known locations for a batch of porters (spec §4.1
    /// `batchLastLocations`). Porters with no cached location are omitted.
    #[must_use]
    pub fn batch_last_locations(&self, porter_ids: &[PorterId]) -> Vec<LastLocation> {
        porter_ids.iter().filter_map(|id| self.hot_store.get_last_location(*id)).collect()
    }

    /// Find porters within `radius_meters` of `center` (spec §4.1
    /// `findNearbyPorters`), sorted ascending by distance.
    ///
    /// When `online_only` is set (the spec default), candidates are
    /// intersected with the online-porter index before the Durable Store
    /// join. Results are always filtered to porters that are VERIFIED,
    /// not suspended, and not inactive (spec §3 `PorterProfile` invariant).
    ///
    /// # Errors
    ///
    /// Propagates porter-store errors from the eligibility join.
    pub async fn find_nearby_porters(
        &self,
        center: GeoCoordinate,
        radius_meters: f64,
        online_only: bool,
    ) -> Result<Vec<(PorterId, GeoCoordinate, f64)>> {
        let mut candidates = self.hot_store.porters_near(center, radius_meters);

        if online_only {
            let online: std::collections::HashSet<PorterId> =
                self.hot_store.online_porter_ids().into_iter().collect();
            candidates.retain(|(id, _)| online.contains(id));
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<PorterId> = candidates.iter().map(|(id, _)| *id).collect();
        let eligible_profiles = self.porter_store.get_by_ids(&ids).await?;
        let eligible: std::collections::HashSet<PorterId> = eligible_profiles
            .iter()
            .filter(|profile| profile.is_eligible_for_dispatch())
            .map(|profile| profile.id)
            .collect();

        let mut results: Vec<(PorterId, GeoCoordinate, f64)> = candidates
            .into_iter()
            .filter(|(id, _)| eligible.contains(id))
            .map(|(id, coord)| (id, coord, center.haversine_distance_meters(&coord)))
            .collect();
        results.sort_by(|a, b| a.2.total_cmp(&b.2));
        Ok(results)
    }

    /// Read durable location history for a porter, most recent first.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn location_history(
        &self,
        porter_id: PorterId,
        order_id: Option<OrderId>,
        limit: u32,
    ) -> Result<Vec<LocationSnapshot>> {
        self.snapshot_store.list_for_porter(porter_id, order_id, limit).await
    }

    /// Prune durable location history older than `cutoff` (the
    /// `cleanup-location-history` scheduled job).
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn cleanup_old_history(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64> {
        self.snapshot_store.delete_older_than(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FakeClock, MockEventPublisher, MockHotStateStore};
    use crate::services::test_support::InMemoryPorterStore;
    use crate::types::primitives::UserId;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemorySnapshotStore {
        snapshots: Mutex<Vec<LocationSnapshot>>,
    }

    #[async_trait::async_trait]
    impl LocationSnapshotStore for InMemorySnapshotStore {
        async fn save(&self, snapshot: &LocationSnapshot) -> Result<()> {
            self.snapshots.lock().expect("poisoned").push(snapshot.clone());
            Ok(())
        }

        async fn delete_older_than(&self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<u64> {
            let mut snapshots = self.snapshots.lock().expect("poisoned");
            let before = snapshots.len();
            snapshots.retain(|s| s.captured_at >= cutoff);
            Ok((before - snapshots.len()) as u64)
        }

        async fn list_for_porter(
            &self,
            porter_id: PorterId,
            order_id: Option<OrderId>,
            limit: u32,
        ) -> Result<Vec<LocationSnapshot>> {
            let mut matching: Vec<_> = self
                .snapshots
                .lock()
                .expect("poisoned")
                .iter()
                .filter(|s| s.porter_id == porter_id)
                .filter(|s| order_id.is_none() || s.order_id == order_id)
                .cloned()
                .collect();
            matching.sort_by(|a, b| b.captured_at.cmp(&a.captured_at));
            matching.truncate(limit as usize);
            Ok(matching)
        }
    }

    fn ctx() -> AuthContext {
        AuthContext::new(UserId::new(), crate::types::enums::Role::Porter)
    }

    fn verified_profile(porter_id: PorterId) -> crate::types::entities::PorterProfile {
        crate::types::entities::PorterProfile {
            id: porter_id,
            user_id: UserId::new(),
            phone: "+15555550100".into(),
            vehicle_category: "bike".into(),
            verification_status: crate::types::enums::VerificationStatus::Verified,
            suspended: false,
            suspension_reason: None,
            completed_jobs_count: 0,
            lifetime_earnings: crate::types::primitives::AmountMinorUnits::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn new_service(
        hot_store: Arc<MockHotStateStore>,
        snapshot_store: Arc<InMemorySnapshotStore>,
        publisher: Arc<dyn EventPublisher>,
        porter_store: Arc<InMemoryPorterStore>,
    ) -> LocationService<MockHotStateStore, InMemorySnapshotStore, InMemoryPorterStore, FakeClock> {
        LocationService::new(
            hot_store,
            snapshot_store,
            porter_store,
            publisher,
            FakeClock::now_fake(),
            chrono::Duration::seconds(30),
            10,
        )
    }

    #[tokio::test]
    async fn update_location_sets_hot_state_and_publishes() {
        let hot_store = Arc::new(MockHotStateStore::new());
        let snapshot_store = Arc::new(InMemorySnapshotStore::default());
        let publisher = Arc::new(MockEventPublisher::new());
        let porter_store = Arc::new(InMemoryPorterStore::default());
        let porter_id = PorterId::new();

        let service = new_service(
            Arc::clone(&hot_store),
            Arc::clone(&snapshot_store),
            publisher.clone() as Arc<dyn EventPublisher>,
            porter_store,
        );

        let location = service
            .update_location(&ctx(), porter_id, 37.7749, -122.4194, Some(5.0), None)
            .await
            .expect("valid coordinate");

        assert_eq!(location.porter_id, porter_id);
        assert_eq!(publisher.count(), 1);
        assert_eq!(service.location_history(porter_id, None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_latitude_is_rejected() {
        let hot_store = Arc::new(MockHotStateStore::new());
        let snapshot_store = Arc::new(InMemorySnapshotStore::default());
        let publisher = Arc::new(MockEventPublisher::new());
        let porter_store = Arc::new(InMemoryPorterStore::default());

        let service = new_service(
            hot_store,
            snapshot_store,
            publisher as Arc<dyn EventPublisher>,
            porter_store,
        );

        let result = service
            .update_location(&ctx(), PorterId::new(), 200.0, 0.0, None, None)
            .await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::InvalidCoordinate(_)))
        ));
    }

    #[tokio::test]
    async fn repeated_updates_within_interval_skip_snapshot() {
        let hot_store = Arc::new(MockHotStateStore::new());
        let snapshot_store = Arc::new(InMemorySnapshotStore::default());
        let publisher = Arc::new(MockEventPublisher::new());
        let porter_store = Arc::new(InMemoryPorterStore::default());
        let porter_id = PorterId::new();

        let service = new_service(
            hot_store,
            Arc::clone(&snapshot_store),
            publisher as Arc<dyn EventPublisher>,
            porter_store,
        );

        service
            .update_location(&ctx(), porter_id, 1.0, 1.0, None, None)
            .await
            .expect("first update");
        service
            .update_location(&ctx(), porter_id, 1.0001, 1.0001, None, None)
            .await
            .expect("second update");

        assert_eq!(
            service.location_history(porter_id, None, 10).await.unwrap().len(),
            1,
            "second update inside interval should not create a new snapshot"
        );
    }

    #[tokio::test]
    async fn nearby_query_filters_unverified_porters() {
        let hot_store = Arc::new(MockHotStateStore::new());
        let snapshot_store = Arc::new(InMemorySnapshotStore::default());
        let publisher = Arc::new(MockEventPublisher::new());
        let porter_store = Arc::new(InMemoryPorterStore::default());

        let verified_porter = PorterId::new();
        let under_review_porter = PorterId::new();
        porter_store.seed(verified_profile(verified_porter));
        let mut under_review = verified_profile(under_review_porter);
        under_review.verification_status = crate::types::enums::VerificationStatus::UnderReview;
        porter_store.seed(under_review);

        let service = new_service(
            Arc::clone(&hot_store),
            snapshot_store,
            publisher as Arc<dyn EventPublisher>,
            porter_store,
        );

        service
            .update_location(&ctx(), verified_porter, 40.7128, -74.0060, None, None)
            .await
            .expect("verified porter location");
        service
            .update_location(&ctx(), under_review_porter, 40.7128, -74.0060, None, None)
            .await
            .expect("under-review porter location");
        hot_store.set_availability(&crate::types::entities::AvailabilityState {
            porter_id: verified_porter,
            online: true,
            last_seen: Utc::now(),
            coarse_location: None,
        });
        hot_store.set_availability(&crate::types::entities::AvailabilityState {
            porter_id: under_review_porter,
            online: true,
            last_seen: Utc::now(),
            coarse_location: None,
        });

        let center = GeoCoordinate::new(40.7128, -74.0060).expect("valid coordinate");
        let nearby = service
            .find_nearby_porters(center, 1_000.0, true)
            .await
            .expect("nearby query succeeds");

        let ids: Vec<_> = nearby.iter().map(|(id, _, _)| *id).collect();
        assert_eq!(ids, vec![verified_porter]);
    }

    #[tokio::test]
    async fn nearby_query_zero_radius_requires_exact_match() {
        let hot_store = Arc::new(MockHotStateStore::new());
        let snapshot_store = Arc::new(InMemorySnapshotStore::default());
        let publisher = Arc::new(MockEventPublisher::new());
        let porter_store = Arc::new(InMemoryPorterStore::default());

        let exact_porter = PorterId::new();
        let close_porter = PorterId::new();
        porter_store.seed(verified_profile(exact_porter));
        porter_store.seed(verified_profile(close_porter));

        let service = new_service(
            Arc::clone(&hot_store),
            snapshot_store,
            publisher as Arc<dyn EventPublisher>,
            porter_store,
        );

        service
            .update_location(&ctx(), exact_porter, 40.7128, -74.0060, None, None)
            .await
            .expect("exact porter location");
        service
            .update_location(&ctx(), close_porter, 40.7129, -74.0061, None, None)
            .await
            .expect("close porter location");
        for porter_id in [exact_porter, close_porter] {
            hot_store.set_availability(&crate::types::entities::AvailabilityState {
                porter_id,
                online: true,
                last_seen: Utc::now(),
                coarse_location: None,
            });
        }

        let center = GeoCoordinate::new(40.7128, -74.0060).expect("valid coordinate");
        let nearby = service
            .find_nearby_porters(center, 0.0, true)
            .await
            .expect("nearby query succeeds");

        let ids: Vec<_> = nearby.iter().map(|(id, _, _)| *id).collect();
        assert_eq!(ids, vec![exact_porter]);
    }
}
