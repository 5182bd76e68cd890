//! Availability service (spec §4.1 / §2 `AvailabilityService`).
//!
//! Toggles and reads a porter's online/offline state through the hot-state
//! store, publishing lifecycle events alongside each toggle. Mirrors the
//! teacher's `PositionHandler<S, C>` shape: a service generic over the
//! store trait it needs plus a shared cache handle, rather than a trait
//! object.

use std::sync::Arc;

use tracing::warn;

use crate::error::{AppError, DomainError, Result};
use crate::ports::{Clock, EventPublisher, HotStateStore, PorterStore};
use crate::services::auth::{AuthContext, authorize_porter_owner};
use crate::types::entities::AvailabilityState;
use crate::types::events::{
    DispatchEvent, EventMetadata, PorterOfflineEvent, PorterOnlineEvent,
};
use crate::types::primitives::{CorrelationId, GeoCoordinate, PorterId};

/// Toggles availability and answers online-set queries.
///
/// Generic over the hot-state cache (`H`), the durable porter store (`P`,
/// needed to check eligibility before letting a porter go online), and a
/// [`Clock`] (`C`) for deterministic `last_seen` stamping in tests.
#[derive(Debug)]
pub struct AvailabilityService<H, P, C> {
    hot_store: Arc<H>,
    porter_store: Arc<P>,
    publisher: Arc<dyn EventPublisher>,
    clock: C,
}

impl<H, P, C> AvailabilityService<H, P, C>
where
    H: HotStateStore,
    P: PorterStore,
    C: Clock,
{
    /// Build a new availability service over the given ports.
    pub fn new(
        hot_store: Arc<H>,
        porter_store: Arc<P>,
        publisher: Arc<dyn EventPublisher>,
        clock: C,
    ) -> Self {
        Self { hot_store, porter_store, publisher, clock }
    }

    /// Toggle a porter online, optionally reporting a coarse location.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Forbidden`] if `ctx` does not own the porter,
    /// or a `NotFound`/infra error if the porter profile can't be read.
    /// Ineligible porters (unverified or suspended) are rejected.
    pub async fn go_online(
        &self,
        ctx: &AuthContext,
        porter_id: PorterId,
        coarse_location: Option<GeoCoordinate>,
    ) -> Result<AvailabilityState> {
        let profile = self
            .porter_store
            .get_by_id(porter_id)
            .await?
            .ok_or(AppError::Domain(DomainError::PorterNotFound(porter_id.to_string())))?;
        authorize_porter_owner(ctx, &profile)?;

        if !profile.is_eligible_for_dispatch() {
            return Err(AppError::Domain(DomainError::Forbidden(
                "porter is not eligible for dispatch".into(),
            )));
        }

        let now = self.clock.now();
        let state = AvailabilityState {
            porter_id,
            online: true,
            last_seen: now,
            coarse_location,
        };
        self.hot_store.set_availability(&state);

        let event = DispatchEvent::PorterOnline(PorterOnlineEvent {
            meta: EventMetadata::new(CorrelationId::new(), now),
            porter_id,
            location: coarse_location,
        });
        if let Err(err) = self.publisher.publish(&event).await {
            warn!(porter_id = %porter_id, error = %err, "failed to publish porter-online event");
        }

        Ok(state)
    }

    /// Toggle a porter offline.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Forbidden`] if `ctx` does not own the porter.
    pub async fn go_offline(
        &self,
        ctx: &AuthContext,
        porter_id: PorterId,
        coarse_location: Option<GeoCoordinate>,
    ) -> Result<AvailabilityState> {
        let profile = self
            .porter_store
            .get_by_id(porter_id)
            .await?
            .ok_or(AppError::Domain(DomainError::PorterNotFound(porter_id.to_string())))?;
        authorize_porter_owner(ctx, &profile)?;

        let now = self.clock.now();
        let state = AvailabilityState {
            porter_id,
            online: false,
            last_seen: now,
            coarse_location,
        };
        self.hot_store.clear_availability(porter_id);

        let event = DispatchEvent::PorterOffline(PorterOfflineEvent {
            meta: EventMetadata::new(CorrelationId::new(), now),
            porter_id,
            location: coarse_location,
        });
        if let Err(err) = self.publisher.publish(&event).await {
            warn!(porter_id = %porter_id, error = %err, "failed to publish porter-offline event");
        }

        Ok(state)
    }

    /// Refresh `last_seen` without changing the online flag (spec §4.1
    /// heartbeat). Does not publish an event — heartbeats are too frequent
    /// to be worth broadcasting.
    ///
    /// Returns `None` if the porter has no recorded availability state
    /// (i.e. has never gone online).
    pub fn heartbeat(&self, porter_id: PorterId) -> Option<AvailabilityState> {
        let mut state = self.hot_store.get_availability(porter_id)?;
        state.last_seen = self.clock.now();
        self.hot_store.set_availability(&state);
        Some(state)
    }

    /// Read a porter's current availability state, if any.
    #[must_use]
    pub fn get_availability(&self, porter_id: PorterId) -> Option<AvailabilityState> {
        self.hot_store.get_availability(porter_id)
    }

    /// List the ids of all porters currently considered online.
    #[must_use]
    pub fn online_porter_ids(&self) -> Vec<PorterId> {
        self.hot_store.online_porter_ids()
    }

    /// Count porters currently considered online.
    #[must_use]
    pub fn online_porter_count(&self) -> usize {
        self.hot_store.online_porter_ids().len()
    }
}
