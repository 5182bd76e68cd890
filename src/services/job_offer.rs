//! Job offer service (spec §4.3 / §2 `JobOfferService`) — the race-free
//! accept path.
//!
//! `accept_offer` is a thin wrapper around [`JobOfferStore::accept`], which
//! carries the actual race-free state machine inside a single serializable
//! transaction (spec §4.3 steps 2-6). This service's job is everything
//! *around* that transaction: ownership checks at the authorization layer,
//! idempotency, event publication, and the best-effort sibling-revocation
//! broadcast that follows a successful accept.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::{AppError, DomainError, Result};
use crate::ports::{Clock, EventPublisher, IdempotencyStore, JobOfferStore, PorterStore};
use crate::services::auth::{AuthContext, authorize_porter_owner};
use crate::services::idempotency::with_idempotency;
use crate::types::entities::JobOffer;
use crate::types::enums::OfferStatus;
use crate::types::events::{
    DispatchEvent, EventMetadata, PorterAcceptedJobEvent, PorterOfferCreatedEvent,
    PorterRejectedJobEvent,
};
use crate::types::primitives::{CorrelationId, IdempotencyKey, OfferId, OrderId, PorterId};

/// Tunables the offer service needs from [`crate::config::settings::DispatchSettings`].
#[derive(Debug, Clone, Copy)]
pub struct JobOfferSettings {
    /// PENDING offer TTL (`offerTimeoutSeconds`).
    pub offer_timeout: chrono::Duration,
    /// Cap on in-flight PENDING offers per porter (`maxConcurrentOffersPerPorter`).
    pub max_concurrent_offers_per_porter: u32,
    /// TTL for idempotency records (`idempotencyRecordTtlHours`).
    pub idempotency_record_ttl: chrono::Duration,
}

/// Creates, accepts, rejects, and expires job offers.
///
/// Generic over the job-offer store (`J`), the porter store (`P`, used for
/// ownership checks), the idempotency store (`I`), and a [`Clock`] (`C`).
#[derive(Debug)]
pub struct JobOfferService<J, P, I, C> {
    offer_store: Arc<J>,
    porter_store: Arc<P>,
    idempotency_store: Arc<I>,
    publisher: Arc<dyn EventPublisher>,
    clock: C,
    settings: JobOfferSettings,
}

impl<J, P, I, C> JobOfferService<J, P, I, C>
where
    J: JobOfferStore + 'static,
    P: PorterStore,
    I: IdempotencyStore,
    C: Clock,
{
    /// Build a new job offer service over the given ports.
    pub fn new(
        offer_store: Arc<J>,
        porter_store: Arc<P>,
        idempotency_store: Arc<I>,
        publisher: Arc<dyn EventPublisher>,
        clock: C,
        settings: JobOfferSettings,
    ) -> Self {
        Self { offer_store, porter_store, idempotency_store, publisher, clock, settings }
    }

    /// Create a new PENDING offer for `porter_id` against `order_id` (spec
    /// §4.3 `createOffer`, step 1).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::TooManyPendingOffers`] if the porter already
    /// holds `maxConcurrentOffersPerPorter` PENDING offers.
    pub async fn create_offer(
        &self,
        order_id: OrderId,
        porter_id: PorterId,
        correlation_id: CorrelationId,
    ) -> Result<JobOffer> {
        let pending = self.offer_store.count_pending_for_porter(porter_id).await?;
        if pending >= self.settings.max_concurrent_offers_per_porter {
            return Err(AppError::Domain(DomainError::TooManyPendingOffers(
                porter_id.to_string(),
            )));
        }

        let now = self.clock.now();
        let expires_at = now + self.settings.offer_timeout;
        let offer = JobOffer {
            id: OfferId::new(),
            order_id,
            porter_id,
            offer_status: OfferStatus::Pending,
            assignment_status: crate::types::enums::AssignmentStatus::Pending,
            offered_at: now,
            expires_at,
            accepted_at: None,
            assigned_at: None,
            confirmed_at: None,
            rejected_at: None,
            expired_at: None,
            revoked_at: None,
            correlation_id: correlation_id.as_uuid(),
            rejection_reason: None,
            revoke_reason: None,
        };
        self.offer_store.create(&offer).await?;

        let event = DispatchEvent::PorterOfferCreated(PorterOfferCreatedEvent {
            meta: EventMetadata::new(correlation_id, now),
            offer_id: offer.id,
            order_id,
            porter_id,
            expires_at,
        });
        if let Err(err) = self.publisher.publish(&event).await {
            warn!(offer_id = %offer.id, error = %err, "failed to publish offer-created event");
        }

        Ok(offer)
    }

    /// Accept an offer on behalf of `ctx`'s porter (spec §4.3 `acceptOffer`).
    ///
    /// Delegates the actual race-free transition to
    /// [`JobOfferStore::accept`], then best-effort revokes every sibling
    /// offer's event in the background (spec's `revokeOtherOffers`: the
    /// store already marked them REVOKED inside the same transaction as the
    /// winner, so this step only needs to *announce* that, and a failure to
    /// announce does not affect correctness).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::OfferNotOwnedByPorter`],
    /// [`DomainError::OfferExpired`], or
    /// [`DomainError::InvalidStateTransition`] per the store's accept
    /// contract. Replays a cached response if `idempotency_key` was already
    /// used for this exact call.
    pub async fn accept_offer(
        &self,
        ctx: &AuthContext,
        offer_id: OfferId,
        idempotency_key: &IdempotencyKey,
    ) -> Result<JobOffer> {
        let porter_id = self.owning_porter_id(ctx).await?;

        let offer_store = Arc::clone(&self.offer_store);
        let publisher = Arc::clone(&self.publisher);
        let now = self.clock.now();

        let result = with_idempotency(
            self.idempotency_store.as_ref(),
            &self.clock,
            self.settings.idempotency_record_ttl,
            idempotency_key,
            ctx.user_id,
            "acceptOffer",
            async move {
                let (offer, revoked) = offer_store.accept(offer_id, porter_id, now).await?;

                let event = DispatchEvent::PorterAcceptedJob(PorterAcceptedJobEvent {
                    meta: EventMetadata::new(CorrelationId::new(), now),
                    offer_id: offer.id,
                    order_id: offer.order_id,
                    porter_id,
                });
                if let Err(err) = publisher.publish(&event).await {
                    warn!(offer_id = %offer.id, error = %err, "failed to publish offer-accepted event");
                }

                if !revoked.is_empty() {
                    let publisher = Arc::clone(&publisher);
                    let order_id = offer.order_id;
                    tokio::spawn(async move {
                        for revoked_offer_id in revoked {
                            let event = DispatchEvent::PorterRejectedJob(PorterRejectedJobEvent {
                                meta: EventMetadata::new(CorrelationId::new(), now),
                                offer_id: revoked_offer_id,
                                order_id,
                                porter_id,
                                reason: Some("revoked: sibling offer accepted".into()),
                            });
                            if let Err(err) = publisher.publish(&event).await {
                                warn!(
                                    offer_id = %revoked_offer_id,
                                    error = %err,
                                    "failed to publish sibling-revocation event"
                                );
                            }
                        }
                    });
                }

                Ok(offer)
            },
        )
        .await?;

        Ok(result)
    }

    /// Reject an offer on behalf of `ctx`'s porter (spec §4.3 `rejectOffer`).
    ///
    /// # Errors
    ///
    /// Returns the same domain errors as [`Self::accept_offer`], minus
    /// sibling revocation (rejection has no effect on sibling offers).
    pub async fn reject_offer(
        &self,
        ctx: &AuthContext,
        offer_id: OfferId,
        reason: Option<String>,
    ) -> Result<JobOffer> {
        let porter_id = self.owning_porter_id(ctx).await?;
        let now = self.clock.now();

        let offer = self
            .offer_store
            .reject(offer_id, porter_id, reason.clone(), now)
            .await?;

        let event = DispatchEvent::PorterRejectedJob(PorterRejectedJobEvent {
            meta: EventMetadata::new(CorrelationId::new(), now),
            offer_id: offer.id,
            order_id: offer.order_id,
            porter_id,
            reason,
        });
        if let Err(err) = self.publisher.publish(&event).await {
            warn!(offer_id = %offer.id, error = %err, "failed to publish offer-rejected event");
        }

        Ok(offer)
    }

    /// Expire every PENDING offer whose `expiresAt` has passed (the
    /// `expire-offers` scheduled job, spec §4.6). Publishes a
    /// `PorterRejectedJob` event per expired offer so downstream consumers
    /// treat expiry the same as an explicit rejection.
    ///
    /// # Errors
    ///
    /// Propagates store errors. Event-publish failures for individual
    /// expired offers are logged and do not abort the sweep.
    pub async fn expire_offers(&self, now: DateTime<Utc>) -> Result<Vec<JobOffer>> {
        let expired = self.offer_store.expire_stale(now).await?;

        for offer in &expired {
            let event = DispatchEvent::PorterRejectedJob(PorterRejectedJobEvent {
                meta: EventMetadata::new(CorrelationId::new(), now),
                offer_id: offer.id,
                order_id: offer.order_id,
                porter_id: offer.porter_id,
                reason: Some("expired".into()),
            });
            if let Err(err) = self.publisher.publish(&event).await {
                warn!(offer_id = %offer.id, error = %err, "failed to publish offer-expired event");
            }
        }

        Ok(expired)
    }

    /// List offers for a porter, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Forbidden`] if `ctx` does not own `porter_id`.
    pub async fn get_porter_offers(
        &self,
        ctx: &AuthContext,
        porter_id: PorterId,
        status: Option<OfferStatus>,
    ) -> Result<Vec<JobOffer>> {
        let profile = self
            .porter_store
            .get_by_id(porter_id)
            .await?
            .ok_or(AppError::Domain(DomainError::PorterNotFound(porter_id.to_string())))?;
        authorize_porter_owner(ctx, &profile)?;
        self.offer_store.list_for_porter(porter_id, status).await
    }

    /// List every offer created for an order, any status.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn get_order_offers(&self, order_id: OrderId) -> Result<Vec<JobOffer>> {
        self.offer_store.get_order_offers(order_id).await
    }

    async fn owning_porter_id(&self, ctx: &AuthContext) -> Result<PorterId> {
        let profile = self
            .porter_store
            .get_by_user_id(ctx.user_id)
            .await?
            .ok_or(AppError::Domain(DomainError::Forbidden(
                "caller has no porter profile".into(),
            )))?;
        Ok(profile.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FakeClock, MockEventPublisher};
    use crate::services::test_support::InMemoryPorterStore;
    use crate::types::entities::{IdempotencyRecord, PorterProfile};
    use crate::types::enums::{AssignmentStatus, Role, VerificationStatus};
    use crate::types::primitives::{AmountMinorUnits, UserId};
    use std::sync::Mutex;

    #[derive(Default)]
    struct InMemoryJobOfferStore {
        offers: Mutex<Vec<JobOffer>>,
    }

    #[async_trait::async_trait]
    impl JobOfferStore for InMemoryJobOfferStore {
        async fn create(&self, offer: &JobOffer) -> Result<()> {
            self.offers.lock().expect("poisoned").push(offer.clone());
            Ok(())
        }

        async fn get_by_id(&self, id: OfferId) -> Result<Option<JobOffer>> {
            Ok(self.offers.lock().expect("poisoned").iter().find(|o| o.id == id).cloned())
        }

        async fn count_pending_for_porter(&self, porter_id: PorterId) -> Result<u32> {
            Ok(self
                .offers
                .lock()
                .expect("poisoned")
                .iter()
                .filter(|o| o.porter_id == porter_id && o.offer_status == OfferStatus::Pending)
                .count() as u32)
        }

        async fn list_pending_siblings(
            &self,
            order_id: OrderId,
            exclude: OfferId,
        ) -> Result<Vec<JobOffer>> {
            Ok(self
                .offers
                .lock()
                .expect("poisoned")
                .iter()
                .filter(|o| {
                    o.order_id == order_id
                        && o.id != exclude
                        && o.offer_status == OfferStatus::Pending
                })
                .cloned()
                .collect())
        }

        async fn accept(
            &self,
            offer_id: OfferId,
            porter_id: PorterId,
            now: DateTime<Utc>,
        ) -> Result<(JobOffer, Vec<OfferId>)> {
            let mut offers = self.offers.lock().expect("poisoned");
            let order_id = offers
                .iter()
                .find(|o| o.id == offer_id)
                .ok_or(AppError::Domain(DomainError::OfferNotFound(offer_id.to_string())))?
                .order_id;

            {
                let offer = offers
                    .iter_mut()
                    .find(|o| o.id == offer_id)
                    .expect("offer located above");
                if offer.porter_id != porter_id {
                    return Err(AppError::Domain(DomainError::OfferNotOwnedByPorter {
                        offer_id: offer_id.to_string(),
                        porter_id: porter_id.to_string(),
                    }));
                }
                if offer.offer_status != OfferStatus::Pending {
                    return Err(AppError::Domain(DomainError::InvalidStateTransition {
                        from: format!("{:?}", offer.offer_status),
                        attempted: "accept".into(),
                    }));
                }
                if offer.is_expired_at(now) {
                    offer.offer_status = OfferStatus::Expired;
                    offer.expired_at = Some(now);
                    return Err(AppError::Domain(DomainError::OfferExpired(offer_id.to_string())));
                }
                offer.offer_status = OfferStatus::Accepted;
                offer.assignment_status = AssignmentStatus::Confirmed;
                offer.accepted_at = Some(now);
                offer.assigned_at = Some(now);
                offer.confirmed_at = Some(now);
            }

            let mut revoked = Vec::new();
            for sibling in offers.iter_mut() {
                if sibling.order_id == order_id
                    && sibling.id != offer_id
                    && sibling.offer_status == OfferStatus::Pending
                {
                    sibling.offer_status = OfferStatus::Revoked;
                    sibling.revoked_at = Some(now);
                    revoked.push(sibling.id);
                }
            }

            let accepted = offers.iter().find(|o| o.id == offer_id).expect("just accepted").clone();
            Ok((accepted, revoked))
        }

        async fn reject(
            &self,
            offer_id: OfferId,
            porter_id: PorterId,
            reason: Option<String>,
            now: DateTime<Utc>,
        ) -> Result<JobOffer> {
            let mut offers = self.offers.lock().expect("poisoned");
            let offer = offers
                .iter_mut()
                .find(|o| o.id == offer_id)
                .ok_or(AppError::Domain(DomainError::OfferNotFound(offer_id.to_string())))?;
            if offer.porter_id != porter_id {
                return Err(AppError::Domain(DomainError::OfferNotOwnedByPorter {
                    offer_id: offer_id.to_string(),
                    porter_id: porter_id.to_string(),
                }));
            }
            offer.offer_status = OfferStatus::Rejected;
            offer.rejected_at = Some(now);
            offer.rejection_reason = reason;
            Ok(offer.clone())
        }

        async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<JobOffer>> {
            let mut offers = self.offers.lock().expect("poisoned");
            let mut expired = Vec::new();
            for offer in offers.iter_mut() {
                if offer.offer_status == OfferStatus::Pending && offer.is_expired_at(now) {
                    offer.offer_status = OfferStatus::Expired;
                    offer.expired_at = Some(now);
                    expired.push(offer.clone());
                }
            }
            Ok(expired)
        }

        async fn list_for_porter(
            &self,
            porter_id: PorterId,
            status: Option<OfferStatus>,
        ) -> Result<Vec<JobOffer>> {
            Ok(self
                .offers
                .lock()
                .expect("poisoned")
                .iter()
                .filter(|o| o.porter_id == porter_id)
                .filter(|o| status.is_none_or(|s| o.offer_status == s))
                .cloned()
                .collect())
        }

        async fn get_order_offers(&self, order_id: OrderId) -> Result<Vec<JobOffer>> {
            Ok(self
                .offers
                .lock()
                .expect("poisoned")
                .iter()
                .filter(|o| o.order_id == order_id)
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct InMemoryIdempotencyStore {
        records: Mutex<Vec<IdempotencyRecord>>,
    }

    #[async_trait::async_trait]
    impl IdempotencyStore for InMemoryIdempotencyStore {
        async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
            Ok(self
                .records
                .lock()
                .expect("poisoned")
                .iter()
                .find(|r| r.key == key.as_str())
                .cloned())
        }

        async fn put(&self, record: &IdempotencyRecord) -> Result<()> {
            self.records.lock().expect("poisoned").push(record.clone());
            Ok(())
        }

        async fn delete_expired(&self, _now: DateTime<Utc>) -> Result<u64> {
            Ok(0)
        }
    }

    fn settings() -> JobOfferSettings {
        JobOfferSettings {
            offer_timeout: chrono::Duration::seconds(30),
            max_concurrent_offers_per_porter: 3,
            idempotency_record_ttl: chrono::Duration::hours(24),
        }
    }

    fn verified_profile(user_id: UserId, porter_id: PorterId) -> PorterProfile {
        PorterProfile {
            id: porter_id,
            user_id,
            phone: "+15555550100".into(),
            vehicle_category: "bike".into(),
            verification_status: VerificationStatus::Verified,
            suspended: false,
            suspension_reason: None,
            completed_jobs_count: 0,
            lifetime_earnings: AmountMinorUnits::ZERO,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn new_service() -> (
        JobOfferService<
            InMemoryJobOfferStore,
            InMemoryPorterStore,
            InMemoryIdempotencyStore,
            FakeClock,
        >,
        Arc<MockEventPublisher>,
        Arc<InMemoryPorterStore>,
    ) {
        let offer_store = Arc::new(InMemoryJobOfferStore::default());
        let porter_store = Arc::new(InMemoryPorterStore::default());
        let idempotency_store = Arc::new(InMemoryIdempotencyStore::default());
        let publisher = Arc::new(MockEventPublisher::new());
        let service = JobOfferService::new(
            offer_store,
            Arc::clone(&porter_store),
            idempotency_store,
            publisher.clone() as Arc<dyn EventPublisher>,
            FakeClock::now_fake(),
            settings(),
        );
        (service, publisher, porter_store)
    }

    #[tokio::test]
    async fn create_then_accept_succeeds() {
        let (service, publisher, porter_store) = new_service();
        let user_id = UserId::new();
        let porter_id = PorterId::new();
        porter_store.seed(verified_profile(user_id, porter_id));

        let order_id = OrderId::new();
        let offer = service
            .create_offer(order_id, porter_id, CorrelationId::new())
            .await
            .expect("create should succeed");

        let ctx = AuthContext::new(user_id, Role::Porter);
        let key = IdempotencyKey::parse("accept-1").expect("valid key");
        let accepted = service
            .accept_offer(&ctx, offer.id, &key)
            .await
            .expect("accept should succeed");

        assert_eq!(accepted.offer_status, OfferStatus::Accepted);
        assert!(publisher.count() >= 2, "expect offer-created + accepted events");
    }

    #[tokio::test]
    async fn sibling_offers_are_revoked_on_accept() {
        let (service, _publisher, porter_store) = new_service();
        let order_id = OrderId::new();

        let winner_user = UserId::new();
        let winner_porter = PorterId::new();
        porter_store.seed(verified_profile(winner_user, winner_porter));
        let winner_offer = service
            .create_offer(order_id, winner_porter, CorrelationId::new())
            .await
            .expect("create winner offer");

        let loser_user = UserId::new();
        let loser_porter = PorterId::new();
        porter_store.seed(verified_profile(loser_user, loser_porter));
        let loser_offer = service
            .create_offer(order_id, loser_porter, CorrelationId::new())
            .await
            .expect("create loser offer");

        let ctx = AuthContext::new(winner_user, Role::Porter);
        let key = IdempotencyKey::parse("accept-winner").expect("valid key");
        service.accept_offer(&ctx, winner_offer.id, &key).await.expect("winner accepts");

        let order_offers = service.get_order_offers(order_id).await.expect("list offers");
        let loser = order_offers.iter().find(|o| o.id == loser_offer.id).expect("loser present");
        assert_eq!(loser.offer_status, OfferStatus::Revoked);
    }

    #[tokio::test]
    async fn too_many_pending_offers_is_rejected() {
        let (service, _publisher, porter_store) = new_service();
        let user_id = UserId::new();
        let porter_id = PorterId::new();
        porter_store.seed(verified_profile(user_id, porter_id));

        for _ in 0..3 {
            service
                .create_offer(OrderId::new(), porter_id, CorrelationId::new())
                .await
                .expect("within cap");
        }

        let result = service.create_offer(OrderId::new(), porter_id, CorrelationId::new()).await;
        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::TooManyPendingOffers(_)))
        ));
    }

    #[tokio::test]
    async fn accept_is_idempotent_under_retry() {
        let (service, publisher, porter_store) = new_service();
        let user_id = UserId::new();
        let porter_id = PorterId::new();
        porter_store.seed(verified_profile(user_id, porter_id));

        let offer = service
            .create_offer(OrderId::new(), porter_id, CorrelationId::new())
            .await
            .expect("create");

        let ctx = AuthContext::new(user_id, Role::Porter);
        let key = IdempotencyKey::parse("retry-accept").expect("valid key");

        let first = service.accept_offer(&ctx, offer.id, &key).await.expect("first accept");
        let count_after_first = publisher.count();
        let second = service.accept_offer(&ctx, offer.id, &key).await.expect("replayed accept");

        assert_eq!(first.id, second.id);
        assert_eq!(
            publisher.count(),
            count_after_first,
            "replay must not re-publish or re-run the accept transaction"
        );
    }

    #[tokio::test]
    async fn expire_offers_marks_stale_pending_offers() {
        let (service, _publisher, porter_store) = new_service();
        let user_id = UserId::new();
        let porter_id = PorterId::new();
        porter_store.seed(verified_profile(user_id, porter_id));

        let offer = service
            .create_offer(OrderId::new(), porter_id, CorrelationId::new())
            .await
            .expect("create");

        let far_future = offer.expires_at + chrono::Duration::seconds(1);
        let expired = service.expire_offers(far_future).await.expect("expire sweep");
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, offer.id);
    }
}
