//! End-to-end integration test: service layer against a real Postgres store.
//!
//! Exercises the path an order actually takes: a porter goes online,
//! receives an offer, accepts it, the order-completion event is consumed,
//! and the resulting earning is withdrawable.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use porter_dispatch_core::consumers::OrderCompletedConsumer;
use porter_dispatch_core::error::Result;
use porter_dispatch_core::ports::{
    Clock, EventPublisher, FakeClock, IdempotencyStore, MockEventPublisher, MockHotStateStore,
    PorterStore,
};
use porter_dispatch_core::services::auth::AuthContext;
use porter_dispatch_core::services::{AvailabilityService, EarningsService, JobOfferService, JobOfferSettings};
use porter_dispatch_core::types::entities::{IdempotencyRecord, Metadata};
use porter_dispatch_core::types::enums::{EarningStatus, OfferStatus, Role};
use porter_dispatch_core::types::events::OrderCompletedEvent;
use porter_dispatch_core::types::primitives::{AmountMinorUnits, CorrelationId, IdempotencyKey, OrderId};

use common::fixtures::{porter_fixtures, TestDb};

/// Minimal in-memory idempotency store for end-to-end wiring; the real
/// `IdempotencyStore` port has a durable-Postgres implementation exercised
/// separately by `store_integration.rs`.
#[derive(Default)]
struct InMemoryIdempotencyStore {
    records: Mutex<HashMap<String, IdempotencyRecord>>,
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        Ok(self.records.lock().expect("lock poisoned").get(key.as_str()).cloned())
    }

    async fn put(&self, record: &IdempotencyRecord) -> Result<()> {
        self.records
            .lock()
            .expect("lock poisoned")
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn delete_expired(&self, now: chrono::DateTime<Utc>) -> Result<u64> {
        let mut records = self.records.lock().expect("lock poisoned");
        let before = records.len();
        records.retain(|_, record| record.expires_at > now);
        Ok((before - records.len()) as u64)
    }
}

#[tokio::test]
async fn offer_accept_complete_withdraw_round_trip() {
    let db = TestDb::new().await;
    let store = Arc::new(db.store);

    let porter = porter_fixtures::verified_porter();
    store.save(&porter).await.expect("save porter");

    let hot_store = Arc::new(MockHotStateStore::new());
    let publisher = Arc::new(MockEventPublisher::new());
    let idempotency_store = Arc::new(InMemoryIdempotencyStore::default());
    let clock = FakeClock::now_fake();
    let ctx = AuthContext::new(porter.user_id, Role::Porter);

    let availability_service = AvailabilityService::new(
        Arc::clone(&hot_store),
        Arc::clone(&store),
        publisher.clone() as Arc<dyn EventPublisher>,
        clock.clone(),
    );
    availability_service
        .go_online(&ctx, porter.id, None)
        .await
        .expect("go online");

    let job_offer_service = Arc::new(JobOfferService::new(
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::clone(&idempotency_store),
        publisher.clone() as Arc<dyn EventPublisher>,
        clock.clone(),
        JobOfferSettings {
            offer_timeout: Duration::seconds(30),
            max_concurrent_offers_per_porter: 3,
            idempotency_record_ttl: Duration::hours(24),
        },
    ));

    let order_id = OrderId::new();
    let offer = job_offer_service
        .create_offer(order_id, porter.id, CorrelationId::new())
        .await
        .expect("create offer");

    let accept_key = IdempotencyKey::parse("accept-1").expect("valid key");
    let accepted = job_offer_service
        .accept_offer(&ctx, offer.id, &accept_key)
        .await
        .expect("accept offer");
    assert!(matches!(accepted.offer_status, OfferStatus::Accepted));

    let earnings_service = Arc::new(EarningsService::new(
        Arc::clone(&store),
        Arc::clone(&store),
        Arc::clone(&idempotency_store),
        clock.clone(),
        Duration::hours(24),
    ));

    let consumer = OrderCompletedConsumer::new(
        Arc::clone(&job_offer_service),
        Arc::clone(&earnings_service),
        Arc::clone(&store),
    );
    consumer
        .handle(OrderCompletedEvent {
            order_id,
            porter_id: porter.id,
            completed_at: clock.now(),
            amount: Some(AmountMinorUnits::new(2_000)),
            metadata: Metadata::empty(),
        })
        .await
        .expect("consume order completed");

    let order_earnings = earnings_service.order_earnings(order_id).await.expect("order earnings");
    assert_eq!(order_earnings.len(), 1);
    assert_eq!(order_earnings[0].amount, AmountMinorUnits::new(2_000));

    let updated_porter = store.get_by_id(porter.id).await.expect("get porter").expect("exists");
    assert_eq!(updated_porter.completed_jobs_count, 1);

    earnings_service
        .update_earning_status(order_earnings[0].id, EarningStatus::Confirmed, None, None, clock.now())
        .await
        .expect("confirm earning");

    let withdraw_key = IdempotencyKey::parse("withdraw-1").expect("valid key");
    let withdrawal = earnings_service
        .request_withdrawal(&ctx, porter.id, AmountMinorUnits::new(1_500), &withdraw_key)
        .await
        .expect("withdrawal");
    assert!(withdrawal.is_withdrawal_request());

    let summary = earnings_service.earnings_summary(&ctx, porter.id).await.expect("summary");
    assert_eq!(summary.confirmed, AmountMinorUnits::new(500));
}
