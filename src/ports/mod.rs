//! Port definitions for dependency injection and testability.
//!
//! Ports are trait definitions that describe what the domain layer needs.
//! Following hexagonal architecture, adapters (in the infrastructure layer)
//! implement these traits to provide concrete functionality.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Service Layer                           │
//! │                                                                 │
//! │  Uses ports (traits) to define what it needs                   │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────┐  ┌───────────────┐          │
//! │  │ PorterStore │  │JobOfferStore │  │EarningsStore  │  ...     │
//! │  └──────┬──────┘  └──────┬───────┘  └──────┬────────┘          │
//! │         │                │                 │                   │
//! └─────────┼────────────────┼─────────────────┼───────────────────┘
//!           │                │                 │
//!           ▼                ▼                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Infrastructure Layer                        │
//! │                                                                 │
//! │  Provides adapters (implementations) for ports                 │
//! │                                                                 │
//! │  ┌─────────────┐  ┌──────────────┐  ┌───────────────┐          │
//! │  │PostgresStore│  │ PostgresStore│  │ PostgresStore │  ...     │
//! │  └─────────────┘  └──────────────┘  └───────────────┘          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Port Categories
//!
//! | Category | Ports | Purpose |
//! |----------|-------|---------|
//! | Durable storage | [`PorterStore`], [`JobOfferStore`], [`EarningsStore`], [`IdempotencyStore`], [`LocationSnapshotStore`] | Durable persistence |
//! | Hot-state storage | [`HotStateStore`] | Availability/location fast path + rate limiting |
//! | Streaming | [`EventPublisher`] | Event broadcasting |
//! | Time | [`Clock`] | Testable time operations |
//!
//! # Usage
//!
//! ```ignore
//! use porter_dispatch_core::ports::{JobOfferStore, Clock};
//!
//! // Service code depends on traits, not implementations
//! async fn accept<S: JobOfferStore, C: Clock>(store: &S, clock: &C, offer_id: OfferId, porter_id: PorterId) {
//!     let (offer, revoked) = store.accept(offer_id, porter_id, clock.now()).await?;
//!     // ...
//! }
//!
//! // In production, use real implementations
//! let store = PostgresJobOfferStore::new(pool);
//! let clock = SystemClock;
//!
//! // In tests, use mocks
//! let clock = FakeClock::new(fixed_time);
//! ```

mod cache;
mod clock;
mod store;
mod streaming;

// Re-export all port traits
pub use cache::{HotStateStore, HotStoreStats};
pub use clock::{Clock, SystemClock};
pub use store::{
    EarningsStore, IdempotencyStore, JobOfferStore, LocationSnapshotStore, PorterStore,
};
pub use streaming::EventPublisher;

// Re-export test utilities for tests and downstream crates using test-utils feature
#[cfg(any(test, feature = "test-utils"))]
pub use cache::mocks::MockHotStateStore;
#[cfg(any(test, feature = "test-utils"))]
pub use clock::FakeClock;
#[cfg(any(test, feature = "test-utils"))]
pub use streaming::mocks::MockEventPublisher;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_ports_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        fn check_porter_store<T: PorterStore>() {
            assert_send_sync::<T>();
        }
        fn check_job_offer_store<T: JobOfferStore>() {
            assert_send_sync::<T>();
        }
        fn check_earnings_store<T: EarningsStore>() {
            assert_send_sync::<T>();
        }
        fn check_idempotency_store<T: IdempotencyStore>() {
            assert_send_sync::<T>();
        }
        fn check_location_snapshot_store<T: LocationSnapshotStore>() {
            assert_send_sync::<T>();
        }
        fn check_event_publisher<T: EventPublisher>() {
            assert_send_sync::<T>();
        }
        fn check_hot_state_store<T: HotStateStore>() {
            assert_send_sync::<T>();
        }
        fn check_clock<T: Clock>() {
            assert_send_sync::<T>();
        }
    }
}
