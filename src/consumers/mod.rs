//! Event Consumers (spec §4.6 / §2 `Event Consumers`).
//!
//! Dispatch Core doesn't own order assignment, pricing, or payout
//! settlement — it only reacts to their outcomes. Each consumed event gets
//! its own `async_trait` port, grounded in the teacher's `handlers/traits.rs`
//! one-port-per-event-family convention (`PositionPort`, `ScanPort`,
//! `DeathPort`). Unlike the teacher's handlers, which depend on concrete
//! stores, these depend only on the service layer (`JobOfferService`,
//! `EarningsService`) — consumers are just another caller of the same
//! public API a porter-facing edge would use.
//!
//! Both consumed events must tolerate redelivery (spec §4.6: "handlers are
//! idempotent"). Neither event carries a client-supplied idempotency key,
//! so idempotency here is structural rather than the
//! [`crate::services::idempotency::with_idempotency`] decorator: each
//! handler checks durable state for prior application before writing.

pub mod order_completed;
pub mod payment_payout_processed;

pub use order_completed::OrderCompletedConsumer;
pub use payment_payout_processed::PaymentPayoutProcessedConsumer;
