//! Service layer — the application's use cases over the port traits.
//!
//! # Architecture
//!
//! Each service is a generic struct parameterized over the store port
//! trait(s) it needs (mirroring the teacher's `PositionHandler<S, C>`
//! shape), plus `Arc<dyn EventPublisher>` for publishing and a generic
//! [`crate::ports::Clock`] for deterministic tests. Services never depend
//! on a concrete adapter — production code wires [`crate::store::postgres::PostgresStore`]
//! and [`crate::store::cache::MemoryHotStore`] in; tests wire in-memory
//! doubles.
//!
//! No service parses or validates a bearer token: every mutating call
//! receives an already-resolved [`auth::AuthContext`] and runs it through
//! one of [`auth`]'s guards before touching a store.
//!
//! Idempotency (spec §4.3/§4.7) is a cross-cutting decorator, not a field
//! on every service — see [`idempotency::with_idempotency`].

pub mod auth;
pub mod availability;
pub mod earnings;
pub mod idempotency;
pub mod job_offer;
pub mod location;

#[cfg(test)]
mod test_support;

pub use auth::{AuthContext, authorize_admin, authorize_porter_owner};
pub use availability::AvailabilityService;
pub use earnings::{EarningsService, EarningsSummary};
pub use idempotency::with_idempotency;
pub use job_offer::{JobOfferService, JobOfferSettings};
pub use location::LocationService;
