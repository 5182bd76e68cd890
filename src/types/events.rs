//! Strongly-typed lifecycle events published by the Porter Dispatch Core.
//!
//! Each struct corresponds to one row of the event contract table in the
//! spec (§6). Events are published to the Event Bus partitioned by
//! `user_id`/`porter_id` so a single porter's events are observed in order
//! by any one consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entities::Metadata;
use super::primitives::{CorrelationId, GeoCoordinate, OfferId, OrderId, PayoutId, PorterId, UserId};

// ═══════════════════════════════════════════════════════════════════════════════
// UNIFIED EVENT ENUM
// ═══════════════════════════════════════════════════════════════════════════════

/// Unified enum for every event the core publishes.
///
/// # Serialization
///
/// Events are serialized with a type tag for deserialization:
/// ```json
/// {"PorterOnline": {"meta": {...}, "porter_id": "...", "location": null}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
#[non_exhaustive]
pub enum DispatchEvent {
    /// A new porter profile was created.
    PorterRegistered(PorterRegisteredEvent),
    /// A porter submitted for background verification.
    PorterVerificationRequested(PorterVerificationRequestedEvent),
    /// A porter passed background verification.
    PorterVerified(PorterVerifiedEvent),
    /// A porter failed background verification.
    PorterVerificationRejected(PorterVerificationRejectedEvent),
    /// A porter was suspended by an admin.
    PorterSuspended(PorterSuspendedEvent),
    /// A porter's suspension was lifted.
    PorterUnsuspended(PorterUnsuspendedEvent),
    /// A porter came online.
    PorterOnline(PorterOnlineEvent),
    /// A porter went offline.
    PorterOffline(PorterOfflineEvent),
    /// A porter's last-known location changed.
    PorterLocationUpdated(PorterLocationUpdatedEvent),
    /// A new job offer was created for a porter.
    PorterOfferCreated(PorterOfferCreatedEvent),
    /// A porter accepted a job offer.
    PorterAcceptedJob(PorterAcceptedJobEvent),
    /// A porter rejected a job offer.
    PorterRejectedJob(PorterRejectedJobEvent),
}

impl DispatchEvent {
    /// Metadata shared by every event variant.
    #[must_use]
    pub const fn metadata(&self) -> &EventMetadata {
        match self {
            Self::PorterRegistered(e) => &e.meta,
            Self::PorterVerificationRequested(e) => &e.meta,
            Self::PorterVerified(e) => &e.meta,
            Self::PorterVerificationRejected(e) => &e.meta,
            Self::PorterSuspended(e) => &e.meta,
            Self::PorterUnsuspended(e) => &e.meta,
            Self::PorterOnline(e) => &e.meta,
            Self::PorterOffline(e) => &e.meta,
            Self::PorterLocationUpdated(e) => &e.meta,
            Self::PorterOfferCreated(e) => &e.meta,
            Self::PorterAcceptedJob(e) => &e.meta,
            Self::PorterRejectedJob(e) => &e.meta,
        }
    }

    /// Event type name, used for logging/metrics and as a dispatch topic hint.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::PorterRegistered(_) => "PorterRegistered",
            Self::PorterVerificationRequested(_) => "PorterVerificationRequested",
            Self::PorterVerified(_) => "PorterVerified",
            Self::PorterVerificationRejected(_) => "PorterVerificationRejected",
            Self::PorterSuspended(_) => "PorterSuspended",
            Self::PorterUnsuspended(_) => "PorterUnsuspended",
            Self::PorterOnline(_) => "PorterOnline",
            Self::PorterOffline(_) => "PorterOffline",
            Self::PorterLocationUpdated(_) => "PorterLocationUpdated",
            Self::PorterOfferCreated(_) => "PorterOfferCreated",
            Self::PorterAcceptedJob(_) => "PorterAcceptedJob",
            Self::PorterRejectedJob(_) => "PorterRejectedJob",
        }
    }

    /// The partition key this event must be published under: `user_id` when
    /// known, otherwise `porter_id` (spec §5 per-key ordering guarantee).
    #[must_use]
    pub fn partition_key(&self) -> String {
        match self {
            Self::PorterRegistered(e) => e.user_id.to_string(),
            Self::PorterVerificationRequested(e) => e.porter_id.to_string(),
            Self::PorterVerified(e) => e.porter_id.to_string(),
            Self::PorterVerificationRejected(e) => e.porter_id.to_string(),
            Self::PorterSuspended(e) => e.porter_id.to_string(),
            Self::PorterUnsuspended(e) => e.porter_id.to_string(),
            Self::PorterOnline(e) => e.porter_id.to_string(),
            Self::PorterOffline(e) => e.porter_id.to_string(),
            Self::PorterLocationUpdated(e) => e.porter_id.to_string(),
            Self::PorterOfferCreated(e) => e.porter_id.to_string(),
            Self::PorterAcceptedJob(e) => e.porter_id.to_string(),
            Self::PorterRejectedJob(e) => e.porter_id.to_string(),
        }
    }
}

/// Metadata attached to every published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Request-scoped correlation id, propagated from the triggering call.
    pub correlation_id: CorrelationId,
    /// ISO-8601 timestamp of when the event occurred.
    pub occurred_at: DateTime<Utc>,
}

impl EventMetadata {
    /// Build metadata stamped with the given correlation id at the given time.
    #[must_use]
    pub const fn new(correlation_id: CorrelationId, occurred_at: DateTime<Utc>) -> Self {
        Self { correlation_id, occurred_at }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIFECYCLE EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// A new porter profile was created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterRegisteredEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// Owning user account.
    pub user_id: UserId,
    /// Newly created porter profile.
    pub porter_id: PorterId,
    /// Vehicle category supplied at registration.
    pub vehicle_type: String,
}

/// A porter was submitted for background verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterVerificationRequestedEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The porter under review.
    pub porter_id: PorterId,
}

/// A porter passed background verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterVerifiedEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The porter verified.
    pub porter_id: PorterId,
}

/// A porter failed background verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterVerificationRejectedEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The porter rejected.
    pub porter_id: PorterId,
    /// Reason given by the reviewer.
    pub reason: Option<String>,
}

/// A porter was suspended by an admin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterSuspendedEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The porter suspended.
    pub porter_id: PorterId,
    /// The admin/superadmin who made the call.
    pub by: UserId,
    /// Reason given for the suspension.
    pub reason: Option<String>,
}

/// A porter's suspension was lifted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterUnsuspendedEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The porter unsuspended.
    pub porter_id: PorterId,
    /// The admin/superadmin who made the call.
    pub by: UserId,
    /// Reason given, if any.
    pub reason: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// AVAILABILITY / LOCATION EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// A porter came online.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterOnlineEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The porter that came online.
    pub porter_id: PorterId,
    /// Coarse location supplied alongside the toggle, if any.
    pub location: Option<GeoCoordinate>,
}

/// A porter went offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterOfflineEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The porter that went offline.
    pub porter_id: PorterId,
    /// Coarse location at the time of the toggle, if any.
    pub location: Option<GeoCoordinate>,
}

/// A porter's last-known location changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterLocationUpdatedEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The porter whose location changed.
    pub porter_id: PorterId,
    /// Reported latitude.
    pub lat: f64,
    /// Reported longitude.
    pub lng: f64,
    /// Reported GPS accuracy in meters, if supplied.
    pub accuracy: Option<f64>,
    /// The order active at the time of the update, if any.
    pub order_id: Option<OrderId>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// OFFER EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// A new job offer was created for a porter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterOfferCreatedEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The newly created offer.
    pub offer_id: OfferId,
    /// The order this offer is for.
    pub order_id: OrderId,
    /// The porter this offer was extended to.
    pub porter_id: PorterId,
    /// When this offer auto-expires if unanswered.
    pub expires_at: DateTime<Utc>,
}

/// A porter accepted a job offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterAcceptedJobEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The accepted offer.
    pub offer_id: OfferId,
    /// The order now assigned.
    pub order_id: OrderId,
    /// The porter the order was assigned to.
    pub porter_id: PorterId,
}

/// A porter rejected a job offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PorterRejectedJobEvent {
    /// Event metadata.
    pub meta: EventMetadata,
    /// The rejected offer.
    pub offer_id: OfferId,
    /// The order that was declined.
    pub order_id: OrderId,
    /// The porter that declined.
    pub porter_id: PorterId,
    /// Reason given, if any.
    pub reason: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONSUMED EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Published upstream when an order dispatcher has selected a set of
/// candidate porters; carried here only for completeness of the consumed
/// event list (§6) — the core does not currently react to it, since offer
/// creation is driven by direct `createOffer` calls, not this event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAssignedEvent {
    /// The order being assigned.
    pub order_id: OrderId,
    /// Candidate porters selected by the upstream dispatcher.
    pub candidate_porter_ids: Vec<PorterId>,
}

/// Published upstream when an order has been delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCompletedEvent {
    /// The order that was completed.
    pub order_id: OrderId,
    /// The porter that completed it.
    pub porter_id: PorterId,
    /// When delivery was completed.
    pub completed_at: DateTime<Utc>,
    /// Amount to record as a `JOB_PAYMENT` earning, in minor units, if supplied by the event payload.
    pub amount: Option<super::primitives::AmountMinorUnits>,
    /// Schemaless metadata bag forwarded from the upstream event.
    pub metadata: Metadata,
}

/// Published upstream when a payout batch finishes processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPayoutProcessedEvent {
    /// The payout batch.
    pub payout_id: PayoutId,
    /// The porter the payout was for.
    pub porter_id: PorterId,
    /// Upstream payout status string (e.g. `"completed"`, `"failed"`).
    pub status: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> EventMetadata {
        EventMetadata::new(CorrelationId::new(), Utc::now())
    }

    #[test]
    fn dispatch_event_type_name() {
        let event = DispatchEvent::PorterOnline(PorterOnlineEvent {
            meta: sample_metadata(),
            porter_id: PorterId::new(),
            location: None,
        });
        assert_eq!(event.type_name(), "PorterOnline");
    }

    #[test]
    fn dispatch_event_partition_key_uses_porter_id() {
        let porter_id = PorterId::new();
        let event = DispatchEvent::PorterOffline(PorterOfflineEvent {
            meta: sample_metadata(),
            porter_id,
            location: None,
        });
        assert_eq!(event.partition_key(), porter_id.to_string());
    }

    #[test]
    fn dispatch_event_partition_key_uses_user_id_for_registration() {
        let user_id = UserId::new();
        let event = DispatchEvent::PorterRegistered(PorterRegisteredEvent {
            meta: sample_metadata(),
            user_id,
            porter_id: PorterId::new(),
            vehicle_type: "bike".into(),
        });
        assert_eq!(event.partition_key(), user_id.to_string());
    }

    #[test]
    fn dispatch_event_metadata_access() {
        let meta = sample_metadata();
        let event = DispatchEvent::PorterAcceptedJob(PorterAcceptedJobEvent {
            meta: meta.clone(),
            offer_id: OfferId::new(),
            order_id: OrderId::new(),
            porter_id: PorterId::new(),
        });
        assert_eq!(event.metadata().correlation_id, meta.correlation_id);
    }
}
