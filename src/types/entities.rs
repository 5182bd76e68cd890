//! Domain entities for database persistence.
//!
//! These structs represent the application's core domain objects that are
//! persisted to the durable store or held in the hot-state store. They
//! differ from events in that they represent current state rather than
//! historical occurrences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::enums::{AssignmentStatus, EarningStatus, EarningType, OfferStatus, VerificationStatus};
use super::primitives::{
    AmountMinorUnits, DeviceId, EarningId, GeoCoordinate, OfferId, OrderId, PayoutId, PorterId,
    UserId,
};

/// Schemaless metadata bag attached to events and earnings.
///
/// Carried as an opaque JSON blob per the spec's "dynamic payloads" design
/// note — implementations must not branch on its shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Metadata(serde_json::Value);

impl Metadata {
    /// The empty metadata bag (`{}`).
    #[must_use]
    pub fn empty() -> Self {
        Self(serde_json::json!({}))
    }

    /// Wrap an arbitrary JSON value.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Borrow the underlying JSON value.
    #[must_use]
    pub const fn as_json(&self) -> &serde_json::Value {
        &self.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PORTER PROFILE
// ═══════════════════════════════════════════════════════════════════════════════

/// A mobile worker eligible to receive job offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PorterProfile {
    /// Unique identifier.
    pub id: PorterId,
    /// Owning user account.
    pub user_id: UserId,
    /// Contact phone number (validated upstream by the auth collaborator).
    pub phone: String,
    /// Vehicle category (e.g. "bike", "car", "van"); free-form by design.
    pub vehicle_category: String,
    /// Background-verification state.
    pub verification_status: VerificationStatus,
    /// Whether the porter is currently suspended from receiving offers.
    pub suspended: bool,
    /// Reason for suspension, if any.
    pub suspension_reason: Option<String>,
    /// Count of jobs this porter has completed.
    pub completed_jobs_count: i64,
    /// Running total of confirmed lifetime earnings, in minor units.
    pub lifetime_earnings: AmountMinorUnits,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
    /// Last time any field on this profile changed.
    pub updated_at: DateTime<Utc>,
}

impl PorterProfile {
    /// Only verified, non-suspended porters may appear in nearby queries or
    /// receive offers (spec §3 `PorterProfile` invariant).
    #[must_use]
    pub const fn is_eligible_for_dispatch(&self) -> bool {
        matches!(self.verification_status, VerificationStatus::Verified) && !self.suspended
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOB OFFER
// ═══════════════════════════════════════════════════════════════════════════════

/// A time-bounded invitation for one porter to take one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOffer {
    /// Unique identifier.
    pub id: OfferId,
    /// The order this offer is for.
    pub order_id: OrderId,
    /// The porter this offer was extended to.
    pub porter_id: PorterId,
    /// Current lifecycle state.
    pub offer_status: OfferStatus,
    /// Post-acceptance assignment binding state.
    pub assignment_status: AssignmentStatus,
    /// When the offer was created.
    pub offered_at: DateTime<Utc>,
    /// When the offer auto-expires if unanswered.
    pub expires_at: DateTime<Utc>,
    /// When the porter accepted, if ever.
    pub accepted_at: Option<DateTime<Utc>>,
    /// When the order was bound to this offer, if ever (set alongside `accepted_at`).
    pub assigned_at: Option<DateTime<Utc>>,
    /// When the assignment was confirmed durable, if ever (set alongside `accepted_at`).
    pub confirmed_at: Option<DateTime<Utc>>,
    /// When the porter rejected, if ever.
    pub rejected_at: Option<DateTime<Utc>>,
    /// When the scheduler expired this offer, if ever.
    pub expired_at: Option<DateTime<Utc>>,
    /// When a sibling acceptance revoked this offer, if ever.
    pub revoked_at: Option<DateTime<Utc>>,
    /// Request-scoped correlation id propagated from `createOffer`.
    pub correlation_id: uuid::Uuid,
    /// Reason given for rejection, if any.
    pub rejection_reason: Option<String>,
    /// Reason recorded for revocation, if any.
    pub revoke_reason: Option<String>,
}

impl JobOffer {
    /// Whether this offer has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.offer_status.is_terminal()
    }

    /// Whether this offer is the one and only confirmed assignment for its
    /// order (the invariant P1 guards).
    #[must_use]
    pub const fn is_confirmed_assignment(&self) -> bool {
        matches!(self.offer_status, OfferStatus::Accepted)
            && matches!(self.assignment_status, AssignmentStatus::Confirmed)
    }

    /// Whether `now` is past this offer's expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AVAILABILITY STATE (hot)
// ═══════════════════════════════════════════════════════════════════════════════

/// Ephemeral, TTL-bounded online/offline state for a porter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityState {
    /// The porter this state belongs to.
    pub porter_id: PorterId,
    /// Whether the porter last reported themselves online.
    pub online: bool,
    /// Last time this state was refreshed (toggle or heartbeat).
    pub last_seen: DateTime<Utc>,
    /// Coarse location supplied alongside the toggle, if any.
    pub coarse_location: Option<GeoCoordinate>,
}

impl AvailabilityState {
    /// Online-set membership per the spec's P5 invariant: online and not
    /// past the TTL deadline.
    #[must_use]
    pub fn is_online_within(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.online && now - self.last_seen <= ttl
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LAST LOCATION (hot)
// ═══════════════════════════════════════════════════════════════════════════════

/// Ephemeral, TTL-bounded last-known location for a porter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastLocation {
    /// The porter this location belongs to.
    pub porter_id: PorterId,
    /// Last reported coordinate.
    pub coordinate: GeoCoordinate,
    /// Reported GPS accuracy in meters, if supplied by the client.
    pub accuracy_meters: Option<f64>,
    /// When this location was reported.
    pub timestamp: DateTime<Utc>,
    /// The order this location update is associated with, if any.
    pub order_id: Option<OrderId>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATION SNAPSHOT (durable)
// ═══════════════════════════════════════════════════════════════════════════════

/// A durable, periodic sample of a porter's location.
///
/// Append-only; at most one snapshot is inserted per porter per
/// `locationSnapshotIntervalSeconds` window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    /// Unique identifier.
    pub id: uuid::Uuid,
    /// The porter this snapshot belongs to.
    pub porter_id: PorterId,
    /// Sampled coordinate.
    pub coordinate: GeoCoordinate,
    /// The order active at sample time, if any.
    pub order_id: Option<OrderId>,
    /// When the sample was captured.
    pub captured_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PORTER EARNING
// ═══════════════════════════════════════════════════════════════════════════════

/// A single accrual or adjustment against a porter's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PorterEarning {
    /// Unique identifier.
    pub id: EarningId,
    /// The porter this earning accrues to.
    pub porter_id: PorterId,
    /// Category of this earning.
    pub earning_type: EarningType,
    /// Signed amount in minor units; negative for withdrawal-request adjustments.
    pub amount: AmountMinorUnits,
    /// Settlement state.
    pub status: EarningStatus,
    /// The order this earning resulted from, if any.
    pub order_id: Option<OrderId>,
    /// The payout batch this earning was swept into, if any.
    pub payout_id: Option<PayoutId>,
    /// Upstream payout status, mirrored from `PaymentPayoutProcessed`.
    pub payout_status: Option<String>,
    /// Free-text description for display.
    pub description: Option<String>,
    /// Schemaless metadata bag.
    pub metadata: Metadata,
    /// When this row was created.
    pub created_at: DateTime<Utc>,
    /// When this row was swept into a completed payout, if ever.
    pub payout_at: Option<DateTime<Utc>>,
}

impl PorterEarning {
    /// Whether this row is a withdrawal-request adjustment (negative amount,
    /// `Adjustment` type).
    #[must_use]
    pub const fn is_withdrawal_request(&self) -> bool {
        matches!(self.earning_type, EarningType::Adjustment) && self.amount.is_negative()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IDEMPOTENCY RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// Cached result of a previously executed mutating operation, keyed by a
/// client-supplied idempotency key scoped to a user and an operation name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    /// The idempotency key as supplied by the client.
    pub key: String,
    /// The user who first executed the operation under this key.
    pub user_id: UserId,
    /// Name of the operation this record is scoped to (e.g. `"acceptOffer"`).
    pub operation: String,
    /// Serialized response payload to replay on a cache hit.
    pub response_payload: serde_json::Value,
    /// When this record stops being honored.
    pub expires_at: DateTime<Utc>,
    /// When this record was first written.
    pub created_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VERIFICATION HISTORY
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only log entry recording one verification-status transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationHistory {
    /// Unique identifier.
    pub id: uuid::Uuid,
    /// The porter this entry is about.
    pub porter_id: PorterId,
    /// State transitioned away from.
    pub from_status: VerificationStatus,
    /// State transitioned to.
    pub to_status: VerificationStatus,
    /// The admin/superadmin user who made this decision, if a human call.
    pub reviewer_user_id: Option<UserId>,
    /// Free-text notes from the reviewer.
    pub notes: Option<String>,
    /// When this transition was recorded.
    pub recorded_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-28T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    mod porter_profile_tests {
        use super::*;

        fn sample() -> PorterProfile {
            PorterProfile {
                id: PorterId::new(),
                user_id: UserId::new(),
                phone: "+15555550100".into(),
                vehicle_category: "bike".into(),
                verification_status: VerificationStatus::Verified,
                suspended: false,
                suspension_reason: None,
                completed_jobs_count: 0,
                lifetime_earnings: AmountMinorUnits::ZERO,
                created_at: now(),
                updated_at: now(),
            }
        }

        #[test]
        fn verified_unsuspended_is_eligible() {
            assert!(sample().is_eligible_for_dispatch());
        }

        #[test]
        fn suspended_is_not_eligible() {
            let mut profile = sample();
            profile.suspended = true;
            assert!(!profile.is_eligible_for_dispatch());
        }

        #[test]
        fn unverified_is_not_eligible() {
            let mut profile = sample();
            profile.verification_status = VerificationStatus::UnderReview;
            assert!(!profile.is_eligible_for_dispatch());
        }
    }

    mod job_offer_tests {
        use super::*;

        fn sample() -> JobOffer {
            JobOffer {
                id: OfferId::new(),
                order_id: OrderId::new(),
                porter_id: PorterId::new(),
                offer_status: OfferStatus::Pending,
                assignment_status: AssignmentStatus::Pending,
                offered_at: now(),
                expires_at: now() + Duration::seconds(30),
                accepted_at: None,
                assigned_at: None,
                confirmed_at: None,
                rejected_at: None,
                expired_at: None,
                revoked_at: None,
                correlation_id: uuid::Uuid::now_v7(),
                rejection_reason: None,
                revoke_reason: None,
            }
        }

        #[test]
        fn pending_is_not_terminal() {
            assert!(!sample().is_terminal());
        }

        #[test]
        fn accepted_confirmed_is_confirmed_assignment() {
            let mut offer = sample();
            offer.offer_status = OfferStatus::Accepted;
            offer.assignment_status = AssignmentStatus::Confirmed;
            assert!(offer.is_confirmed_assignment());
        }

        #[test]
        fn accepted_without_confirmation_is_not_confirmed_assignment() {
            let mut offer = sample();
            offer.offer_status = OfferStatus::Accepted;
            assert!(!offer.is_confirmed_assignment());
        }

        #[test]
        fn expires_at_boundary() {
            let offer = sample();
            assert!(!offer.is_expired_at(offer.expires_at - Duration::milliseconds(1)));
            assert!(offer.is_expired_at(offer.expires_at + Duration::milliseconds(1)));
        }
    }

    mod availability_state_tests {
        use super::*;

        #[test]
        fn online_within_ttl_counts_as_member() {
            let state = AvailabilityState {
                porter_id: PorterId::new(),
                online: true,
                last_seen: now(),
                coarse_location: None,
            };
            assert!(state.is_online_within(now() + Duration::minutes(30), Duration::hours(1)));
        }

        #[test]
        fn online_past_ttl_is_not_a_member() {
            let state = AvailabilityState {
                porter_id: PorterId::new(),
                online: true,
                last_seen: now(),
                coarse_location: None,
            };
            assert!(!state.is_online_within(now() + Duration::hours(2), Duration::hours(1)));
        }

        #[test]
        fn offline_is_never_a_member() {
            let state = AvailabilityState {
                porter_id: PorterId::new(),
                online: false,
                last_seen: now(),
                coarse_location: None,
            };
            assert!(!state.is_online_within(now(), Duration::hours(1)));
        }
    }

    mod earning_tests {
        use super::*;

        #[test]
        fn negative_adjustment_is_withdrawal_request() {
            let earning = PorterEarning {
                id: EarningId::new(),
                porter_id: PorterId::new(),
                earning_type: EarningType::Adjustment,
                amount: AmountMinorUnits::new(-500),
                status: EarningStatus::Pending,
                order_id: None,
                payout_id: None,
                payout_status: None,
                description: None,
                metadata: Metadata::empty(),
                created_at: now(),
                payout_at: None,
            };
            assert!(earning.is_withdrawal_request());
        }

        #[test]
        fn positive_job_payment_is_not_withdrawal_request() {
            let earning = PorterEarning {
                id: EarningId::new(),
                porter_id: PorterId::new(),
                earning_type: EarningType::JobPayment,
                amount: AmountMinorUnits::new(500),
                status: EarningStatus::Pending,
                order_id: None,
                payout_id: None,
                payout_status: None,
                description: None,
                metadata: Metadata::empty(),
                created_at: now(),
                payout_at: None,
            };
            assert!(!earning.is_withdrawal_request());
        }
    }
}
