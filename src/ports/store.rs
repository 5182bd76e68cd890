//! Storage port traits for data persistence.
//!
//! These traits define the contract for persisting and retrieving
//! domain entities. Infrastructure adapters implement these traits
//! using concrete storage backends (e.g., `PostgreSQL`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::entities::{
    IdempotencyRecord, JobOffer, LocationSnapshot, PorterEarning, PorterProfile,
    VerificationHistory,
};
use crate::types::enums::VerificationStatus;
use crate::types::primitives::{
    AmountMinorUnits, EarningId, IdempotencyKey, OfferId, OrderId, PorterId, UserId,
};

// ═══════════════════════════════════════════════════════════════════════════════
// PORTER STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for porter profile persistence.
///
/// # Implementation Notes
///
/// Implementations should:
/// - Index on `user_id` for fast principal-to-profile lookups
/// - Treat `verification_status` transitions as append-only (paired with
///   [`VerificationHistory`] records)
#[async_trait]
pub trait PorterStore: Send + Sync {
    /// Get a porter profile by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_by_id(&self, id: PorterId) -> Result<Option<PorterProfile>>;

    /// Get a porter profile by its owning user id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_by_user_id(&self, user_id: UserId) -> Result<Option<PorterProfile>>;

    /// Get every profile in `ids` that exists, in unspecified order.
    ///
    /// Backs the Durable Store join in
    /// [`crate::services::location::LocationService::find_nearby_porters`]
    /// (spec §4.2: nearby results are filtered to only VERIFIED,
    /// non-suspended porters).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_by_ids(&self, ids: &[PorterId]) -> Result<Vec<PorterProfile>>;

    /// Save a new profile or update an existing one (upsert semantics).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn save(&self, profile: &PorterProfile) -> Result<()>;

    /// Transition a porter's verification status and record the transition
    /// atomically in a single durable-store call.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile doesn't exist or the write fails.
    async fn transition_verification(
        &self,
        porter_id: PorterId,
        to: VerificationStatus,
        reviewer_user_id: Option<UserId>,
        notes: Option<String>,
    ) -> Result<PorterProfile>;

    /// Get the verification history for a porter, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn verification_history(&self, porter_id: PorterId) -> Result<Vec<VerificationHistory>>;

    /// Suspend or unsuspend a porter.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile doesn't exist or the write fails.
    async fn set_suspended(
        &self,
        porter_id: PorterId,
        suspended: bool,
        reason: Option<String>,
    ) -> Result<PorterProfile>;

    /// Atomically add `amount` to the porter's `lifetime_earnings` aggregate.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::PorterNotFound`] if the profile
    /// doesn't exist, or an error if the write fails.
    async fn increment_lifetime_earnings(
        &self,
        porter_id: PorterId,
        amount: AmountMinorUnits,
    ) -> Result<PorterProfile>;

    /// Atomically increment the porter's `completed_jobs_count` by one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::PorterNotFound`] if the profile
    /// doesn't exist, or an error if the write fails.
    async fn increment_completed_jobs(&self, porter_id: PorterId) -> Result<PorterProfile>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOB OFFER STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for job offer persistence, including the race-free accept path.
///
/// # Implementation Notes
///
/// `accept` MUST run the entire spec §4.3 accept protocol (steps 2-6) in a
/// single serializable transaction: ownership/state checks, sibling-offer
/// discovery, and the terminal-state writes for both the winner and every
/// sibling offer. Partial application of these steps under concurrent
/// accept attempts is the exact race this store exists to prevent.
#[async_trait]
pub trait JobOfferStore: Send + Sync {
    /// Create a new PENDING offer.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn create(&self, offer: &JobOffer) -> Result<()>;

    /// Get an offer by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_by_id(&self, id: OfferId) -> Result<Option<JobOffer>>;

    /// Count PENDING offers currently open for a porter.
    ///
    /// Used to enforce `maxConcurrentOffersPerPorter` (spec §4.3 step 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn count_pending_for_porter(&self, porter_id: PorterId) -> Result<u32>;

    /// List every PENDING offer for an order other than `exclude`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn list_pending_siblings(
        &self,
        order_id: OrderId,
        exclude: OfferId,
    ) -> Result<Vec<JobOffer>>;

    /// Atomically accept `offer_id` on behalf of `porter_id`, revoking every
    /// sibling PENDING offer for the same order in the same transaction.
    ///
    /// Returns the accepted offer and the ids of revoked sibling offers.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::OfferNotFound`] if the offer
    /// doesn't exist, [`crate::error::DomainError::OfferNotOwnedByPorter`]
    /// if `porter_id` doesn't own it, [`crate::error::DomainError::OfferExpired`]
    /// if `now` is past `expires_at`, or
    /// [`crate::error::DomainError::InvalidStateTransition`] if the offer is
    /// no longer PENDING.
    async fn accept(
        &self,
        offer_id: OfferId,
        porter_id: PorterId,
        now: DateTime<Utc>,
    ) -> Result<(JobOffer, Vec<OfferId>)>;

    /// Reject an offer on behalf of the porter that holds it.
    ///
    /// # Errors
    ///
    /// Returns the same domain errors as [`Self::accept`], minus sibling
    /// revocation (rejection has no effect on sibling offers).
    async fn reject(
        &self,
        offer_id: OfferId,
        porter_id: PorterId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<JobOffer>;

    /// Expire every PENDING offer whose `expires_at` has passed.
    ///
    /// Called by the `expire-offers` scheduled job (spec §4.6). Returns the
    /// expired offers so the caller can publish lifecycle events for each.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<JobOffer>>;

    /// List offers for a porter, most recent first, optionally filtered to
    /// a single [`crate::types::enums::OfferStatus`].
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn list_for_porter(
        &self,
        porter_id: PorterId,
        status: Option<crate::types::enums::OfferStatus>,
    ) -> Result<Vec<JobOffer>>;

    /// List every offer (any status) created for an order, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_order_offers(&self, order_id: OrderId) -> Result<Vec<JobOffer>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// EARNINGS STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for porter earnings and payout persistence.
#[async_trait]
pub trait EarningsStore: Send + Sync {
    /// Record a new earning (job payment, tip, bonus, or adjustment).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn record(&self, earning: &PorterEarning) -> Result<()>;

    /// Get a porter's confirmed-available balance: the sum of CONFIRMED
    /// earnings not yet attached to a payout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn confirmed_balance(&self, porter_id: PorterId) -> Result<AmountMinorUnits>;

    /// Get a porter's pending balance: the sum of PENDING-status earnings,
    /// excluding pending withdrawal requests (negative PENDING `ADJUSTMENT`
    /// rows), which are a claim against `confirmed_balance`, not an accrual
    /// awaiting confirmation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn pending_balance(&self, porter_id: PorterId) -> Result<AmountMinorUnits>;

    /// Get a porter's gross lifetime earnings total: the sum of all
    /// `CONFIRMED`, `PENDING`, and `PAID_OUT` earnings, excluding negative
    /// `ADJUSTMENT` rows (withdrawal requests, which reduce what's
    /// available, not what was earned) and `CANCELLED` rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn total_earnings(&self, porter_id: PorterId) -> Result<AmountMinorUnits>;

    /// List earnings for a porter, most recent first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn list_for_porter(&self, porter_id: PorterId, limit: u32) -> Result<Vec<PorterEarning>>;

    /// Get a single earning by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get_by_id(&self, id: EarningId) -> Result<Option<PorterEarning>>;

    /// List every earning recorded against an order (spec §4.4
    /// `orderEarnings`). Also backs the `OrderCompleted` consumer's
    /// idempotency check (spec §4.6: "Idempotent by `(orderId, porterId,
    /// type=JOB_PAYMENT)`").
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<PorterEarning>>;

    /// Transition a single earning's status (spec §4.4
    /// `updateEarningStatus`): `PENDING`→`CONFIRMED`, `CONFIRMED`→`PAID_OUT`
    /// (stamping `payout_at`), or either →`CANCELLED`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::EarningNotFound`] if the earning
    /// doesn't exist, or
    /// [`crate::error::DomainError::InvalidStateTransition`] if `to` is not
    /// reachable from the earning's current status.
    async fn update_status(
        &self,
        earning_id: EarningId,
        to: crate::types::enums::EarningStatus,
        payout_id: Option<crate::types::primitives::PayoutId>,
        payout_status: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PorterEarning>;

    /// Attach a batch of CONFIRMED earnings to a payout, moving them to
    /// `PAID_OUT` atomically.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::InsufficientConfirmedBalance`]
    /// if the requested amount exceeds the confirmed balance.
    async fn settle_payout(
        &self,
        porter_id: PorterId,
        amount: AmountMinorUnits,
        payout_id: crate::types::primitives::PayoutId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PorterEarning>>;

    /// Atomically check the confirmed-available balance and record a
    /// withdrawal request as a negative `Adjustment` row with `PENDING`
    /// status, in a single transaction.
    ///
    /// Implementations MUST compute the balance check (spec §4.4's
    /// Σ(CONFIRMED) − Σ(PENDING withdrawal adjustments)) and the insert
    /// inside the same transaction, holding a row lock over the
    /// contributing rows, so concurrent withdrawal requests for the same
    /// porter cannot both observe sufficient funds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::InsufficientConfirmedBalance`]
    /// if `amount` exceeds the confirmed balance.
    async fn request_withdrawal(
        &self,
        porter_id: PorterId,
        amount: AmountMinorUnits,
        now: DateTime<Utc>,
    ) -> Result<PorterEarning>;

    /// Bulk-apply an upstream payout result (spec §4.6
    /// `PaymentPayoutProcessed`) to every earning tagged with `payout_id`:
    /// `CONFIRMED`→`PAID_OUT` (stamping `payout_at`) when `completed` is
    /// `true`. Always records `payout_status` for observability regardless
    /// of outcome. Returns the number of rows transitioned to `PAID_OUT`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn apply_payout_result(
        &self,
        payout_id: crate::types::primitives::PayoutId,
        payout_status: String,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<u64>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// IDEMPOTENCY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for the idempotency-record durable store (spec §4.7).
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Look up a previously recorded response for `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>>;

    /// Record a response for `key`, failing if a different user or
    /// operation already claimed it.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::IdempotencyKeyConflict`] if the
    /// key was already recorded for a different `user_id`/`operation` pair.
    async fn put(&self, record: &IdempotencyRecord) -> Result<()>;

    /// Delete every record whose `expires_at` has passed.
    ///
    /// Returns the number of records deleted. Called by the
    /// `cleanup-idempotency-records` scheduled job.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATION SNAPSHOT STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for durable location-history persistence (spec §4.2).
///
/// Distinct from the hot-state "last known location" served out of the
/// [`crate::ports::HotStateStore`] — this store holds the append-only
/// snapshot history used for auditing and retroactive route reconstruction.
#[async_trait]
pub trait LocationSnapshotStore: Send + Sync {
    /// Persist a location snapshot.
    ///
    /// Implementations should only be called at most once per
    /// `locationSnapshotIntervalSeconds` per porter; rate limiting the
    /// call site is the caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn save(&self, snapshot: &LocationSnapshot) -> Result<()>;

    /// Delete snapshots older than `cutoff`.
    ///
    /// Returns the number of rows deleted. Called by the
    /// `cleanup-location-history` scheduled job.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// List snapshots for a porter, most recent first, optionally filtered
    /// to a single order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    async fn list_for_porter(
        &self,
        porter_id: PorterId,
        order_id: Option<OrderId>,
        limit: u32,
    ) -> Result<Vec<LocationSnapshot>>;
}
