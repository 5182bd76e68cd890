//! Earnings service (spec §4.4 / §2 `EarningsService`).
//!
//! Records accrued earnings, answers balance/history queries, drives the
//! `updateEarningStatus` state machine, and guards withdrawal requests
//! against the confirmed-available balance. The balance/insert race for
//! withdrawals is closed inside [`EarningsStore::request_withdrawal`]'s
//! single transaction; this service's job is authorization, idempotency,
//! and event-free bookkeeping (earnings have no publish contract in the
//! spec's event table — only offers and lifecycle toggles do).

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{AppError, DomainError, Result};
use crate::ports::{Clock, EarningsStore, IdempotencyStore, PorterStore};
use crate::services::auth::{AuthContext, authorize_porter_owner};
use crate::services::idempotency::with_idempotency;
use crate::types::entities::PorterEarning;
use crate::types::enums::EarningStatus;
use crate::types::primitives::{
    AmountMinorUnits, EarningId, IdempotencyKey, OrderId, PayoutId, PorterId,
};

/// Summary of a porter's earnings standing (spec §4.4 `earningsSummary`:
/// `{total, pending, confirmed}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EarningsSummary {
    /// Gross lifetime earnings: Σ(CONFIRMED ∪ PENDING ∪ PAID_OUT), excluding
    /// withdrawal requests.
    pub total: AmountMinorUnits,
    /// Earnings recorded but not yet confirmed, excluding withdrawal requests.
    pub pending: AmountMinorUnits,
    /// Confirmed-available balance: Σ(CONFIRMED) − Σ(PENDING withdrawal adjustments).
    pub confirmed: AmountMinorUnits,
}

/// Records earnings and serves earnings/withdrawal queries.
///
/// Generic over the durable earnings store (`E`), the porter store (`P`,
/// for ownership checks), the idempotency store (`I`), and a [`Clock`] (`C`).
#[derive(Debug)]
pub struct EarningsService<E, P, I, C> {
    earnings_store: Arc<E>,
    porter_store: Arc<P>,
    idempotency_store: Arc<I>,
    clock: C,
    idempotency_record_ttl: chrono::Duration,
}

impl<E, P, I, C> EarningsService<E, P, I, C>
where
    E: EarningsStore,
    P: PorterStore,
    I: IdempotencyStore,
    C: Clock,
{
    /// Build a new earnings service over the given ports.
    pub fn new(
        earnings_store: Arc<E>,
        porter_store: Arc<P>,
        idempotency_store: Arc<I>,
        clock: C,
        idempotency_record_ttl: chrono::Duration,
    ) -> Self {
        Self { earnings_store, porter_store, idempotency_store, clock, idempotency_record_ttl }
    }

    /// Record a new earning (spec §4.4 `recordEarnings`) — always
    /// platform-initiated, never a porter-facing call, so no ownership
    /// check is performed here: the caller (an event consumer or admin
    /// action) is trusted to supply the right `porter_id`. Also bumps the
    /// porter's `lifetime_earnings` aggregate counter, per spec §4.4
    /// ("atomically increments the porter's aggregate counter"). The two
    /// writes land on different stores, so "atomic" here means
    /// "one unconditional follow-up write", not a shared transaction.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn record_earnings(&self, earning: PorterEarning) -> Result<PorterEarning> {
        self.earnings_store.record(&earning).await?;
        self.porter_store.increment_lifetime_earnings(earning.porter_id, earning.amount).await?;
        Ok(earning)
    }

    /// Get a porter's earnings summary (spec §4.4 `getEarningsSummary`).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Forbidden`] if `ctx` does not own `porter_id`.
    pub async fn earnings_summary(
        &self,
        ctx: &AuthContext,
        porter_id: PorterId,
    ) -> Result<EarningsSummary> {
        self.authorize(ctx, porter_id).await?;
        let total = self.earnings_store.total_earnings(porter_id).await?;
        let pending = self.earnings_store.pending_balance(porter_id).await?;
        let confirmed = self.earnings_store.confirmed_balance(porter_id).await?;
        Ok(EarningsSummary { total, pending, confirmed })
    }

    /// List a porter's recent earnings, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Forbidden`] if `ctx` does not own `porter_id`.
    pub async fn recent_earnings(
        &self,
        ctx: &AuthContext,
        porter_id: PorterId,
        limit: u32,
    ) -> Result<Vec<PorterEarning>> {
        self.authorize(ctx, porter_id).await?;
        self.earnings_store.list_for_porter(porter_id, limit).await
    }

    /// List every earning recorded against an order (spec §4.4
    /// `orderEarnings`). Platform-internal: no ownership check, since the
    /// caller (an event consumer reconciling an `OrderCompleted` event) has
    /// no single porter context to authorize against.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn order_earnings(&self, order_id: OrderId) -> Result<Vec<PorterEarning>> {
        self.earnings_store.list_for_order(order_id).await
    }

    /// Transition a single earning's status (spec §4.4 `updateEarningStatus`).
    ///
    /// Platform/admin operation, gated on [`crate::services::auth::authorize_admin`]
    /// at the caller's edge — this service trusts whatever `ctx` it's given
    /// the same way [`Self::record_earnings`] does.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::EarningNotFound`] or
    /// [`DomainError::InvalidStateTransition`] per the store's contract.
    pub async fn update_earning_status(
        &self,
        earning_id: EarningId,
        to: EarningStatus,
        payout_id: Option<PayoutId>,
        payout_status: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PorterEarning> {
        self.earnings_store
            .update_status(earning_id, to, payout_id, payout_status, now)
            .await
    }

    /// Request a withdrawal against the confirmed-available balance (spec
    /// §4.4 `requestWithdrawal`). Wrapped in idempotency since a retried
    /// withdrawal request must not double-debit the balance.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::InsufficientConfirmedBalance`] if `amount`
    /// exceeds the confirmed balance, or [`DomainError::Forbidden`] if
    /// `ctx` does not own `porter_id`.
    pub async fn request_withdrawal(
        &self,
        ctx: &AuthContext,
        porter_id: PorterId,
        amount: AmountMinorUnits,
        idempotency_key: &IdempotencyKey,
    ) -> Result<PorterEarning> {
        self.authorize(ctx, porter_id).await?;

        let earnings_store = Arc::clone(&self.earnings_store);
        let now = self.clock.now();

        with_idempotency(
            self.idempotency_store.as_ref(),
            &self.clock,
            self.idempotency_record_ttl,
            idempotency_key,
            ctx.user_id,
            "requestWithdrawal",
            async move { earnings_store.request_withdrawal(porter_id, amount, now).await },
        )
        .await
    }

    /// Apply an upstream payout result to every earning tagged with
    /// `payout_id` (spec §4.6 `PaymentPayoutProcessed` consumer). Returns
    /// the number of rows transitioned to `PAID_OUT`.
    ///
    /// # Errors
    ///
    /// Propagates store errors.
    pub async fn apply_payout_result(
        &self,
        payout_id: PayoutId,
        payout_status: String,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        self.earnings_store
            .apply_payout_result(payout_id, payout_status, completed, now)
            .await
    }

    async fn authorize(&self, ctx: &AuthContext, porter_id: PorterId) -> Result<()> {
        let profile = self
            .porter_store
            .get_by_id(porter_id)
            .await?
            .ok_or(AppError::Domain(DomainError::PorterNotFound(porter_id.to_string())))?;
        authorize_porter_owner(ctx, &profile)
    }
}
