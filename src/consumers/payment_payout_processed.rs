//! Consumer for the upstream `PaymentPayoutProcessed` event (spec §4.6).
//!
//! Bulk-applies a payout result to every earning tagged with `payoutId`:
//! `CONFIRMED` → `PAID_OUT` when the payout completed, with `payoutAt`
//! stamped; the payout status string is recorded regardless of outcome.
//! [`crate::ports::EarningsStore::apply_payout_result`] is a single
//! idempotent bulk `UPDATE` keyed by `payout_id`, so redelivery of the
//! same event is naturally a no-op past the first successful application.

use std::sync::Arc;

use crate::error::Result;
use crate::ports::{Clock, EarningsStore, IdempotencyStore, PorterStore};
use crate::services::EarningsService;
use crate::types::events::PaymentPayoutProcessedEvent;

/// Applies `PaymentPayoutProcessed` events to the earnings store.
///
/// Generic over the same port set as [`EarningsService`].
#[derive(Debug)]
pub struct PaymentPayoutProcessedConsumer<E, P, I, C> {
    earnings_service: Arc<EarningsService<E, P, I, C>>,
    clock: C,
}

impl<E, P, I, C> PaymentPayoutProcessedConsumer<E, P, I, C>
where
    E: EarningsStore,
    P: PorterStore,
    I: IdempotencyStore,
    C: Clock,
{
    /// Build a new consumer over the given earnings service.
    pub const fn new(earnings_service: Arc<EarningsService<E, P, I, C>>, clock: C) -> Self {
        Self { earnings_service, clock }
    }

    /// Handle one `PaymentPayoutProcessed` delivery. Safe to call more than
    /// once for the same event.
    ///
    /// # Errors
    ///
    /// Propagates store errors from the earnings service.
    pub async fn handle(&self, event: PaymentPayoutProcessedEvent) -> Result<()> {
        let completed = event.status.eq_ignore_ascii_case("completed");
        let now = self.clock.now();

        self.earnings_service
            .apply_payout_result(event.payout_id, event.status, completed, now)
            .await?;

        Ok(())
    }
}
