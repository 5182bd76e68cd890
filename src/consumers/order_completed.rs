//! Consumer for the upstream `OrderCompleted` event (spec §4.6).
//!
//! On delivery: look up the ACCEPTED offer for `(orderId, porterId)`; if
//! found, record a `JOB_PAYMENT` earning and bump the porter's
//! completed-job counter. Idempotent by `(orderId, porterId,
//! type=JOB_PAYMENT)` — a redelivered event is a no-op once the earning
//! already exists.

use std::sync::Arc;

use tracing::warn;

use crate::error::Result;
use crate::ports::{Clock, EarningsStore, EventPublisher, IdempotencyStore, JobOfferStore, PorterStore};
use crate::services::{EarningsService, JobOfferService};
use crate::types::entities::{Metadata, PorterEarning};
use crate::types::enums::{EarningStatus, EarningType, OfferStatus};
use crate::types::events::OrderCompletedEvent;
use crate::types::primitives::EarningId;

/// Applies `OrderCompleted` events against the offer and earnings state.
///
/// Generic over the job-offer store (`J`), the earnings store (`E`), the
/// porter store (`P`), the idempotency store (`I`), and a [`Clock`] (`C`) —
/// the same port set [`JobOfferService`] and [`EarningsService`] already
/// require, since this consumer is only ever a caller of those two services.
#[derive(Debug)]
pub struct OrderCompletedConsumer<J, E, P, I, C> {
    job_offer_service: Arc<JobOfferService<J, P, I, C>>,
    earnings_service: Arc<EarningsService<E, P, I, C>>,
    porter_store: Arc<P>,
}

impl<J, E, P, I, C> OrderCompletedConsumer<J, E, P, I, C>
where
    J: JobOfferStore,
    E: EarningsStore,
    P: PorterStore,
    I: IdempotencyStore,
    C: Clock,
{
    /// Build a new consumer over the given services.
    pub const fn new(
        job_offer_service: Arc<JobOfferService<J, P, I, C>>,
        earnings_service: Arc<EarningsService<E, P, I, C>>,
        porter_store: Arc<P>,
    ) -> Self {
        Self { job_offer_service, earnings_service, porter_store }
    }

    /// Handle one `OrderCompleted` delivery. Safe to call more than once
    /// for the same event.
    ///
    /// # Errors
    ///
    /// Propagates store errors from the underlying services.
    pub async fn handle(&self, event: OrderCompletedEvent) -> Result<()> {
        let accepted_offer = self
            .job_offer_service
            .get_order_offers(event.order_id)
            .await?
            .into_iter()
            .find(|offer| offer.porter_id == event.porter_id && offer.offer_status == OfferStatus::Accepted);

        let Some(_offer) = accepted_offer else {
            warn!(
                order_id = %event.order_id,
                porter_id = %event.porter_id,
                "OrderCompleted for an order with no accepted offer for this porter, ignoring"
            );
            return Ok(());
        };

        let already_recorded = self
            .earnings_service
            .order_earnings(event.order_id)
            .await?
            .into_iter()
            .any(|earning| {
                earning.porter_id == event.porter_id && earning.earning_type == EarningType::JobPayment
            });

        if already_recorded {
            return Ok(());
        }

        let earning = PorterEarning {
            id: EarningId::new(),
            porter_id: event.porter_id,
            earning_type: EarningType::JobPayment,
            amount: event.amount.unwrap_or(crate::types::primitives::AmountMinorUnits::ZERO),
            status: EarningStatus::Pending,
            order_id: Some(event.order_id),
            payout_id: None,
            payout_status: None,
            description: Some("job payment".into()),
            metadata: event.metadata,
            created_at: event.completed_at,
            payout_at: None,
        };

        self.earnings_service.record_earnings(earning).await?;
        self.porter_store.increment_completed_jobs(event.porter_id).await?;

        Ok(())
    }
}
