//! Periodic Scheduler (spec §4.5 / §2 `Periodic Scheduler`).
//!
//! A single background runner driving the three fixed-cadence maintenance
//! jobs: expiring stale offers, pruning old location history, and purging
//! expired idempotency records. Each job runs on its own `tokio::spawn`
//! loop built on `tokio::time::interval`, guarded by a
//! `tokio_util::sync::CancellationToken` for graceful shutdown — grounded
//! in the teacher's `RealtimeProcessor` keep-alive task
//! (`indexer/realtime_processor.rs`): an `interval` timer wrapped in a
//! `tokio::select!` against a cancellation signal, with failures logged
//! and the loop retried on the next tick rather than aborted.
//!
//! Concurrency: one worker per job, at-most-one execution per tick (spec
//! §4.5) — a tick that fires while the previous run of the *same* job is
//! still in flight simply waits, since each job's loop body is awaited to
//! completion before the next `tick()` resolves.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::ports::{Clock, HotStateStore, IdempotencyStore, JobOfferStore, LocationSnapshotStore, PorterStore};
use crate::services::{JobOfferService, LocationService};

/// Cadences for the three scheduled jobs, sourced from
/// [`crate::config::settings::DispatchSettings`].
#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    /// Cadence of the `expire-offers` job.
    pub expire_offers_interval: Duration,
    /// Cadence of the `cleanup-location-history` job.
    pub cleanup_location_history_interval: Duration,
    /// Cadence of the `cleanup-idempotency-records` job.
    pub cleanup_idempotency_interval: Duration,
    /// Location history older than this age is pruned on each
    /// `cleanup-location-history` tick.
    pub location_history_retention: chrono::Duration,
}

/// Runs the three spec §4.5 maintenance jobs on their own intervals.
///
/// Generic over every port the jobs touch, mirroring the service layer's
/// generic-over-ports convention.
pub struct Scheduler<J, H, L, P, I, C> {
    job_offer_service: Arc<JobOfferService<J, P, I, C>>,
    location_service: Arc<LocationService<H, L, P, C>>,
    idempotency_store: Arc<I>,
    clock: C,
    settings: SchedulerSettings,
}

impl<J, H, L, P, I, C> Scheduler<J, H, L, P, I, C>
where
    J: JobOfferStore + 'static,
    H: HotStateStore + 'static,
    L: LocationSnapshotStore + 'static,
    P: PorterStore + 'static,
    I: IdempotencyStore + 'static,
    C: Clock + Clone + 'static,
{
    /// Build a new scheduler over the given services and stores.
    pub const fn new(
        job_offer_service: Arc<JobOfferService<J, P, I, C>>,
        location_service: Arc<LocationService<H, L, P, C>>,
        idempotency_store: Arc<I>,
        clock: C,
        settings: SchedulerSettings,
    ) -> Self {
        Self { job_offer_service, location_service, idempotency_store, clock, settings }
    }

    /// Spawn the three job loops. Each returns its own join handle; the
    /// caller drives shutdown by cancelling `shutdown` and awaiting all
    /// three handles (spec §9's lifecycle: stop scheduler before draining
    /// in-flight requests).
    pub fn spawn(&self, shutdown: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.spawn_expire_offers(shutdown.clone()),
            self.spawn_cleanup_location_history(shutdown.clone()),
            self.spawn_cleanup_idempotency_records(shutdown),
        ]
    }

    fn spawn_expire_offers(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let job_offer_service = Arc::clone(&self.job_offer_service);
        let clock = self.clock.clone();
        let period = self.settings.expire_offers_interval;

        tokio::spawn(async move {
            run_job("expire-offers", period, shutdown, || {
                let job_offer_service = Arc::clone(&job_offer_service);
                let now = clock.now();
                async move { job_offer_service.expire_offers(now).await.map(|_| ()) }
            })
            .await;
        })
    }

    fn spawn_cleanup_location_history(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let location_service = Arc::clone(&self.location_service);
        let clock = self.clock.clone();
        let period = self.settings.cleanup_location_history_interval;
        let retention = self.settings.location_history_retention;

        tokio::spawn(async move {
            run_job("cleanup-location-history", period, shutdown, || {
                let location_service = Arc::clone(&location_service);
                let cutoff = clock.now() - retention;
                async move { location_service.cleanup_old_history(cutoff).await.map(|_| ()) }
            })
            .await;
        })
    }

    fn spawn_cleanup_idempotency_records(&self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        let idempotency_store = Arc::clone(&self.idempotency_store);
        let clock = self.clock.clone();
        let period = self.settings.cleanup_idempotency_interval;

        tokio::spawn(async move {
            run_job("cleanup-idempotency-records", period, shutdown, || {
                let idempotency_store = Arc::clone(&idempotency_store);
                let now = clock.now();
                async move { idempotency_store.delete_expired(now).await.map(|_| ()) }
            })
            .await;
        })
    }
}

/// Drive one named job on a fixed interval until `shutdown` fires.
///
/// Failures are logged and the next tick retries (spec §4.5: "Failures are
/// logged; next tick retries"); a failing tick never stops the loop or
/// propagates to the caller.
#[instrument(skip(shutdown, make_run))]
async fn run_job<F, Fut>(name: &'static str, period: Duration, shutdown: CancellationToken, make_run: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    info!(job = name, period_secs = period.as_secs(), "starting scheduled job");
    let mut ticker = interval(period);
    // The first tick fires immediately; skip it so the job's first real
    // run happens one period after startup, matching a freshly booted
    // service that hasn't accumulated any backlog yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!(job = name, "shutdown requested, stopping scheduled job");
                return;
            }
            _ = ticker.tick() => {
                if let Err(err) = make_run().await {
                    warn!(job = name, error = %err, "scheduled job tick failed, retrying next tick");
                }
            }
        }
    }
}
