//! Porter Dispatch Core — service entry point.
//!
//! Wires the durable store, hot-state cache, and event publisher into the
//! service layer, starts the periodic maintenance scheduler, and serves a
//! small observability surface (`/healthz`, `/metrics`). Domain request
//! handling is exposed as a library (see [`porter_dispatch_core::services`])
//! rather than a bound transport — the transport encoding is an external
//! collaborator's concern, not this core's.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use axum::routing::get;
use axum::Router;
use chrono::Duration as ChronoDuration;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use porter_dispatch_core::config::Settings;
use porter_dispatch_core::consumers::{OrderCompletedConsumer, PaymentPayoutProcessedConsumer};
use porter_dispatch_core::ports::{EventPublisher, SystemClock};
use porter_dispatch_core::scheduler::{Scheduler, SchedulerSettings};
use porter_dispatch_core::services::{
    AvailabilityService, EarningsService, JobOfferService, JobOfferSettings, LocationService,
};
use porter_dispatch_core::store::{MemoryHotStore, PostgresStore};
use porter_dispatch_core::streaming::IggyPublisher;

#[derive(Parser, Debug)]
#[command(name = "porter-dispatch-core")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Environment name, selects `config/{environment}.toml` as an overlay.
    #[arg(short, long, env = "APP_ENV", default_value = "development")]
    environment: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the dispatch core: apply migrations, then serve until shutdown.
    Run,

    /// Apply pending database migrations and exit.
    Migrate,

    /// Print version information.
    Version,
}

fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            println!("porter-dispatch-core {}", porter_dispatch_core::VERSION);
            return Ok(());
        }
        Commands::Migrate => {
            let settings = load_settings(&cli.environment)?;
            init_tracing(&settings.logging);
            return tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(run_migrations(&settings));
        }
        Commands::Run => {
            let settings = load_settings(&cli.environment)?;
            init_tracing(&settings.logging);
            return tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(run(settings));
        }
    }
}

fn load_settings(environment: &str) -> eyre::Result<Settings> {
    let settings = Settings::load(environment)?;
    if let Err(errors) = settings.validate() {
        for err in &errors {
            error!(error = %err, "invalid configuration");
        }
        eyre::bail!("configuration validation failed with {} error(s)", errors.len());
    }
    Ok(settings)
}

fn init_tracing(logging: &porter_dispatch_core::config::LoggingSettings) {
    let env_filter = tracing_subscriber::EnvFilter::try_new(&logging.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt().with_env_filter(env_filter);
    if logging.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn run_migrations(settings: &Settings) -> eyre::Result<()> {
    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .min_connections(settings.database.min_connections)
        .acquire_timeout(settings.database.connect_timeout())
        .idle_timeout(settings.database.idle_timeout())
        .connect(&settings.database.url)
        .await?;
    let store = PostgresStore::new(pool);
    store.run_migrations().await?;
    info!("migrations applied");
    Ok(())
}

async fn run(settings: Settings) -> eyre::Result<()> {
    info!(version = porter_dispatch_core::VERSION, "starting porter-dispatch-core");

    let pool = PgPoolOptions::new()
        .max_connections(settings.database.max_connections)
        .min_connections(settings.database.min_connections)
        .acquire_timeout(settings.database.connect_timeout())
        .idle_timeout(settings.database.idle_timeout())
        .connect(&settings.database.url)
        .await?;
    let durable_store = Arc::new(PostgresStore::new(pool));
    durable_store.run_migrations().await?;

    let hot_store = Arc::new(MemoryHotStore::new(
        settings.hot_store.availability_max_capacity,
        settings.hot_store.location_max_capacity,
        settings.dispatch.availability_state_ttl(),
    ));

    let publisher: Arc<dyn EventPublisher> = {
        let iggy = IggyPublisher::new(&settings.event_bus)?;
        if let Err(err) = iggy.connect().await {
            warn!(error = %err, "event bus unreachable at startup, will retry lazily on first publish");
        }
        Arc::new(iggy)
    };

    let clock = SystemClock::new();

    let job_offer_settings = JobOfferSettings {
        offer_timeout: ChronoDuration::seconds(settings.dispatch.offer_timeout_seconds as i64),
        max_concurrent_offers_per_porter: settings.dispatch.max_concurrent_offers_per_porter,
        idempotency_record_ttl: ChronoDuration::hours(settings.dispatch.idempotency_record_ttl_hours as i64),
    };

    let availability_service = Arc::new(AvailabilityService::new(
        Arc::clone(&hot_store),
        Arc::clone(&durable_store),
        Arc::clone(&publisher),
        clock.clone(),
    ));
    let location_service = Arc::new(LocationService::new(
        Arc::clone(&hot_store),
        Arc::clone(&durable_store),
        Arc::clone(&durable_store),
        Arc::clone(&publisher),
        clock.clone(),
        ChronoDuration::seconds(settings.dispatch.location_snapshot_interval_seconds as i64),
        settings.dispatch.location_update_rate_per_second,
    ));
    let job_offer_service = Arc::new(JobOfferService::new(
        Arc::clone(&durable_store),
        Arc::clone(&durable_store),
        Arc::clone(&durable_store),
        Arc::clone(&publisher),
        clock.clone(),
        job_offer_settings,
    ));
    let earnings_service = Arc::new(EarningsService::new(
        Arc::clone(&durable_store),
        Arc::clone(&durable_store),
        Arc::clone(&durable_store),
        clock.clone(),
        ChronoDuration::hours(settings.dispatch.idempotency_record_ttl_hours as i64),
    ));

    // Wired for completeness (spec §4.6); invoking them is the responsibility
    // of whatever transport adapter subscribes to the upstream order/payment
    // events, which is outside this core's scope.
    let _order_completed_consumer = OrderCompletedConsumer::new(
        Arc::clone(&job_offer_service),
        Arc::clone(&earnings_service),
        Arc::clone(&durable_store),
    );
    let _payment_payout_consumer =
        PaymentPayoutProcessedConsumer::new(Arc::clone(&earnings_service), clock.clone());

    let scheduler = Scheduler::new(
        Arc::clone(&job_offer_service),
        Arc::clone(&location_service),
        Arc::clone(&durable_store),
        clock.clone(),
        SchedulerSettings {
            expire_offers_interval: StdDuration::from_secs(
                settings.dispatch.expire_offers_interval_seconds,
            ),
            cleanup_location_history_interval: StdDuration::from_secs(
                settings.dispatch.cleanup_location_history_interval_seconds,
            ),
            cleanup_idempotency_interval: StdDuration::from_secs(
                settings.dispatch.cleanup_idempotency_interval_seconds,
            ),
            location_history_retention: ChronoDuration::days(
                i64::from(settings.dispatch.location_history_retention_days),
            ),
        },
    );

    let shutdown = CancellationToken::new();
    let scheduler_handles = scheduler.spawn(shutdown.clone());

    let metrics_handle = if settings.metrics.enabled {
        Some(spawn_metrics_server(&settings.metrics).await?)
    } else {
        None
    };

    info!("porter-dispatch-core is running, awaiting shutdown signal");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping scheduled jobs");

    shutdown.cancel();
    for handle in scheduler_handles {
        if let Err(err) = handle.await {
            error!(error = %err, "scheduled job task panicked during shutdown");
        }
    }

    if let Err(err) = publisher.flush().await {
        warn!(error = %err, "failed to flush event publisher during shutdown");
    }

    if let Some(handle) = metrics_handle {
        handle.abort();
    }

    durable_store.pool().close().await;
    info!("porter-dispatch-core shut down cleanly");
    Ok(())
}

/// Serves Prometheus metrics and a liveness probe on `metrics.host:port`
/// (spec's ambient observability surface; not part of the domain API).
async fn spawn_metrics_server(
    settings: &porter_dispatch_core::config::MetricsSettings,
) -> eyre::Result<tokio::task::JoinHandle<()>> {
    let recorder_handle = PrometheusBuilder::new().install_recorder()?;

    let app = Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/metrics", get(move || { let handle = recorder_handle.clone(); async move { handle.render() } }));

    let addr: SocketAddr = format!("{}:{}", settings.host, settings.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "metrics server listening");

    Ok(tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "metrics server terminated unexpectedly");
        }
    }))
}
