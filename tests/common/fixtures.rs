//! Test fixtures for integration tests.

use sqlx::PgPool;
use testcontainers::ContainerAsync;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;

use porter_dispatch_core::store::PostgresStore;

use super::containers::{build_connection_string, image};

/// A test database instance with pool and container.
///
/// The container is kept alive as long as this struct exists. When dropped,
/// the container is automatically stopped.
pub struct TestDb {
    /// The connection pool to the test database.
    pub pool: PgPool,
    /// The `PostgresStore` wrapping the pool.
    pub store: PostgresStore,
    /// The container (kept alive for the duration of the test).
    _container: ContainerAsync<Postgres>,
}

impl TestDb {
    /// Start a fresh Postgres container, connect, and apply migrations.
    ///
    /// # Panics
    ///
    /// Panics if container startup, connection, or migrations fail.
    pub async fn new() -> Self {
        let container = image().start().await.expect("failed to start postgres container");

        let host = container.get_host().await.expect("failed to get host");
        let port = container.get_host_port_ipv4(5432).await.expect("failed to get port");
        let connection_string = build_connection_string(&host.to_string(), port);

        let pool = connect_with_retries(&connection_string, 30)
            .await
            .expect("failed to connect to database");

        let store = PostgresStore::new(pool.clone());
        store.run_migrations().await.expect("failed to run migrations");

        Self { pool, store, _container: container }
    }
}

/// Connect with retries: the container's "ready" log line can precede the
/// point where it actually accepts connections by a few hundred ms.
async fn connect_with_retries(url: &str, max_attempts: u32) -> Result<PgPool, sqlx::Error> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match PgPool::connect(url).await {
            Ok(pool) => match sqlx::query("SELECT 1").execute(&pool).await {
                Ok(_) => return Ok(pool),
                Err(err) if attempts < max_attempts => {
                    tracing::debug!("connection verify failed (attempt {attempts}): {err}");
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                }
                Err(err) => return Err(err),
            },
            Err(err) if attempts < max_attempts => {
                tracing::debug!("connection failed (attempt {attempts}): {err}");
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Fixtures for `PorterProfile` rows.
pub mod porter_fixtures {
    use chrono::Utc;

    use porter_dispatch_core::types::entities::PorterProfile;
    use porter_dispatch_core::types::enums::VerificationStatus;
    use porter_dispatch_core::types::primitives::{AmountMinorUnits, PorterId, UserId};

    /// A verified, unsuspended porter ready to receive offers.
    #[must_use]
    pub fn verified_porter() -> PorterProfile {
        let now = Utc::now();
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
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fixtures for `JobOffer` rows.
pub mod offer_fixtures {
    use chrono::{DateTime, Duration, Utc};

    use porter_dispatch_core::types::entities::JobOffer;
    use porter_dispatch_core::types::enums::{AssignmentStatus, OfferStatus};
    use porter_dispatch_core::types::primitives::{OfferId, OrderId, PorterId};

    /// A fresh PENDING offer for `porter_id` against `order_id`, expiring in
    /// `ttl` from now.
    #[must_use]
    pub fn pending_offer(order_id: OrderId, porter_id: PorterId, ttl: Duration) -> JobOffer {
        let now = Utc::now();
        JobOffer {
            id: OfferId::new(),
            order_id,
            porter_id,
            offer_status: OfferStatus::Pending,
            assignment_status: AssignmentStatus::Pending,
            offered_at: now,
            expires_at: now + ttl,
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

    /// An already-expired offer, for boundary/expiry tests.
    #[must_use]
    pub fn expired_offer(order_id: OrderId, porter_id: PorterId) -> JobOffer {
        pending_offer(order_id, porter_id, Duration::milliseconds(-1))
    }

    /// Current time, exposed so tests can compute expiry windows consistently.
    #[must_use]
    pub fn now() -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixtures for `PorterEarning` rows.
pub mod earning_fixtures {
    use chrono::Utc;

    use porter_dispatch_core::types::entities::{Metadata, PorterEarning};
    use porter_dispatch_core::types::enums::{EarningStatus, EarningType};
    use porter_dispatch_core::types::primitives::{AmountMinorUnits, EarningId, PorterId};

    /// A CONFIRMED job-payment earning for `porter_id`.
    #[must_use]
    pub fn confirmed_earning(porter_id: PorterId, amount: i64) -> PorterEarning {
        PorterEarning {
            id: EarningId::new(),
            porter_id,
            earning_type: EarningType::JobPayment,
            amount: AmountMinorUnits::new(amount),
            status: EarningStatus::Confirmed,
            order_id: None,
            payout_id: None,
            payout_status: None,
            description: None,
            metadata: Metadata::empty(),
            created_at: Utc::now(),
            payout_at: None,
        }
    }
}
