//! PostgreSQL implementation of the durable store ports using SQLx.
//!
//! # Type Conversions
//!
//! PostgreSQL uses signed integers for numeric columns while parts of the
//! domain use unsigned types. These casts are safe because counts and
//! durations in this domain never approach `i32`/`i64::MAX`.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless,
    clippy::use_self
)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction, postgres::PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::error::{AppError, DomainError, InfraError, Result};
use crate::ports::{EarningsStore, IdempotencyStore, JobOfferStore, LocationSnapshotStore, PorterStore};
use crate::types::entities::{
    IdempotencyRecord, JobOffer, LocationSnapshot, Metadata, PorterEarning, PorterProfile,
    VerificationHistory,
};
use crate::types::enums::{AssignmentStatus, EarningStatus, EarningType, OfferStatus, VerificationStatus};
use crate::types::primitives::{
    AmountMinorUnits, EarningId, IdempotencyKey, OfferId, OrderId, PayoutId, PorterId, UserId,
};

// ═══════════════════════════════════════════════════════════════════════════════
// POSTGRES STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// `PostgreSQL`-based durable store implementation.
///
/// Implements every durable-store port trait using SQLx for database access.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new `PostgreSQL` store with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| InfraError::Internal(format!("migration error: {e}")))?;
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PORTER STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, FromRow)]
struct PorterProfileRow {
    id: PorterId,
    user_id: UserId,
    phone: String,
    vehicle_category: String,
    verification_status: VerificationStatus,
    suspended: bool,
    suspension_reason: Option<String>,
    completed_jobs_count: i64,
    lifetime_earnings: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PorterProfileRow> for PorterProfile {
    fn from(row: PorterProfileRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            phone: row.phone,
            vehicle_category: row.vehicle_category,
            verification_status: row.verification_status,
            suspended: row.suspended,
            suspension_reason: row.suspension_reason,
            completed_jobs_count: row.completed_jobs_count,
            lifetime_earnings: AmountMinorUnits::new(row.lifetime_earnings),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VerificationHistoryRow {
    id: Uuid,
    porter_id: PorterId,
    from_status: VerificationStatus,
    to_status: VerificationStatus,
    reviewer_user_id: Option<UserId>,
    notes: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl From<VerificationHistoryRow> for VerificationHistory {
    fn from(row: VerificationHistoryRow) -> Self {
        Self {
            id: row.id,
            porter_id: row.porter_id,
            from_status: row.from_status,
            to_status: row.to_status,
            reviewer_user_id: row.reviewer_user_id,
            notes: row.notes,
            recorded_at: row.recorded_at,
        }
    }
}

const PORTER_PROFILE_COLUMNS: &str = "id, user_id, phone, vehicle_category, verification_status, \
     suspended, suspension_reason, completed_jobs_count, lifetime_earnings, created_at, updated_at";

#[async_trait]
impl PorterStore for PostgresStore {
    #[instrument(skip(self), fields(id = %id))]
    async fn get_by_id(&self, id: PorterId) -> Result<Option<PorterProfile>> {
        let row = sqlx::query_as::<_, PorterProfileRow>(&format!(
            "SELECT {PORTER_PROFILE_COLUMNS} FROM porter_profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), fields(user_id = %user_id))]
    async fn get_by_user_id(&self, user_id: UserId) -> Result<Option<PorterProfile>> {
        let row = sqlx::query_as::<_, PorterProfileRow>(&format!(
            "SELECT {PORTER_PROFILE_COLUMNS} FROM porter_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    async fn get_by_ids(&self, ids: &[PorterId]) -> Result<Vec<PorterProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, PorterProfileRow>(&format!(
            "SELECT {PORTER_PROFILE_COLUMNS} FROM porter_profiles WHERE id = ANY($1)"
        ))
        .bind(ids.iter().map(|id| id.as_uuid()).collect::<Vec<_>>())
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, profile), fields(id = %profile.id))]
    async fn save(&self, profile: &PorterProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO porter_profiles (
                id, user_id, phone, vehicle_category, verification_status,
                suspended, suspension_reason, completed_jobs_count, lifetime_earnings,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                phone = EXCLUDED.phone,
                vehicle_category = EXCLUDED.vehicle_category,
                verification_status = EXCLUDED.verification_status,
                suspended = EXCLUDED.suspended,
                suspension_reason = EXCLUDED.suspension_reason,
                completed_jobs_count = EXCLUDED.completed_jobs_count,
                lifetime_earnings = EXCLUDED.lifetime_earnings,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.id)
        .bind(profile.user_id)
        .bind(&profile.phone)
        .bind(&profile.vehicle_category)
        .bind(profile.verification_status)
        .bind(profile.suspended)
        .bind(&profile.suspension_reason)
        .bind(profile.completed_jobs_count)
        .bind(profile.lifetime_earnings.get())
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        debug!("porter profile saved");
        Ok(())
    }

    #[instrument(skip(self, notes), fields(porter_id = %porter_id, to = ?to))]
    async fn transition_verification(
        &self,
        porter_id: PorterId,
        to: VerificationStatus,
        reviewer_user_id: Option<UserId>,
        notes: Option<String>,
    ) -> Result<PorterProfile> {
        let mut tx = self.pool.begin().await.map_err(InfraError::Database)?;

        let current = sqlx::query_as::<_, PorterProfileRow>(&format!(
            "SELECT {PORTER_PROFILE_COLUMNS} FROM porter_profiles WHERE id = $1 FOR UPDATE"
        ))
        .bind(porter_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(InfraError::Database)?
        .ok_or_else(|| DomainError::PorterNotFound(porter_id.to_string()))?;

        let from = current.verification_status;

        sqlx::query(
            "UPDATE porter_profiles SET verification_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(porter_id)
        .bind(to)
        .execute(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        sqlx::query(
            r#"
            INSERT INTO verification_history (
                id, porter_id, from_status, to_status, reviewer_user_id, notes, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(porter_id)
        .bind(from)
        .bind(to)
        .bind(reviewer_user_id)
        .bind(&notes)
        .execute(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        let updated = sqlx::query_as::<_, PorterProfileRow>(&format!(
            "SELECT {PORTER_PROFILE_COLUMNS} FROM porter_profiles WHERE id = $1"
        ))
        .bind(porter_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        tx.commit().await.map_err(InfraError::Database)?;

        debug!(from = ?from, to = ?to, "verification status transitioned");
        Ok(updated.into())
    }

    #[instrument(skip(self), fields(porter_id = %porter_id))]
    async fn verification_history(&self, porter_id: PorterId) -> Result<Vec<VerificationHistory>> {
        let rows = sqlx::query_as::<_, VerificationHistoryRow>(
            r#"
            SELECT id, porter_id, from_status, to_status, reviewer_user_id, notes, recorded_at
            FROM verification_history
            WHERE porter_id = $1
            ORDER BY recorded_at DESC
            "#,
        )
        .bind(porter_id)
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, reason), fields(porter_id = %porter_id, suspended = suspended))]
    async fn set_suspended(
        &self,
        porter_id: PorterId,
        suspended: bool,
        reason: Option<String>,
    ) -> Result<PorterProfile> {
        let row = sqlx::query_as::<_, PorterProfileRow>(&format!(
            r#"
            UPDATE porter_profiles
            SET suspended = $2, suspension_reason = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {PORTER_PROFILE_COLUMNS}
            "#
        ))
        .bind(porter_id)
        .bind(suspended)
        .bind(&reason)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?
        .ok_or_else(|| DomainError::PorterNotFound(porter_id.to_string()))?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(porter_id = %porter_id, amount = amount.get()))]
    async fn increment_lifetime_earnings(
        &self,
        porter_id: PorterId,
        amount: AmountMinorUnits,
    ) -> Result<PorterProfile> {
        let row = sqlx::query_as::<_, PorterProfileRow>(&format!(
            r#"
            UPDATE porter_profiles
            SET lifetime_earnings = lifetime_earnings + $2, updated_at = NOW()
            WHERE id = $1
            RETURNING {PORTER_PROFILE_COLUMNS}
            "#
        ))
        .bind(porter_id)
        .bind(amount.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?
        .ok_or_else(|| DomainError::PorterNotFound(porter_id.to_string()))?;

        Ok(row.into())
    }

    #[instrument(skip(self), fields(porter_id = %porter_id))]
    async fn increment_completed_jobs(&self, porter_id: PorterId) -> Result<PorterProfile> {
        let row = sqlx::query_as::<_, PorterProfileRow>(&format!(
            r#"
            UPDATE porter_profiles
            SET completed_jobs_count = completed_jobs_count + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING {PORTER_PROFILE_COLUMNS}
            "#
        ))
        .bind(porter_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?
        .ok_or_else(|| DomainError::PorterNotFound(porter_id.to_string()))?;

        Ok(row.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// JOB OFFER STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, FromRow)]
struct JobOfferRow {
    id: OfferId,
    order_id: OrderId,
    porter_id: PorterId,
    offer_status: OfferStatus,
    assignment_status: AssignmentStatus,
    offered_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    assigned_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
    rejected_at: Option<DateTime<Utc>>,
    expired_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    correlation_id: Uuid,
    rejection_reason: Option<String>,
    revoke_reason: Option<String>,
}

impl From<JobOfferRow> for JobOffer {
    fn from(row: JobOfferRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            porter_id: row.porter_id,
            offer_status: row.offer_status,
            assignment_status: row.assignment_status,
            offered_at: row.offered_at,
            expires_at: row.expires_at,
            accepted_at: row.accepted_at,
            assigned_at: row.assigned_at,
            confirmed_at: row.confirmed_at,
            rejected_at: row.rejected_at,
            expired_at: row.expired_at,
            revoked_at: row.revoked_at,
            correlation_id: row.correlation_id,
            rejection_reason: row.rejection_reason,
            revoke_reason: row.revoke_reason,
        }
    }
}

const JOB_OFFER_COLUMNS: &str = "id, order_id, porter_id, offer_status, assignment_status, \
     offered_at, expires_at, accepted_at, assigned_at, confirmed_at, rejected_at, expired_at, \
     revoked_at, correlation_id, rejection_reason, revoke_reason";

/// Lock and return the offer row for update within an open transaction.
async fn lock_offer(tx: &mut Transaction<'_, Postgres>, offer_id: OfferId) -> Result<JobOfferRow> {
    sqlx::query_as::<_, JobOfferRow>(&format!(
        "SELECT {JOB_OFFER_COLUMNS} FROM job_offers WHERE id = $1 FOR UPDATE"
    ))
    .bind(offer_id)
    .fetch_optional(&mut **tx)
    .await
    .map_err(InfraError::Database)?
    .ok_or_else(|| AppError::Domain(DomainError::OfferNotFound(offer_id.to_string())))
}

#[async_trait]
impl JobOfferStore for PostgresStore {
    #[instrument(skip(self, offer), fields(id = %offer.id, order_id = %offer.order_id, porter_id = %offer.porter_id))]
    async fn create(&self, offer: &JobOffer) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO job_offers ({JOB_OFFER_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)"
        ))
        .bind(offer.id)
        .bind(offer.order_id)
        .bind(offer.porter_id)
        .bind(offer.offer_status)
        .bind(offer.assignment_status)
        .bind(offer.offered_at)
        .bind(offer.expires_at)
        .bind(offer.accepted_at)
        .bind(offer.assigned_at)
        .bind(offer.confirmed_at)
        .bind(offer.rejected_at)
        .bind(offer.expired_at)
        .bind(offer.revoked_at)
        .bind(offer.correlation_id)
        .bind(&offer.rejection_reason)
        .bind(&offer.revoke_reason)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        debug!("job offer created");
        Ok(())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn get_by_id(&self, id: OfferId) -> Result<Option<JobOffer>> {
        let row = sqlx::query_as::<_, JobOfferRow>(&format!(
            "SELECT {JOB_OFFER_COLUMNS} FROM job_offers WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), fields(porter_id = %porter_id))]
    async fn count_pending_for_porter(&self, porter_id: PorterId) -> Result<u32> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM job_offers WHERE porter_id = $1 AND offer_status = 'PENDING'",
        )
        .bind(porter_id)
        .fetch_one(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(count as u32)
    }

    #[instrument(skip(self), fields(order_id = %order_id, exclude = %exclude))]
    async fn list_pending_siblings(&self, order_id: OrderId, exclude: OfferId) -> Result<Vec<JobOffer>> {
        let rows = sqlx::query_as::<_, JobOfferRow>(&format!(
            "SELECT {JOB_OFFER_COLUMNS} FROM job_offers \
             WHERE order_id = $1 AND id != $2 AND offer_status = 'PENDING'"
        ))
        .bind(order_id)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Runs the entire accept protocol (spec §4.3 steps 2-6) as one
    /// `SERIALIZABLE` transaction: lock the target offer, verify
    /// ownership/state/expiry, lock every sibling PENDING offer for the
    /// same order, then write the winner's terminal state and every
    /// sibling's `REVOKED` state before committing. A concurrent second
    /// `accept` for a sibling offer either blocks on the row lock until
    /// this transaction commits (and then observes the now-REVOKED
    /// sibling and fails with `InvalidStateTransition`) or aborts with a
    /// serialization failure that the caller should retry.
    #[instrument(skip(self), fields(offer_id = %offer_id, porter_id = %porter_id))]
    async fn accept(&self, offer_id: OfferId, porter_id: PorterId, now: DateTime<Utc>) -> Result<(JobOffer, Vec<OfferId>)> {
        let mut tx = self.pool.begin().await.map_err(InfraError::Database)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(InfraError::Database)?;

        let offer = lock_offer(&mut tx, offer_id).await?;

        if offer.porter_id != porter_id {
            return Err(DomainError::OfferNotOwnedByPorter {
                offer_id: offer_id.to_string(),
                porter_id: porter_id.to_string(),
            }
            .into());
        }
        if offer.offer_status != OfferStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: format!("{:?}", offer.offer_status),
                attempted: "accept".into(),
            }
            .into());
        }
        if offer.expires_at < now {
            sqlx::query("UPDATE job_offers SET offer_status = 'EXPIRED', expired_at = $2 WHERE id = $1")
                .bind(offer_id)
                .bind(now)
                .execute(&mut *tx)
                .await
                .map_err(InfraError::Database)?;
            tx.commit().await.map_err(InfraError::Database)?;
            return Err(DomainError::OfferExpired(offer_id.to_string()).into());
        }

        let siblings = sqlx::query_as::<_, JobOfferRow>(&format!(
            "SELECT {JOB_OFFER_COLUMNS} FROM job_offers \
             WHERE order_id = $1 AND id != $2 AND offer_status = 'PENDING' FOR UPDATE"
        ))
        .bind(offer.order_id)
        .bind(offer_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        // A previously-accepted sibling would already be non-PENDING, but
        // guard explicitly against a confirmed assignment slipping through
        // under an isolation level weaker than SERIALIZABLE.
        let already_assigned: Option<JobOfferRow> = sqlx::query_as(&format!(
            "SELECT {JOB_OFFER_COLUMNS} FROM job_offers \
             WHERE order_id = $1 AND id != $2 AND offer_status = 'ACCEPTED' AND assignment_status = 'CONFIRMED'"
        ))
        .bind(offer.order_id)
        .bind(offer_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(InfraError::Database)?;
        if already_assigned.is_some() {
            sqlx::query(
                "UPDATE job_offers SET offer_status = 'REVOKED', revoked_at = $2, \
                 revoke_reason = 'order assigned to another porter' WHERE id = $1",
            )
            .bind(offer_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(InfraError::Database)?;
            tx.commit().await.map_err(InfraError::Database)?;
            return Err(DomainError::OrderAlreadyAssigned(offer.order_id.to_string()).into());
        }

        sqlx::query(
            r#"
            UPDATE job_offers SET
                offer_status = 'ACCEPTED',
                assignment_status = 'CONFIRMED',
                accepted_at = $2,
                assigned_at = $2,
                confirmed_at = $2
            WHERE id = $1
            "#,
        )
        .bind(offer_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        let sibling_ids: Vec<OfferId> = siblings.iter().map(|s| s.id).collect();
        if !sibling_ids.is_empty() {
            sqlx::query(
                "UPDATE job_offers SET offer_status = 'REVOKED', revoked_at = $2, \
                 revoke_reason = 'sibling_offer_accepted' WHERE id = ANY($1)",
            )
            .bind(&sibling_ids.iter().map(|id| id.as_uuid()).collect::<Vec<_>>())
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(InfraError::Database)?;
        }

        let accepted = sqlx::query_as::<_, JobOfferRow>(&format!(
            "SELECT {JOB_OFFER_COLUMNS} FROM job_offers WHERE id = $1"
        ))
        .bind(offer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        tx.commit().await.map_err(InfraError::Database)?;

        debug!(revoked = sibling_ids.len(), "offer accepted");
        Ok((accepted.into(), sibling_ids))
    }

    #[instrument(skip(self, reason), fields(offer_id = %offer_id, porter_id = %porter_id))]
    async fn reject(
        &self,
        offer_id: OfferId,
        porter_id: PorterId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<JobOffer> {
        let mut tx = self.pool.begin().await.map_err(InfraError::Database)?;

        let offer = lock_offer(&mut tx, offer_id).await?;

        if offer.porter_id != porter_id {
            return Err(DomainError::OfferNotOwnedByPorter {
                offer_id: offer_id.to_string(),
                porter_id: porter_id.to_string(),
            }
            .into());
        }
        if offer.offer_status != OfferStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: format!("{:?}", offer.offer_status),
                attempted: "reject".into(),
            }
            .into());
        }

        sqlx::query(
            "UPDATE job_offers SET offer_status = 'REJECTED', rejected_at = $2, rejection_reason = $3 WHERE id = $1",
        )
        .bind(offer_id)
        .bind(now)
        .bind(&reason)
        .execute(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        let rejected = sqlx::query_as::<_, JobOfferRow>(&format!(
            "SELECT {JOB_OFFER_COLUMNS} FROM job_offers WHERE id = $1"
        ))
        .bind(offer_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        tx.commit().await.map_err(InfraError::Database)?;

        debug!("offer rejected");
        Ok(rejected.into())
    }

    #[instrument(skip(self), fields(now = %now))]
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<JobOffer>> {
        let rows = sqlx::query_as::<_, JobOfferRow>(&format!(
            r#"
            UPDATE job_offers SET offer_status = 'EXPIRED', expired_at = $1
            WHERE offer_status = 'PENDING' AND expires_at < $1
            RETURNING {JOB_OFFER_COLUMNS}
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        if !rows.is_empty() {
            debug!(count = rows.len(), "stale offers expired");
        }
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(porter_id = %porter_id))]
    async fn list_for_porter(
        &self,
        porter_id: PorterId,
        status: Option<OfferStatus>,
    ) -> Result<Vec<JobOffer>> {
        let rows = if let Some(status) = status {
            sqlx::query_as::<_, JobOfferRow>(&format!(
                "SELECT {JOB_OFFER_COLUMNS} FROM job_offers \
                 WHERE porter_id = $1 AND offer_status = $2 ORDER BY offered_at DESC"
            ))
            .bind(porter_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await
            .map_err(InfraError::Database)?
        } else {
            sqlx::query_as::<_, JobOfferRow>(&format!(
                "SELECT {JOB_OFFER_COLUMNS} FROM job_offers WHERE porter_id = $1 ORDER BY offered_at DESC"
            ))
            .bind(porter_id)
            .fetch_all(&self.pool)
            .await
            .map_err(InfraError::Database)?
        };

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn get_order_offers(&self, order_id: OrderId) -> Result<Vec<JobOffer>> {
        let rows = sqlx::query_as::<_, JobOfferRow>(&format!(
            "SELECT {JOB_OFFER_COLUMNS} FROM job_offers WHERE order_id = $1 ORDER BY offered_at DESC"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EARNINGS STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, FromRow)]
struct PorterEarningRow {
    id: EarningId,
    porter_id: PorterId,
    earning_type: EarningType,
    amount: i64,
    status: EarningStatus,
    order_id: Option<OrderId>,
    payout_id: Option<PayoutId>,
    payout_status: Option<String>,
    description: Option<String>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    payout_at: Option<DateTime<Utc>>,
}

impl From<PorterEarningRow> for PorterEarning {
    fn from(row: PorterEarningRow) -> Self {
        Self {
            id: row.id,
            porter_id: row.porter_id,
            earning_type: row.earning_type,
            amount: AmountMinorUnits::new(row.amount),
            status: row.status,
            order_id: row.order_id,
            payout_id: row.payout_id,
            payout_status: row.payout_status,
            description: row.description,
            metadata: Metadata::new(row.metadata),
            created_at: row.created_at,
            payout_at: row.payout_at,
        }
    }
}

const EARNING_COLUMNS: &str = "id, porter_id, earning_type, amount, status, order_id, payout_id, \
     payout_status, description, metadata, created_at, payout_at";

#[async_trait]
impl EarningsStore for PostgresStore {
    #[instrument(skip(self, earning), fields(id = %earning.id, porter_id = %earning.porter_id))]
    async fn record(&self, earning: &PorterEarning) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO porter_earnings ({EARNING_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(earning.id)
        .bind(earning.porter_id)
        .bind(earning.earning_type)
        .bind(earning.amount.get())
        .bind(earning.status)
        .bind(earning.order_id)
        .bind(earning.payout_id)
        .bind(&earning.payout_status)
        .bind(&earning.description)
        .bind(earning.metadata.as_json())
        .bind(earning.created_at)
        .bind(earning.payout_at)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        debug!("earning recorded");
        Ok(())
    }

    #[instrument(skip(self), fields(porter_id = %porter_id))]
    async fn confirmed_balance(&self, porter_id: PorterId) -> Result<AmountMinorUnits> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(amount) FROM porter_earnings
            WHERE porter_id = $1
              AND (status = 'CONFIRMED'
                   OR (status = 'PENDING' AND earning_type = 'ADJUSTMENT' AND amount < 0))
            "#,
        )
        .bind(porter_id)
        .fetch_one(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(AmountMinorUnits::new(sum.unwrap_or(0)))
    }

    #[instrument(skip(self), fields(porter_id = %porter_id))]
    async fn pending_balance(&self, porter_id: PorterId) -> Result<AmountMinorUnits> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(amount) FROM porter_earnings
            WHERE porter_id = $1
              AND status = 'PENDING'
              AND NOT (earning_type = 'ADJUSTMENT' AND amount < 0)
            "#,
        )
        .bind(porter_id)
        .fetch_one(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(AmountMinorUnits::new(sum.unwrap_or(0)))
    }

    #[instrument(skip(self), fields(porter_id = %porter_id))]
    async fn total_earnings(&self, porter_id: PorterId) -> Result<AmountMinorUnits> {
        let sum: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT SUM(amount) FROM porter_earnings
            WHERE porter_id = $1
              AND status IN ('CONFIRMED', 'PENDING', 'PAID_OUT')
              AND NOT (earning_type = 'ADJUSTMENT' AND amount < 0)
            "#,
        )
        .bind(porter_id)
        .fetch_one(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(AmountMinorUnits::new(sum.unwrap_or(0)))
    }

    #[instrument(skip(self), fields(porter_id = %porter_id, limit = limit))]
    async fn list_for_porter(&self, porter_id: PorterId, limit: u32) -> Result<Vec<PorterEarning>> {
        let rows = sqlx::query_as::<_, PorterEarningRow>(&format!(
            "SELECT {EARNING_COLUMNS} FROM porter_earnings WHERE porter_id = $1 ORDER BY created_at DESC LIMIT $2"
        ))
        .bind(porter_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn get_by_id(&self, id: EarningId) -> Result<Option<PorterEarning>> {
        let row = sqlx::query_as::<_, PorterEarningRow>(&format!(
            "SELECT {EARNING_COLUMNS} FROM porter_earnings WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<PorterEarning>> {
        let rows = sqlx::query_as::<_, PorterEarningRow>(&format!(
            "SELECT {EARNING_COLUMNS} FROM porter_earnings WHERE order_id = $1 ORDER BY created_at DESC"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), fields(earning_id = %earning_id, to = ?to))]
    async fn update_status(
        &self,
        earning_id: EarningId,
        to: EarningStatus,
        payout_id: Option<PayoutId>,
        payout_status: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<PorterEarning> {
        let mut tx = self.pool.begin().await.map_err(InfraError::Database)?;

        let current = sqlx::query_as::<_, PorterEarningRow>(&format!(
            "SELECT {EARNING_COLUMNS} FROM porter_earnings WHERE id = $1 FOR UPDATE"
        ))
        .bind(earning_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(InfraError::Database)?
        .ok_or_else(|| DomainError::EarningNotFound(earning_id.to_string()))?;

        let legal = matches!(
            (current.status, to),
            (EarningStatus::Pending, EarningStatus::Confirmed)
                | (EarningStatus::Pending, EarningStatus::Cancelled)
                | (EarningStatus::Confirmed, EarningStatus::PaidOut)
                | (EarningStatus::Confirmed, EarningStatus::Cancelled)
        );
        if !legal {
            return Err(DomainError::InvalidStateTransition {
                from: format!("{:?}", current.status),
                attempted: format!("{to:?}"),
            }
            .into());
        }

        let payout_at = matches!(to, EarningStatus::PaidOut).then_some(now);

        let updated = sqlx::query_as::<_, PorterEarningRow>(&format!(
            r#"
            UPDATE porter_earnings
            SET status = $2, payout_id = COALESCE($3, payout_id),
                payout_status = COALESCE($4, payout_status), payout_at = COALESCE($5, payout_at)
            WHERE id = $1
            RETURNING {EARNING_COLUMNS}
            "#
        ))
        .bind(earning_id)
        .bind(to)
        .bind(payout_id)
        .bind(&payout_status)
        .bind(payout_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        tx.commit().await.map_err(InfraError::Database)?;

        debug!(from = ?current.status, to = ?to, "earning status transitioned");
        Ok(updated.into())
    }

    #[instrument(skip(self), fields(porter_id = %porter_id, amount = amount.get(), payout_id = %payout_id))]
    async fn settle_payout(
        &self,
        porter_id: PorterId,
        amount: AmountMinorUnits,
        payout_id: PayoutId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PorterEarning>> {
        let mut tx = self.pool.begin().await.map_err(InfraError::Database)?;

        let confirmed = sqlx::query_as::<_, PorterEarningRow>(&format!(
            "SELECT {EARNING_COLUMNS} FROM porter_earnings \
             WHERE porter_id = $1 AND status = 'CONFIRMED' ORDER BY created_at ASC FOR UPDATE"
        ))
        .bind(porter_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        let available: i64 = confirmed.iter().map(|r| r.amount).sum();
        if amount.get() > available {
            return Err(DomainError::InsufficientConfirmedBalance(porter_id.to_string()).into());
        }

        let mut settled = Vec::new();
        let mut remaining = amount.get();
        for row in confirmed {
            if remaining <= 0 {
                break;
            }
            sqlx::query(
                "UPDATE porter_earnings SET status = 'PAID_OUT', payout_id = $2, payout_at = $3 WHERE id = $1",
            )
            .bind(row.id)
            .bind(payout_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(InfraError::Database)?;
            remaining -= row.amount;
            settled.push(row.into());
        }

        tx.commit().await.map_err(InfraError::Database)?;

        debug!(count = settled.len(), "payout settled");
        Ok(settled)
    }

    #[instrument(skip(self), fields(porter_id = %porter_id, amount = amount.get()))]
    async fn request_withdrawal(
        &self,
        porter_id: PorterId,
        amount: AmountMinorUnits,
        now: DateTime<Utc>,
    ) -> Result<PorterEarning> {
        let mut tx = self.pool.begin().await.map_err(InfraError::Database)?;
        // FOR UPDATE alone only locks the rows it finds; a concurrent winner's
        // freshly-inserted negative-ADJUSTMENT row is invisible to a loser
        // unblocked by EvalPlanQual under READ COMMITTED (it re-checks the same
        // row set, not the new one). SERIALIZABLE forces one of two concurrent
        // withdrawals to abort with a serialization failure instead.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(InfraError::Database)?;

        let contributing = sqlx::query_as::<_, PorterEarningRow>(&format!(
            "SELECT {EARNING_COLUMNS} FROM porter_earnings \
             WHERE porter_id = $1 \
               AND (status = 'CONFIRMED' \
                    OR (status = 'PENDING' AND earning_type = 'ADJUSTMENT' AND amount < 0)) \
             FOR UPDATE"
        ))
        .bind(porter_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        let balance: i64 = contributing.iter().map(|row| row.amount).sum();
        if amount.get() > balance {
            return Err(DomainError::InsufficientConfirmedBalance(porter_id.to_string()).into());
        }

        let withdrawal = PorterEarning {
            id: EarningId::new(),
            porter_id,
            earning_type: EarningType::Adjustment,
            amount: AmountMinorUnits::new(-amount.get()),
            status: EarningStatus::Pending,
            order_id: None,
            payout_id: None,
            payout_status: None,
            description: Some("withdrawal request".to_string()),
            metadata: Metadata::empty(),
            created_at: now,
            payout_at: None,
        };

        sqlx::query(&format!(
            "INSERT INTO porter_earnings ({EARNING_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(withdrawal.id)
        .bind(withdrawal.porter_id)
        .bind(withdrawal.earning_type)
        .bind(withdrawal.amount.get())
        .bind(withdrawal.status)
        .bind(withdrawal.order_id)
        .bind(withdrawal.payout_id)
        .bind(&withdrawal.payout_status)
        .bind(&withdrawal.description)
        .bind(withdrawal.metadata.as_json())
        .bind(withdrawal.created_at)
        .bind(withdrawal.payout_at)
        .execute(&mut *tx)
        .await
        .map_err(InfraError::Database)?;

        tx.commit().await.map_err(InfraError::Database)?;

        debug!("withdrawal requested");
        Ok(withdrawal)
    }

    #[instrument(skip(self), fields(payout_id = %payout_id, completed = completed))]
    async fn apply_payout_result(
        &self,
        payout_id: PayoutId,
        payout_status: String,
        completed: bool,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let result = if completed {
            sqlx::query(
                "UPDATE porter_earnings SET status = 'PAID_OUT', payout_status = $2, payout_at = $3 \
                 WHERE payout_id = $1 AND status = 'CONFIRMED'",
            )
            .bind(payout_id)
            .bind(&payout_status)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(InfraError::Database)?
        } else {
            sqlx::query("UPDATE porter_earnings SET payout_status = $2 WHERE payout_id = $1")
                .bind(payout_id)
                .bind(&payout_status)
                .execute(&self.pool)
                .await
                .map_err(InfraError::Database)?
        };

        debug!(rows = result.rows_affected(), "payout result applied");
        Ok(result.rows_affected())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IDEMPOTENCY STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, FromRow)]
struct IdempotencyRecordRow {
    key: String,
    user_id: UserId,
    operation: String,
    response_payload: serde_json::Value,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl From<IdempotencyRecordRow> for IdempotencyRecord {
    fn from(row: IdempotencyRecordRow) -> Self {
        Self {
            key: row.key,
            user_id: row.user_id,
            operation: row.operation,
            response_payload: row.response_payload,
            expires_at: row.expires_at,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl IdempotencyStore for PostgresStore {
    #[instrument(skip(self), fields(key = %key))]
    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyRecord>> {
        let row = sqlx::query_as::<_, IdempotencyRecordRow>(
            "SELECT key, user_id, operation, response_payload, expires_at, created_at \
             FROM idempotency_records WHERE key = $1",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, record), fields(key = %record.key, user_id = %record.user_id))]
    async fn put(&self, record: &IdempotencyRecord) -> Result<()> {
        let existing = sqlx::query_as::<_, IdempotencyRecordRow>(
            "SELECT key, user_id, operation, response_payload, expires_at, created_at \
             FROM idempotency_records WHERE key = $1",
        )
        .bind(&record.key)
        .fetch_optional(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        if let Some(existing) = &existing {
            if existing.user_id != record.user_id || existing.operation != record.operation {
                return Err(DomainError::IdempotencyKeyConflict(record.key.clone()).into());
            }
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO idempotency_records (key, user_id, operation, response_payload, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(&record.key)
        .bind(record.user_id)
        .bind(&record.operation)
        .bind(&record.response_payload)
        .bind(record.expires_at)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(())
    }

    #[instrument(skip(self), fields(now = %now))]
    async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(InfraError::Database)?;

        debug!(pruned = result.rows_affected(), "expired idempotency records deleted");
        Ok(result.rows_affected())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATION SNAPSHOT STORE IMPLEMENTATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, FromRow)]
struct LocationSnapshotRow {
    id: Uuid,
    porter_id: PorterId,
    lat: f64,
    lng: f64,
    order_id: Option<OrderId>,
    captured_at: DateTime<Utc>,
}

impl From<LocationSnapshotRow> for LocationSnapshot {
    fn from(row: LocationSnapshotRow) -> Self {
        Self {
            id: row.id,
            porter_id: row.porter_id,
            coordinate: crate::types::primitives::GeoCoordinate::new(row.lat, row.lng)
                .unwrap_or_else(|_| crate::types::primitives::GeoCoordinate::new(0.0, 0.0).expect("origin is valid")),
            order_id: row.order_id,
            captured_at: row.captured_at,
        }
    }
}

#[async_trait]
impl LocationSnapshotStore for PostgresStore {
    #[instrument(skip(self, snapshot), fields(porter_id = %snapshot.porter_id))]
    async fn save(&self, snapshot: &LocationSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO location_snapshots (id, porter_id, lat, lng, order_id, captured_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.id)
        .bind(snapshot.porter_id)
        .bind(snapshot.coordinate.lat())
        .bind(snapshot.coordinate.lng())
        .bind(snapshot.order_id)
        .bind(snapshot.captured_at)
        .execute(&self.pool)
        .await
        .map_err(InfraError::Database)?;

        Ok(())
    }

    #[instrument(skip(self), fields(cutoff = %cutoff))]
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM location_snapshots WHERE captured_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(InfraError::Database)?;

        debug!(pruned = result.rows_affected(), "old location snapshots deleted");
        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(porter_id = %porter_id))]
    async fn list_for_porter(
        &self,
        porter_id: PorterId,
        order_id: Option<OrderId>,
        limit: u32,
    ) -> Result<Vec<LocationSnapshot>> {
        let rows = if let Some(order_id) = order_id {
            sqlx::query_as::<_, LocationSnapshotRow>(
                "SELECT id, porter_id, lat, lng, order_id, captured_at FROM location_snapshots \
                 WHERE porter_id = $1 AND order_id = $2 ORDER BY captured_at DESC LIMIT $3",
            )
            .bind(porter_id)
            .bind(order_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(InfraError::Database)?
        } else {
            sqlx::query_as::<_, LocationSnapshotRow>(
                "SELECT id, porter_id, lat, lng, order_id, captured_at FROM location_snapshots \
                 WHERE porter_id = $1 ORDER BY captured_at DESC LIMIT $2",
            )
            .bind(porter_id)
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(InfraError::Database)?
        };

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    // Full integration tests require a PostgreSQL database and live in
    // tests/store_integration.rs.

    #[test]
    fn postgres_store_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PostgresStore>();
    }
}
