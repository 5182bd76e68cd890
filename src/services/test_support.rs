//! In-memory store doubles shared across service unit tests.
//!
//! These are deliberately minimal: just enough state and locking to drive
//! a service through its happy and error paths without a database.
//! Integration-level races (the `accept` protocol's concurrency guarantees)
//! are covered separately against a real Postgres instance.

#![cfg(test)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{AppError, DomainError, Result};
use crate::ports::PorterStore;
use crate::types::entities::{PorterProfile, VerificationHistory};
use crate::types::enums::VerificationStatus;
use crate::types::primitives::{AmountMinorUnits, PorterId, UserId};

/// A `PorterStore` backed by a `Mutex<Vec<_>>`, for service-layer unit tests.
#[derive(Default)]
pub struct InMemoryPorterStore {
    profiles: Mutex<Vec<PorterProfile>>,
    history: Mutex<Vec<VerificationHistory>>,
}

impl InMemoryPorterStore {
    /// Seed the store with a profile, as if it had already been saved.
    pub fn seed(&self, profile: PorterProfile) {
        self.profiles.lock().expect("poisoned").push(profile);
    }
}

#[async_trait]
impl PorterStore for InMemoryPorterStore {
    async fn get_by_id(&self, id: PorterId) -> Result<Option<PorterProfile>> {
        Ok(self
            .profiles
            .lock()
            .expect("poisoned")
            .iter()
            .find(|p| p.id == id)
            .cloned())
    }

    async fn get_by_user_id(&self, user_id: UserId) -> Result<Option<PorterProfile>> {
        Ok(self
            .profiles
            .lock()
            .expect("poisoned")
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn get_by_ids(&self, ids: &[PorterId]) -> Result<Vec<PorterProfile>> {
        Ok(self
            .profiles
            .lock()
            .expect("poisoned")
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn save(&self, profile: &PorterProfile) -> Result<()> {
        let mut profiles = self.profiles.lock().expect("poisoned");
        if let Some(existing) = profiles.iter_mut().find(|p| p.id == profile.id) {
            *existing = profile.clone();
        } else {
            profiles.push(profile.clone());
        }
        Ok(())
    }

    async fn transition_verification(
        &self,
        porter_id: PorterId,
        to: VerificationStatus,
        reviewer_user_id: Option<UserId>,
        notes: Option<String>,
    ) -> Result<PorterProfile> {
        let mut profiles = self.profiles.lock().expect("poisoned");
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == porter_id)
            .ok_or(AppError::Domain(DomainError::PorterNotFound(porter_id.to_string())))?;
        let from = profile.verification_status;
        profile.verification_status = to;
        profile.updated_at = Utc::now();
        let updated = profile.clone();
        self.history.lock().expect("poisoned").push(VerificationHistory {
            id: uuid::Uuid::now_v7(),
            porter_id,
            from_status: from,
            to_status: to,
            reviewer_user_id,
            notes,
            recorded_at: Utc::now(),
        });
        Ok(updated)
    }

    async fn verification_history(&self, porter_id: PorterId) -> Result<Vec<VerificationHistory>> {
        Ok(self
            .history
            .lock()
            .expect("poisoned")
            .iter()
            .filter(|h| h.porter_id == porter_id)
            .cloned()
            .collect())
    }

    async fn set_suspended(
        &self,
        porter_id: PorterId,
        suspended: bool,
        reason: Option<String>,
    ) -> Result<PorterProfile> {
        let mut profiles = self.profiles.lock().expect("poisoned");
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == porter_id)
            .ok_or(AppError::Domain(DomainError::PorterNotFound(porter_id.to_string())))?;
        profile.suspended = suspended;
        profile.suspension_reason = reason;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn increment_lifetime_earnings(
        &self,
        porter_id: PorterId,
        amount: AmountMinorUnits,
    ) -> Result<PorterProfile> {
        let mut profiles = self.profiles.lock().expect("poisoned");
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == porter_id)
            .ok_or(AppError::Domain(DomainError::PorterNotFound(porter_id.to_string())))?;
        profile.lifetime_earnings = profile.lifetime_earnings.saturating_add(amount);
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }

    async fn increment_completed_jobs(&self, porter_id: PorterId) -> Result<PorterProfile> {
        let mut profiles = self.profiles.lock().expect("poisoned");
        let profile = profiles
            .iter_mut()
            .find(|p| p.id == porter_id)
            .ok_or(AppError::Domain(DomainError::PorterNotFound(porter_id.to_string())))?;
        profile.completed_jobs_count += 1;
        profile.updated_at = Utc::now();
        Ok(profile.clone())
    }
}

/// Allow tests to pin a fixed "now" without importing a full `Clock`.
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    Utc::now()
}
