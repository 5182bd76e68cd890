//! Idempotency decorator (spec §4.3/§4.7).
//!
//! Wraps a mutating service operation so that replaying the same
//! `(idempotencyKey, userId, operation)` triple returns the first call's
//! recorded response instead of re-executing it. Grounded in
//! [`crate::ports::HotStateStore`]'s get/set-with-ttl shape, realized here
//! against the durable [`IdempotencyStore`] since idempotency records must
//! survive a hot-store eviction.

use std::future::Future;

use chrono::Duration;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{AppError, DomainError, InfraError, Result};
use crate::ports::{Clock, IdempotencyStore};
use crate::types::entities::IdempotencyRecord;
use crate::types::primitives::{IdempotencyKey, UserId};

/// Run `operation_name` under `key`, replaying a cached response if this
/// exact `(key, user_id, operation_name)` triple was already recorded.
///
/// `fut` is only polled on a cache miss. The first caller to complete wins:
/// concurrent retries with the same key will both execute `fut` (the
/// durable store's `put` does not itself deduplicate in-flight calls), but
/// since `put` rejects a conflicting second write for a different user or
/// operation, a replay with the *same* triple after the first `put` lands
/// always observes the recorded response on its next attempt.
///
/// # Errors
///
/// Returns [`DomainError::IdempotencyKeyConflict`] if `key` was already
/// recorded under a different user or operation. Propagates whatever error
/// `fut` or the store returns otherwise.
pub async fn with_idempotency<I, F, T>(
    store: &I,
    clock: &(impl Clock + ?Sized),
    ttl: Duration,
    key: &IdempotencyKey,
    user_id: UserId,
    operation_name: &str,
    fut: F,
) -> Result<T>
where
    I: IdempotencyStore,
    F: Future<Output = Result<T>>,
    T: Serialize + DeserializeOwned,
{
    if let Some(record) = store.get(key).await? {
        if record.user_id != user_id || record.operation != operation_name {
            return Err(AppError::Domain(DomainError::IdempotencyKeyConflict(
                key.as_str().to_string(),
            )));
        }
        let replayed = serde_json::from_value(record.response_payload)
            .map_err(InfraError::Serialization)?;
        return Ok(replayed);
    }

    let result = fut.await?;

    let payload = serde_json::to_value(&result).map_err(InfraError::Serialization)?;
    let now = clock.now();
    let record = IdempotencyRecord {
        key: key.as_str().to_string(),
        user_id,
        operation: operation_name.to_string(),
        response_payload: payload,
        expires_at: now + ttl,
        created_at: now,
    };
    store.put(&record).await?;

    Ok(result)
}
