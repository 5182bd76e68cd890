//! Layered error types for the Porter Dispatch Core.
//!
//! This module provides a hierarchical error system:
//!
//! - [`DomainError`] - Business logic errors (invalid state, not found, etc.)
//! - [`InfraError`] - Infrastructure errors (database, hot store, event bus)
//! - [`AppError`] - Application-level errors combining domain and infra
//! - [`ApiError`] - Transport-facing errors with the taxonomy from spec §7
//!
//! # Error Philosophy
//!
//! - Domain errors are recoverable and user-facing
//! - Infrastructure errors are logged but details hidden from users
//! - The `Result` type alias uses `AppError` for application code

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Domain-level errors representing business logic violations.
///
/// These errors are recoverable and should be shown to callers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DomainError {
    /// Porter not found for the given id.
    #[error("porter not found: {0}")]
    PorterNotFound(String),

    /// Job offer not found for the given id.
    #[error("offer not found: {0}")]
    OfferNotFound(String),

    /// Earning record not found for the given id.
    #[error("earning not found: {0}")]
    EarningNotFound(String),

    /// Caller does not own the target offer (spec §4.3 step 2).
    #[error("offer {offer_id} is not owned by porter {porter_id}")]
    OfferNotOwnedByPorter {
        /// The offer in question.
        offer_id: String,
        /// The porter that attempted the call.
        porter_id: String,
    },

    /// The offer was not in the state required for the attempted transition.
    #[error("offer is {from}, cannot {attempted}")]
    InvalidStateTransition {
        /// Current offer status.
        from: String,
        /// The transition that was attempted.
        attempted: String,
    },

    /// The offer's `expiresAt` had already passed (spec §4.3 step 4).
    #[error("offer {0} has expired")]
    OfferExpired(String),

    /// A sibling offer for the same order was already confirmed (spec §4.3 step 5).
    #[error("order {0} already assigned to another porter")]
    OrderAlreadyAssigned(String),

    /// The porter already has `maxConcurrentOffersPerPorter` PENDING offers.
    #[error("porter {0} has too many pending offers")]
    TooManyPendingOffers(String),

    /// Withdrawal amount exceeded the porter's confirmed-available balance.
    #[error("insufficient confirmed balance for porter {0}")]
    InsufficientConfirmedBalance(String),

    /// An idempotency key was reused with a different user or operation.
    #[error("idempotency key conflict: {0}")]
    IdempotencyKeyConflict(String),

    /// A coordinate failed latitude/longitude validation.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// An amount was required to be non-negative.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Caller's role/ownership did not authorize the call.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Verification history / profile transition was attempted from an invalid state.
    #[error("invalid verification transition: {from} -> {to}")]
    InvalidVerificationTransition {
        /// Current verification status.
        from: String,
        /// Attempted verification status.
        to: String,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// INFRASTRUCTURE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Infrastructure-level errors from external systems.
///
/// These errors are typically logged but their details are hidden from
/// callers; per spec §7 they always surface as `SERVICE_UNAVAILABLE`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InfraError {
    /// Durable store (Postgres) error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Hot-state store error.
    #[error("hot store error: {0}")]
    HotStore(String),

    /// Event bus error.
    #[error("event bus error: {0}")]
    EventBus(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Resource not found in storage (adapter-level, before domain mapping).
    #[error("resource not found")]
    NotFound,

    /// Connection pool exhausted.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// Timeout waiting for an I/O operation.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Catch-all for adapter-internal failures that don't fit another variant.
    #[error("internal error: {0}")]
    Internal(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level errors combining domain and infrastructure errors.
///
/// This is the primary error type used throughout the service layer.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Domain logic error.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Infrastructure error.
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// Per-key rate limit exceeded (spec §7 `TOO_MANY_REQUESTS`).
    #[error("rate limited")]
    RateLimited,

    /// The request's deadline was exceeded before the call completed (spec §5).
    #[error("deadline exceeded")]
    Timeout,

    /// Configuration error surfaced at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Initialization error surfaced at startup.
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Graceful shutdown requested.
    #[error("shutdown requested")]
    ShutdownRequested,
}

/// Type alias for application Results.
pub type Result<T> = std::result::Result<T, AppError>;

// ═══════════════════════════════════════════════════════════════════════════════
// API ERRORS (transport-facing)
// ═══════════════════════════════════════════════════════════════════════════════

/// Transport-facing errors, carrying the seven-value taxonomy of spec §7.
///
/// These errors are converted to HTTP responses via [`IntoResponse`] for the
/// ambient HTTP surface; any other transport can map the same `code` field.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Wrapped application error.
    #[error(transparent)]
    App(#[from] AppError),

    /// Invalid request parameters (`BAD_REQUEST`).
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// Missing/invalid principal, relayed from the auth collaborator (`UNAUTHORIZED`).
    #[error("unauthorized")]
    Unauthorized,

    /// Internal server error (with source for logging).
    #[error("internal error")]
    Internal(#[source] eyre::Report),
}

impl ApiError {
    /// Attach extra structured context to a `CONFLICT` response, per spec
    /// §7's requirement that `acceptOffer` conflicts surface the offer's
    /// current status. Returns `None` unless `self` maps to `CONFLICT`.
    #[must_use]
    pub fn conflict_details(&self) -> Option<serde_json::Value> {
        match self {
            Self::App(AppError::Domain(DomainError::InvalidStateTransition { from, .. })) => {
                Some(json!({ "current_status": from }))
            }
            Self::App(AppError::Domain(DomainError::OfferExpired(_))) => {
                Some(json!({ "current_status": "EXPIRED" }))
            }
            Self::App(AppError::Domain(DomainError::OrderAlreadyAssigned(_))) => {
                Some(json!({ "current_status": "REVOKED" }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::App(AppError::Domain(
                DomainError::PorterNotFound(_)
                | DomainError::OfferNotFound(_)
                | DomainError::EarningNotFound(_),
            )) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),

            Self::App(AppError::Domain(
                DomainError::InvalidCoordinate(_) | DomainError::InvalidAmount(_),
            ))
            | Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", self.to_string()),

            Self::App(AppError::Domain(
                DomainError::Forbidden(_) | DomainError::OfferNotOwnedByPorter { .. },
            )) => (StatusCode::FORBIDDEN, "FORBIDDEN", self.to_string()),

            Self::App(AppError::Domain(
                DomainError::InvalidStateTransition { .. }
                | DomainError::OfferExpired(_)
                | DomainError::OrderAlreadyAssigned(_)
                | DomainError::TooManyPendingOffers(_)
                | DomainError::InsufficientConfirmedBalance(_)
                | DomainError::IdempotencyKeyConflict(_)
                | DomainError::InvalidVerificationTransition { .. },
            )) => (StatusCode::CONFLICT, "CONFLICT", self.to_string()),

            Self::App(AppError::RateLimited) => {
                (StatusCode::TOO_MANY_REQUESTS, "TOO_MANY_REQUESTS", self.to_string())
            }

            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", self.to_string()),

            // Infrastructure, timeout, and startup errors: log but don't expose details.
            Self::App(
                AppError::Infra(_)
                | AppError::Timeout
                | AppError::Config(_)
                | AppError::Initialization(_)
                | AppError::ShutdownRequested,
            )
            | Self::Internal(_) => {
                tracing::error!(error = ?self, "service unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "service unavailable".into(),
                )
            }
        };

        let details = self.conflict_details();
        let mut body = json!({
            "error": {
                "code": code,
                "message": message
            }
        });
        if let Some(details) = details {
            body["error"]["details"] = details;
        }

        (status, Json(body)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONVENIENCE CONVERSIONS
// ═══════════════════════════════════════════════════════════════════════════════

impl From<crate::types::primitives::InvalidCoordinate> for DomainError {
    fn from(err: crate::types::primitives::InvalidCoordinate) -> Self {
        Self::InvalidCoordinate(err.to_string())
    }
}

impl From<crate::types::primitives::InvalidAmount> for DomainError {
    fn from(err: crate::types::primitives::InvalidAmount) -> Self {
        Self::InvalidAmount(err.to_string())
    }
}

impl From<crate::types::primitives::InvalidCoordinate> for AppError {
    fn from(err: crate::types::primitives::InvalidCoordinate) -> Self {
        Self::Domain(err.into())
    }
}

impl From<crate::types::primitives::InvalidAmount> for AppError {
    fn from(err: crate::types::primitives::InvalidAmount) -> Self {
        Self::Domain(err.into())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
