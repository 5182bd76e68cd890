//! Domain enumerations for the Porter Dispatch Core.
//!
//! Each enum provides:
//! - Database serialization via `sqlx::Type`
//! - JSON serialization via `serde`
//! - Domain-specific helper methods (state-machine terminality, authorization tiers)

use serde::{Deserialize, Serialize};
use sqlx::Type;

// ═══════════════════════════════════════════════════════════════════════════════
// VERIFICATION STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Background-verification state of a porter.
///
/// Only `Verified` porters may appear in nearby-porter queries or receive
/// job offers (see `PorterProfile::is_eligible_for_dispatch`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    /// Submitted, not yet looked at.
    Pending,
    /// A reviewer has started the check.
    UnderReview,
    /// Passed background check; eligible to receive offers.
    Verified,
    /// Failed background check.
    Rejected,
}

impl VerificationStatus {
    /// Human-readable name for logs and API responses.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::UnderReview => "UNDER_REVIEW",
            Self::Verified => "VERIFIED",
            Self::Rejected => "REJECTED",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OFFER STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle state of a `JobOffer`.
///
/// ```text
/// PENDING ──accept──▶ ACCEPTED (terminal)
///    │
///    ├──reject──────▶ REJECTED (terminal)
///    ├──expire──────▶ EXPIRED (terminal)
///    └──revoke──────▶ REVOKED (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferStatus {
    /// Awaiting porter response, not yet expired.
    Pending,
    /// Porter accepted; terminal.
    Accepted,
    /// Porter rejected; terminal.
    Rejected,
    /// Expired before any response; terminal.
    Expired,
    /// Revoked after a sibling offer for the same order was accepted; terminal.
    Revoked,
}

impl OfferStatus {
    /// No transition leaves a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Assignment state tracked alongside `OfferStatus` once an offer is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    /// No binding assignment yet.
    Pending,
    /// Order is bound to this offer's porter; the source of the P1 uniqueness invariant.
    Confirmed,
}

// ═══════════════════════════════════════════════════════════════════════════════
// EARNING TYPE / STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Category of a `PorterEarning` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarningType {
    /// Payment for a completed delivery job.
    JobPayment,
    /// Gratuity.
    Tip,
    /// Platform-initiated incentive payment.
    Bonus,
    /// Manual correction; also used (negative) to encode withdrawal requests.
    Adjustment,
}

/// Settlement state of a `PorterEarning` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "varchar", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EarningStatus {
    /// Recorded but not yet confirmed (counts toward neither balance nor payout).
    Pending,
    /// Confirmed; counts toward the porter's available balance.
    Confirmed,
    /// Swept into a completed payout.
    PaidOut,
    /// Voided; no longer counts toward any balance.
    Cancelled,
}

impl EarningStatus {
    /// Whether this status counts toward the porter's confirmed-available balance.
    #[must_use]
    pub const fn counts_toward_confirmed_balance(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Principal role carried by the authentication context (§6 of the spec).
///
/// The core never verifies credentials; it only uses the role to decide
/// whether a call is authorized against the target entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// An order-placing customer.
    Client,
    /// A porter acting on their own behalf.
    Porter,
    /// Platform staff with suspend/verify privileges.
    Admin,
    /// Platform staff with unrestricted privileges.
    Superadmin,
}

impl Role {
    /// Whether this role may perform admin-scoped mutations (suspend, verify, reject).
    #[must_use]
    pub const fn is_admin_scoped(&self) -> bool {
        matches!(self, Self::Admin | Self::Superadmin)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    mod offer_status_tests {
        use super::*;

        #[test]
        fn only_pending_is_nonterminal() {
            assert!(!OfferStatus::Pending.is_terminal());
            assert!(OfferStatus::Accepted.is_terminal());
            assert!(OfferStatus::Rejected.is_terminal());
            assert!(OfferStatus::Expired.is_terminal());
            assert!(OfferStatus::Revoked.is_terminal());
        }
    }

    mod earning_status_tests {
        use super::*;

        #[test]
        fn only_confirmed_counts_toward_balance() {
            assert!(EarningStatus::Confirmed.counts_toward_confirmed_balance());
            assert!(!EarningStatus::Pending.counts_toward_confirmed_balance());
            assert!(!EarningStatus::PaidOut.counts_toward_confirmed_balance());
            assert!(!EarningStatus::Cancelled.counts_toward_confirmed_balance());
        }
    }

    mod role_tests {
        use super::*;

        #[test]
        fn admin_and_superadmin_are_admin_scoped() {
            assert!(Role::Admin.is_admin_scoped());
            assert!(Role::Superadmin.is_admin_scoped());
            assert!(!Role::Client.is_admin_scoped());
            assert!(!Role::Porter.is_admin_scoped());
        }
    }
}
