//! Validated primitive types for domain entities.
//!
//! These newtypes provide:
//! - Type safety (can't accidentally pass a porter id where an order id belongs)
//! - Validation at construction time
//! - Domain semantics in function signatures

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// ID NEWTYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Declares a `Uuid`-backed identifier newtype with the conversions every
/// identifier in this crate needs (`Display`, `FromStr`, `sqlx::Type`,
/// transparent `serde`).
macro_rules! uuid_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[serde(transparent)]
        #[sqlx(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing `Uuid`.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Get the underlying `Uuid`.
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

uuid_id!(PorterId, "Unique identifier for a `PorterProfile`.");
uuid_id!(UserId, "Unique identifier for the owning user account.");
uuid_id!(OrderId, "Unique identifier for an order, owned by an external dispatcher.");
uuid_id!(OfferId, "Unique identifier for a `JobOffer`.");
uuid_id!(EarningId, "Unique identifier for a `PorterEarning` row.");
uuid_id!(PayoutId, "Unique identifier for an external payout batch.");
uuid_id!(DeviceId, "Unique identifier for a porter's registered device/session.");
uuid_id!(CorrelationId, "Request-scoped identifier propagated through logs and events.");

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT MINOR UNITS
// ═══════════════════════════════════════════════════════════════════════════════

/// A signed monetary amount expressed in minor currency units (cents).
///
/// Earnings, adjustments, and withdrawal requests all move through this
/// type. It is intentionally a thin `i64` wrapper rather than an
/// arbitrary-precision decimal: minor units are already an integer
/// quantity, so no rounding or precision loss can occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AmountMinorUnits(i64);

impl AmountMinorUnits {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Construct from a raw signed value.
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Construct a non-negative amount, rejecting negative input.
    ///
    /// # Errors
    /// Returns `InvalidAmount::Negative` if `value` is negative.
    pub const fn non_negative(value: i64) -> Result<Self, InvalidAmount> {
        if value < 0 {
            return Err(InvalidAmount::Negative);
        }
        Ok(Self(value))
    }

    /// Get the raw value.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Whether this amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Whether this amount is negative (e.g. a withdrawal adjustment).
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Negate this amount (used to encode withdrawals as negative adjustments).
    #[must_use]
    pub const fn negated(&self) -> Self {
        Self(self.0.saturating_neg())
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    #[must_use]
    pub const fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for AmountMinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AmountMinorUnits> for i64 {
    fn from(amount: AmountMinorUnits) -> Self {
        amount.0
    }
}

impl From<i64> for AmountMinorUnits {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Error for invalid monetary amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidAmount {
    /// Amount was required to be non-negative.
    #[error("amount cannot be negative")]
    Negative,
}

// ═══════════════════════════════════════════════════════════════════════════════
// GEO COORDINATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Earth radius in meters, used for haversine distance.
const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A validated WGS-84 latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoordinate {
    lat: f64,
    lng: f64,
}

impl GeoCoordinate {
    /// Construct a coordinate, validating latitude/longitude ranges.
    ///
    /// # Errors
    /// Returns `InvalidCoordinate` if `lat` is outside `[-90, 90]` or `lng`
    /// is outside `[-180, 180]`, or if either is not finite.
    pub fn new(lat: f64, lng: f64) -> Result<Self, InvalidCoordinate> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(InvalidCoordinate::Latitude(lat));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(InvalidCoordinate::Longitude(lng));
        }
        Ok(Self { lat, lng })
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }

    /// Geodesic (haversine) distance to another coordinate, in meters.
    #[must_use]
    pub fn haversine_distance_meters(&self, other: &Self) -> f64 {
        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1.cos() * lat2.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().asin();
        EARTH_RADIUS_METERS * c
    }
}

/// Error for invalid geographic coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InvalidCoordinate {
    /// Latitude outside `[-90, 90]` or non-finite.
    #[error("invalid latitude: {0}")]
    Latitude(f64),
    /// Longitude outside `[-180, 180]` or non-finite.
    #[error("invalid longitude: {0}")]
    Longitude(f64),
}

// ═══════════════════════════════════════════════════════════════════════════════
// IDEMPOTENCY KEY
// ═══════════════════════════════════════════════════════════════════════════════

/// Client-supplied token that makes a mutating call safe to retry.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Parse from a raw string, rejecting empty or oversized keys.
    ///
    /// # Errors
    /// Returns `InvalidIdempotencyKey` if `raw` is empty or longer than 200
    /// bytes.
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidIdempotencyKey> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(InvalidIdempotencyKey::Empty);
        }
        if raw.len() > 200 {
            return Err(InvalidIdempotencyKey::TooLong(raw.len()));
        }
        Ok(Self(raw))
    }

    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdempotencyKey({})", self.0)
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<IdempotencyKey> for String {
    fn from(key: IdempotencyKey) -> Self {
        key.0
    }
}

/// Error for invalid idempotency keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidIdempotencyKey {
    /// Key was empty.
    #[error("idempotency key cannot be empty")]
    Empty,
    /// Key exceeded the maximum length.
    #[error("idempotency key too long: {0} bytes")]
    TooLong(usize),
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
