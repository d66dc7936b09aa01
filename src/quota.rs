//! # Quota Values
//!
//! Bounded and unlimited quota arithmetic shared by the resolver, the
//! plan catalog, and the usage store.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A quota ceiling: a bounded number of units per billing period, or unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLimit {
    /// At most this many units per billing period
    Limited(u64),
    /// No ceiling
    Unlimited,
}

impl QuotaLimit {
    /// Whether this limit imposes no ceiling
    pub fn is_unlimited(&self) -> bool {
        matches!(self, QuotaLimit::Unlimited)
    }

    /// Remaining quota after the given consumption
    pub fn remaining_after(&self, used: u64) -> QuotaLimit {
        match self {
            QuotaLimit::Limited(limit) => QuotaLimit::Limited(limit.saturating_sub(used)),
            QuotaLimit::Unlimited => QuotaLimit::Unlimited,
        }
    }

    /// Whether consuming `amount` on top of `used` stays within the limit
    pub fn allows(&self, used: u64, amount: u64) -> bool {
        match self {
            QuotaLimit::Limited(limit) => match used.checked_add(amount) {
                Some(total) => total <= *limit,
                None => false,
            },
            QuotaLimit::Unlimited => true,
        }
    }

    /// Apply a signed adjustment. Unlimited stays unlimited; bounded limits
    /// saturate at zero and `u64::MAX`.
    pub fn add_delta(&self, delta: i64) -> QuotaLimit {
        match self {
            QuotaLimit::Limited(limit) => {
                if delta >= 0 {
                    QuotaLimit::Limited(limit.saturating_add(delta as u64))
                } else {
                    QuotaLimit::Limited(limit.saturating_sub(delta.unsigned_abs()))
                }
            }
            QuotaLimit::Unlimited => QuotaLimit::Unlimited,
        }
    }
}

impl Default for QuotaLimit {
    fn default() -> Self {
        Self::Unlimited
    }
}

impl fmt::Display for QuotaLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuotaLimit::Limited(limit) => write!(f, "{}", limit),
            QuotaLimit::Unlimited => write!(f, "unlimited"),
        }
    }
}

// Serialized as a plain integer, or the string "unlimited". This is what
// both the TOML catalog document and API payloads carry.
impl Serialize for QuotaLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            QuotaLimit::Limited(limit) => serializer.serialize_u64(*limit),
            QuotaLimit::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for QuotaLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct QuotaLimitVisitor;

        impl<'de> Visitor<'de> for QuotaLimitVisitor {
            type Value = QuotaLimit;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or the string \"unlimited\"")
            }

            fn visit_u64<E: de::Error>(self, value: u64) -> Result<QuotaLimit, E> {
                Ok(QuotaLimit::Limited(value))
            }

            fn visit_i64<E: de::Error>(self, value: i64) -> Result<QuotaLimit, E> {
                if value < 0 {
                    return Err(E::custom("quota limit must be non-negative"));
                }
                Ok(QuotaLimit::Limited(value as u64))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<QuotaLimit, E> {
                if value == "unlimited" {
                    Ok(QuotaLimit::Unlimited)
                } else {
                    Err(E::custom(format!("unrecognized quota limit '{}'", value)))
                }
            }
        }

        deserializer.deserialize_any(QuotaLimitVisitor)
    }
}

/// Quota position for a granted metered feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaStatus {
    /// Effective limit after all grants and overrides
    pub limit: QuotaLimit,
    /// Units consumed in the current billing period
    pub used: u64,
    /// Units left in the current billing period
    pub remaining: QuotaLimit,
}

impl QuotaStatus {
    /// Build a status from a limit and the current consumption
    pub fn new(limit: QuotaLimit, used: u64) -> Self {
        Self {
            limit,
            used,
            remaining: limit.remaining_after(used),
        }
    }
}

/// Proposed outcome of a successful quota consumption.
///
/// The resolver persists nothing: `new_used` is the counter value the
/// persistence layer must commit atomically (compare-and-swap against the
/// value the snapshot was read with).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaConsumption {
    /// Feature the consumption applies to
    pub feature_key: String,
    /// Units consumed by this call
    pub amount: u64,
    /// Proposed new counter value for the current billing period
    pub new_used: u64,
    /// Quota left after the proposed commit
    pub remaining: QuotaLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_arithmetic() {
        let limit = QuotaLimit::Limited(10);
        assert!(limit.allows(0, 10));
        assert!(!limit.allows(5, 6));
        assert_eq!(limit.remaining_after(4), QuotaLimit::Limited(6));
        assert_eq!(limit.remaining_after(20), QuotaLimit::Limited(0));
    }

    #[test]
    fn test_unlimited_allows_everything() {
        let limit = QuotaLimit::Unlimited;
        assert!(limit.allows(u64::MAX, u64::MAX));
        assert_eq!(limit.remaining_after(1_000_000), QuotaLimit::Unlimited);
        assert!(limit.add_delta(-100).is_unlimited());
    }

    #[test]
    fn test_overflow_is_denied() {
        let limit = QuotaLimit::Limited(u64::MAX);
        assert!(!limit.allows(u64::MAX, 1));
    }

    #[test]
    fn test_delta_saturates() {
        assert_eq!(
            QuotaLimit::Limited(5).add_delta(10),
            QuotaLimit::Limited(15)
        );
        assert_eq!(QuotaLimit::Limited(5).add_delta(-10), QuotaLimit::Limited(0));
    }

    #[test]
    fn test_serialization() {
        let json = serde_json::to_string(&QuotaLimit::Limited(25)).unwrap();
        assert_eq!(json, "25");

        let json = serde_json::to_string(&QuotaLimit::Unlimited).unwrap();
        assert_eq!(json, "\"unlimited\"");

        let parsed: QuotaLimit = serde_json::from_str("42").unwrap();
        assert_eq!(parsed, QuotaLimit::Limited(42));

        let parsed: QuotaLimit = serde_json::from_str("\"unlimited\"").unwrap();
        assert_eq!(parsed, QuotaLimit::Unlimited);

        assert!(serde_json::from_str::<QuotaLimit>("\"lots\"").is_err());
        assert!(serde_json::from_str::<QuotaLimit>("-3").is_err());
    }

    #[test]
    fn test_quota_status() {
        let status = QuotaStatus::new(QuotaLimit::Limited(5), 3);
        assert_eq!(status.remaining, QuotaLimit::Limited(2));

        let status = QuotaStatus::new(QuotaLimit::Unlimited, 3);
        assert_eq!(status.remaining, QuotaLimit::Unlimited);
    }
}
