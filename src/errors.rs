//! # Entitlement Errors
//!
//! Expected business outcomes (not granted, quota exceeded, unknown
//! feature) are typed values callers branch on as normal control flow.
//! Contract violations (zero consume amount, malformed snapshot) panic at
//! the call site instead of appearing here.

use serde::Serialize;
use std::fmt;

use crate::resolver::AccessReason;

/// Entitlement error types
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum EntitlementError {
    /// Feature key is not in the catalog
    UnknownFeature {
        feature: String,
    },

    /// Access check did not grant the feature
    FeatureNotGranted {
        feature: String,
        reason: AccessReason,
    },

    /// Consumption would exceed the quota for this billing period
    QuotaExceeded {
        feature: String,
        requested: u64,
        used: u64,
        limit: u64,
    },

    /// No grant on record for the feature and scope
    GrantNotFound {
        feature: String,
        scope: String,
    },

    /// No subscription on record for the user
    SubscriptionNotFound {
        user_id: String,
    },

    /// No override on record with this id
    OverrideNotFound {
        override_id: String,
    },

    /// Usage counter kept changing underneath the commit
    ConcurrentUpdate {
        feature: String,
        retries: u32,
    },
}

impl fmt::Display for EntitlementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownFeature { feature } => {
                write!(f, "Unknown feature: {}", feature)
            }
            Self::FeatureNotGranted { feature, reason } => {
                write!(f, "Feature not granted: {} ({})", feature, reason)
            }
            Self::QuotaExceeded {
                feature,
                requested,
                used,
                limit,
            } => {
                write!(
                    f,
                    "Quota exceeded for {}: requested {}, {} / {} used this period",
                    feature, requested, used, limit
                )
            }
            Self::GrantNotFound { feature, scope } => {
                write!(f, "No {} grant on record for feature: {}", scope, feature)
            }
            Self::SubscriptionNotFound { user_id } => {
                write!(f, "No subscription on record for user: {}", user_id)
            }
            Self::OverrideNotFound { override_id } => {
                write!(f, "No override on record: {}", override_id)
            }
            Self::ConcurrentUpdate { feature, retries } => {
                write!(
                    f,
                    "Usage counter for {} changed concurrently; gave up after {} retries",
                    feature, retries
                )
            }
        }
    }
}

impl std::error::Error for EntitlementError {}

/// Result type for entitlement operations
pub type EntitlementResult<T> = Result<T, EntitlementError>;

impl EntitlementError {
    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownFeature { .. } => 404,
            Self::FeatureNotGranted { .. } => 403,
            Self::QuotaExceeded { .. } => 429,
            Self::GrantNotFound { .. } => 404,
            Self::SubscriptionNotFound { .. } => 404,
            Self::OverrideNotFound { .. } => 404,
            Self::ConcurrentUpdate { .. } => 409,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnknownFeature { .. } => "UNKNOWN_FEATURE",
            Self::FeatureNotGranted { .. } => "FEATURE_NOT_GRANTED",
            Self::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Self::GrantNotFound { .. } => "GRANT_NOT_FOUND",
            Self::SubscriptionNotFound { .. } => "SUBSCRIPTION_NOT_FOUND",
            Self::OverrideNotFound { .. } => "OVERRIDE_NOT_FOUND",
            Self::ConcurrentUpdate { .. } => "CONCURRENT_UPDATE",
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<EntitlementError> for ErrorResponse {
    fn from(err: EntitlementError) -> Self {
        Self {
            error: err.to_string(),
            code: err.error_code(),
            status: err.status_code(),
            details: serde_json::to_value(&err).ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = EntitlementError::QuotaExceeded {
            feature: "pdf_export".to_string(),
            requested: 1,
            used: 5,
            limit: 5,
        };
        assert_eq!(err.status_code(), 429);
        assert_eq!(err.error_code(), "QUOTA_EXCEEDED");

        let err = EntitlementError::FeatureNotGranted {
            feature: "api_access".to_string(),
            reason: AccessReason::TenantVeto,
        };
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_error_display() {
        let err = EntitlementError::QuotaExceeded {
            feature: "pdf_export".to_string(),
            requested: 2,
            used: 4,
            limit: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("pdf_export"));
        assert!(msg.contains("4 / 5"));
    }

    #[test]
    fn test_error_response() {
        let err = EntitlementError::UnknownFeature {
            feature: "teleportation".to_string(),
        };
        let response = ErrorResponse::from(err);
        assert_eq!(response.code, "UNKNOWN_FEATURE");
        assert_eq!(response.status, 404);
        assert!(response.details.is_some());
    }
}
