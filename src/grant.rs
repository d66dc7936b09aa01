//! # Grants and Overrides
//!
//! Persisted entitlement records: tenant-wide grants, user-specific grants,
//! and time-bounded admin overrides. A record whose expiry has passed is
//! treated exactly as if it were absent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::quota::QuotaLimit;

/// Tenant-wide feature grant.
///
/// A disabled tenant grant is a ceiling for the whole tenant: it vetoes
/// user-level grants and plan defaults for the feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantGrant {
    /// Tenant the grant applies to
    pub tenant_id: Uuid,
    /// Feature key
    pub feature_key: String,
    /// Enabled or tenant-wide kill-switch
    pub enabled: bool,
    /// Quota ceiling for the whole tenant
    pub quota_limit: QuotaLimit,
    /// When the grant was issued
    pub granted_at: DateTime<Utc>,
    /// Admin who issued the grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<Uuid>,
    /// Expiry; `None` means standing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl TenantGrant {
    /// Create an enabled, unlimited, standing grant
    pub fn new(tenant_id: Uuid, feature_key: impl Into<String>) -> Self {
        Self {
            tenant_id,
            feature_key: feature_key.into(),
            enabled: true,
            quota_limit: QuotaLimit::Unlimited,
            granted_at: Utc::now(),
            granted_by: None,
            expires_at: None,
        }
    }

    /// Create a tenant-wide disablement (veto) for a feature
    pub fn disabled(tenant_id: Uuid, feature_key: impl Into<String>) -> Self {
        let mut grant = Self::new(tenant_id, feature_key);
        grant.enabled = false;
        grant
    }

    /// Set a quota ceiling
    pub fn with_limit(mut self, limit: QuotaLimit) -> Self {
        self.quota_limit = limit;
        self
    }

    /// Set an expiry
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Record the issuing admin
    pub fn by_admin(mut self, admin_id: Uuid) -> Self {
        self.granted_by = Some(admin_id);
        self
    }

    /// Whether the record is in effect at `now`. Applies to the veto form
    /// too: an expired disablement no longer vetoes anything.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => now < expiry,
            None => true,
        }
    }
}

/// User-specific feature grant.
///
/// The usage counter is not stored here; it lives in the period-keyed
/// usage counters so that resets happen at period boundaries structurally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserGrant {
    /// User the grant applies to
    pub user_id: Uuid,
    /// User's tenant
    pub tenant_id: Uuid,
    /// Feature key
    pub feature_key: String,
    /// Enabled flag; a disabled user grant is simply not applicable
    pub enabled: bool,
    /// Quota ceiling for this user
    pub quota_limit: QuotaLimit,
    /// When the grant was issued
    pub granted_at: DateTime<Utc>,
    /// Admin who issued the grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_by: Option<Uuid>,
    /// Expiry; `None` means standing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserGrant {
    /// Create an enabled, unlimited, standing grant
    pub fn new(user_id: Uuid, tenant_id: Uuid, feature_key: impl Into<String>) -> Self {
        Self {
            user_id,
            tenant_id,
            feature_key: feature_key.into(),
            enabled: true,
            quota_limit: QuotaLimit::Unlimited,
            granted_at: Utc::now(),
            granted_by: None,
            expires_at: None,
        }
    }

    /// Set a quota ceiling
    pub fn with_limit(mut self, limit: QuotaLimit) -> Self {
        self.quota_limit = limit;
        self
    }

    /// Set an expiry
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Record the issuing admin
    pub fn by_admin(mut self, admin_id: Uuid) -> Self {
        self.granted_by = Some(admin_id);
        self
    }

    /// Whether the record is in effect at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(expiry) => now < expiry,
            None => true,
        }
    }
}

/// Who an override applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverrideScope {
    /// A single user
    User(Uuid),
    /// Every user in a tenant
    Tenant(Uuid),
}

/// Time-bounded admin override.
///
/// Takes precedence over user grants, tenant grants, and plan defaults
/// (but not over a tenant veto). The `enabled` value decides the outcome
/// either way: an override can deny just as well as grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Override {
    /// Unique override identifier
    pub override_id: Uuid,
    /// User or tenant scope
    pub scope: OverrideScope,
    /// Feature key
    pub feature_key: String,
    /// Grant or deny
    pub enabled: bool,
    /// Added to the base quota limit the actor would otherwise have
    pub quota_delta: i64,
    /// Window start
    pub starts_at: DateTime<Utc>,
    /// Window end (exclusive)
    pub expires_at: DateTime<Utc>,
    /// Issuing admin
    pub issued_by: Uuid,
    /// Why the override was issued
    pub reason: String,
    /// Revocation timestamp, set when an admin withdraws the override early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Override {
    /// Create an override for the given window
    pub fn new(
        scope: OverrideScope,
        feature_key: impl Into<String>,
        enabled: bool,
        issued_by: Uuid,
        starts_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            override_id: Uuid::new_v4(),
            scope,
            feature_key: feature_key.into(),
            enabled,
            quota_delta: 0,
            starts_at,
            expires_at,
            issued_by,
            reason: reason.into(),
            revoked_at: None,
        }
    }

    /// Set a quota adjustment
    pub fn with_quota_delta(mut self, delta: i64) -> Self {
        self.quota_delta = delta;
        self
    }

    /// Whether the override is in effect at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.revoked_at.is_some() {
            return false;
        }
        now >= self.starts_at && now < self.expires_at
    }

    /// Withdraw the override before its window ends
    pub fn revoke(&mut self) {
        self.revoked_at = Some(Utc::now());
    }

    /// Whether the override targets this user/tenant pair
    pub fn applies_to(&self, user_id: Uuid, tenant_id: Uuid) -> bool {
        match self.scope {
            OverrideScope::User(id) => id == user_id,
            OverrideScope::Tenant(id) => id == tenant_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_standing_grant_never_expires() {
        let grant = TenantGrant::new(Uuid::new_v4(), "api_access");
        assert!(grant.is_active(ts(2099, 1, 1)));
    }

    #[test]
    fn test_grant_expiry() {
        let grant = UserGrant::new(Uuid::new_v4(), Uuid::new_v4(), "pdf_export")
            .with_expiry(ts(2025, 6, 1));
        assert!(grant.is_active(ts(2025, 5, 31)));
        assert!(!grant.is_active(ts(2025, 6, 1)));
        assert!(!grant.is_active(ts(2025, 6, 2)));
    }

    #[test]
    fn test_disabled_tenant_grant_still_active() {
        // The veto form must stay "active" so the resolver can see it.
        let veto = TenantGrant::disabled(Uuid::new_v4(), "api_access");
        assert!(!veto.enabled);
        assert!(veto.is_active(ts(2025, 1, 1)));
    }

    #[test]
    fn test_override_window() {
        let admin = Uuid::new_v4();
        let user = Uuid::new_v4();
        let o = Override::new(
            OverrideScope::User(user),
            "whatsapp_integration",
            true,
            admin,
            ts(2025, 3, 1),
            ts(2025, 3, 8),
            "trial extension for support case",
        );
        assert!(!o.is_active(ts(2025, 2, 28)));
        assert!(o.is_active(ts(2025, 3, 1)));
        assert!(o.is_active(ts(2025, 3, 7)));
        assert!(!o.is_active(ts(2025, 3, 8)));
    }

    #[test]
    fn test_override_revocation() {
        let mut o = Override::new(
            OverrideScope::Tenant(Uuid::new_v4()),
            "api_access",
            true,
            Uuid::new_v4(),
            ts(2025, 3, 1),
            ts(2025, 4, 1),
            "incident mitigation",
        );
        assert!(o.is_active(ts(2025, 3, 15)));
        o.revoke();
        assert!(!o.is_active(ts(2025, 3, 15)));
    }

    #[test]
    fn test_override_scope() {
        let user = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let o = Override::new(
            OverrideScope::Tenant(tenant),
            "api_access",
            true,
            Uuid::new_v4(),
            ts(2025, 1, 1),
            ts(2025, 2, 1),
            "",
        );
        assert!(o.applies_to(user, tenant));
        assert!(!o.applies_to(user, Uuid::new_v4()));
    }
}
