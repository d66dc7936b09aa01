//! # Actor Snapshot
//!
//! The immutable per-call input to the resolver: everything known about
//! one actor's entitlements as of a point in time. The snapshot provider
//! (persistence layer) assembles it; the resolver only reads it.
//!
//! A record attached to the wrong actor is a caller bug, not a business
//! outcome, and fails the build with a panic rather than becoming a
//! silent "access denied".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grant::{Override, OverrideScope, TenantGrant, UserGrant};
use crate::subscription::Subscription;
use crate::usage::UsageCounters;

/// Immutable view of one actor's entitlement-relevant state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorSnapshot {
    /// Acting user
    pub user_id: Uuid,
    /// Acting user's tenant
    pub tenant_id: Uuid,
    /// Current subscription
    pub subscription: Subscription,
    /// Tenant-wide grants for this tenant
    pub tenant_grants: Vec<TenantGrant>,
    /// User-specific grants for this user
    pub user_grants: Vec<UserGrant>,
    /// Overrides targeting this user or tenant
    pub overrides: Vec<Override>,
    /// Usage counters for the current billing period
    pub usage: UsageCounters,
    /// When the snapshot was assembled
    pub captured_at: DateTime<Utc>,
}

impl ActorSnapshot {
    /// Start building a snapshot around a subscription
    pub fn builder(subscription: Subscription) -> ActorSnapshotBuilder {
        ActorSnapshotBuilder {
            subscription,
            tenant_grants: Vec::new(),
            user_grants: Vec::new(),
            overrides: Vec::new(),
            usage: None,
            captured_at: None,
        }
    }

    /// Tenant grant for a feature, if any
    pub(crate) fn tenant_grant(&self, feature_key: &str) -> Option<&TenantGrant> {
        self.tenant_grants.iter().find(|g| g.feature_key == feature_key)
    }

    /// User grant for a feature, if any
    pub(crate) fn user_grant(&self, feature_key: &str) -> Option<&UserGrant> {
        self.user_grants.iter().find(|g| g.feature_key == feature_key)
    }

    /// Active override for a feature. A user-scoped override beats a
    /// tenant-scoped one for the same feature.
    pub(crate) fn override_for(&self, feature_key: &str, now: DateTime<Utc>) -> Option<&Override> {
        let mut tenant_scoped = None;
        for o in &self.overrides {
            if o.feature_key != feature_key || !o.is_active(now) {
                continue;
            }
            match o.scope {
                OverrideScope::User(_) => return Some(o),
                OverrideScope::Tenant(_) => tenant_scoped = tenant_scoped.or(Some(o)),
            }
        }
        tenant_scoped
    }
}

/// Builder for [`ActorSnapshot`]
#[derive(Debug, Clone)]
pub struct ActorSnapshotBuilder {
    subscription: Subscription,
    tenant_grants: Vec<TenantGrant>,
    user_grants: Vec<UserGrant>,
    overrides: Vec<Override>,
    usage: Option<UsageCounters>,
    captured_at: Option<DateTime<Utc>>,
}

impl ActorSnapshotBuilder {
    /// Attach a tenant grant
    pub fn tenant_grant(mut self, grant: TenantGrant) -> Self {
        self.tenant_grants.push(grant);
        self
    }

    /// Attach a user grant
    pub fn user_grant(mut self, grant: UserGrant) -> Self {
        self.user_grants.push(grant);
        self
    }

    /// Attach an override
    pub fn with_override(mut self, o: Override) -> Self {
        self.overrides.push(o);
        self
    }

    /// Attach usage counters for the current period
    pub fn usage(mut self, usage: UsageCounters) -> Self {
        self.usage = Some(usage);
        self
    }

    /// Record when the snapshot was assembled
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = Some(at);
        self
    }

    /// Finish the snapshot.
    ///
    /// Panics if any attached record targets a different actor than the
    /// subscription: that is a snapshot-provider bug.
    pub fn build(self) -> ActorSnapshot {
        let user_id = self.subscription.user_id;
        let tenant_id = self.subscription.tenant_id;

        for grant in &self.tenant_grants {
            assert_eq!(
                grant.tenant_id, tenant_id,
                "tenant grant for '{}' targets a different tenant than the snapshot actor",
                grant.feature_key
            );
        }
        for grant in &self.user_grants {
            assert_eq!(
                grant.user_id, user_id,
                "user grant for '{}' targets a different user than the snapshot actor",
                grant.feature_key
            );
            assert_eq!(
                grant.tenant_id, tenant_id,
                "user grant for '{}' targets a different tenant than the snapshot actor",
                grant.feature_key
            );
        }
        for o in &self.overrides {
            assert!(
                o.applies_to(user_id, tenant_id),
                "override for '{}' does not apply to the snapshot actor",
                o.feature_key
            );
        }

        ActorSnapshot {
            user_id,
            tenant_id,
            subscription: self.subscription,
            tenant_grants: self.tenant_grants,
            user_grants: self.user_grants,
            overrides: self.overrides,
            usage: self.usage.unwrap_or_default(),
            captured_at: self.captured_at.unwrap_or_else(Utc::now),
        }
    }
}
