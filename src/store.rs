//! # Entitlement Store
//!
//! In-memory reference implementation of the two collaborators the
//! resolver depends on: the snapshot provider (assembling an actor's
//! grants, overrides, and usage as of call time) and the persistence
//! layer (committing proposed quota counters atomically). In production,
//! back the same interface with the database.
//!
//! `consume` is the atomic boundary the resolver must be called within:
//! resolve against a fresh snapshot, propose a new counter, then
//! compare-and-swap it in. A conflicting commit re-reads and re-resolves,
//! so two concurrent consumers can never over-consume a bounded quota.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::audit::{EntitlementAction, EntitlementAuditLog, EntitlementLogEntry};
use crate::errors::{EntitlementError, EntitlementResult};
use crate::grant::{Override, TenantGrant, UserGrant};
use crate::period::BillingPeriod;
use crate::quota::{QuotaConsumption, QuotaLimit};
use crate::resolver::EntitlementResolver;
use crate::snapshot::ActorSnapshot;
use crate::subscription::Subscription;
use crate::usage::UsageTracker;

/// Attempts before a conflicting usage commit gives up
pub const MAX_COMMIT_RETRIES: u32 = 3;

/// In-memory entitlement store
#[derive(Debug, Clone)]
pub struct EntitlementStore {
    /// Subscriptions by user
    subscriptions: Arc<RwLock<HashMap<Uuid, Subscription>>>,
    /// Tenant grants by (tenant, feature)
    tenant_grants: Arc<RwLock<HashMap<(Uuid, String), TenantGrant>>>,
    /// User grants by (user, feature)
    user_grants: Arc<RwLock<HashMap<(Uuid, String), UserGrant>>>,
    /// Overrides by id
    overrides: Arc<RwLock<HashMap<Uuid, Override>>>,
    /// Usage counters
    usage: Arc<UsageTracker>,
    /// Audit trail
    audit: EntitlementAuditLog,
}

impl EntitlementStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::with_usage_tracker(Arc::new(UsageTracker::new()))
    }

    /// Create a store sharing an existing usage tracker
    pub fn with_usage_tracker(usage: Arc<UsageTracker>) -> Self {
        Self {
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            tenant_grants: Arc::new(RwLock::new(HashMap::new())),
            user_grants: Arc::new(RwLock::new(HashMap::new())),
            overrides: Arc::new(RwLock::new(HashMap::new())),
            usage,
            audit: EntitlementAuditLog::new(),
        }
    }

    /// Get the usage tracker
    pub fn usage_tracker(&self) -> Arc<UsageTracker> {
        self.usage.clone()
    }

    /// Get the audit log
    pub fn audit_log(&self) -> &EntitlementAuditLog {
        &self.audit
    }

    /// Register (or replace) a user's subscription
    pub fn register_subscription(&self, subscription: Subscription) {
        let mut subscriptions = self.subscriptions.write().unwrap();
        subscriptions.insert(subscription.user_id, subscription);
    }

    /// Get a user's subscription
    pub fn subscription_for(&self, user_id: Uuid) -> EntitlementResult<Subscription> {
        let subscriptions = self.subscriptions.read().unwrap();
        subscriptions
            .get(&user_id)
            .cloned()
            .ok_or_else(|| EntitlementError::SubscriptionNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Apply a mutation to a user's subscription (cancel, suspend, ...)
    pub fn update_subscription(
        &self,
        user_id: Uuid,
        update: impl FnOnce(&mut Subscription),
    ) -> EntitlementResult<Subscription> {
        let mut subscriptions = self.subscriptions.write().unwrap();
        let subscription = subscriptions.get_mut(&user_id).ok_or_else(|| {
            EntitlementError::SubscriptionNotFound {
                user_id: user_id.to_string(),
            }
        })?;
        update(subscription);
        Ok(subscription.clone())
    }

    /// Grant a feature to a user. Upserts: re-granting an existing record
    /// re-enables it and replaces its limit and expiry.
    pub fn grant_user_feature(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        feature_key: &str,
        quota_limit: QuotaLimit,
        expires_at: Option<DateTime<Utc>>,
        admin_id: Option<Uuid>,
    ) -> UserGrant {
        let mut grants = self.user_grants.write().unwrap();
        let grant = grants
            .entry((user_id, feature_key.to_string()))
            .and_modify(|g| {
                g.enabled = true;
                g.quota_limit = quota_limit;
                g.expires_at = expires_at;
                g.granted_by = admin_id;
                g.granted_at = Utc::now();
            })
            .or_insert_with(|| {
                let mut g = UserGrant::new(user_id, tenant_id, feature_key)
                    .with_limit(quota_limit);
                g.expires_at = expires_at;
                g.granted_by = admin_id;
                g
            })
            .clone();
        drop(grants);

        debug!(feature = feature_key, %user_id, "user feature granted");
        let mut entry = EntitlementLogEntry::new(EntitlementAction::Granted)
            .feature(feature_key)
            .user(user_id)
            .tenant(tenant_id)
            .detail(json!({
                "scope": "user",
                "quota_limit": grant.quota_limit,
                "expires_at": grant.expires_at,
            }));
        if let Some(admin) = admin_id {
            entry = entry.admin(admin);
        }
        self.audit.append(entry);
        grant
    }

    /// Grant a feature to every user in a tenant
    pub fn grant_tenant_feature(
        &self,
        tenant_id: Uuid,
        feature_key: &str,
        quota_limit: QuotaLimit,
        expires_at: Option<DateTime<Utc>>,
        admin_id: Option<Uuid>,
    ) -> TenantGrant {
        let mut grants = self.tenant_grants.write().unwrap();
        let grant = grants
            .entry((tenant_id, feature_key.to_string()))
            .and_modify(|g| {
                g.enabled = true;
                g.quota_limit = quota_limit;
                g.expires_at = expires_at;
                g.granted_by = admin_id;
                g.granted_at = Utc::now();
            })
            .or_insert_with(|| {
                let mut g = TenantGrant::new(tenant_id, feature_key).with_limit(quota_limit);
                g.expires_at = expires_at;
                g.granted_by = admin_id;
                g
            })
            .clone();
        drop(grants);

        debug!(feature = feature_key, %tenant_id, "tenant feature granted");
        let mut entry = EntitlementLogEntry::new(EntitlementAction::Granted)
            .feature(feature_key)
            .tenant(tenant_id)
            .detail(json!({
                "scope": "tenant",
                "quota_limit": grant.quota_limit,
                "expires_at": grant.expires_at,
            }));
        if let Some(admin) = admin_id {
            entry = entry.admin(admin);
        }
        self.audit.append(entry);
        grant
    }

    /// Disable a feature tenant-wide (the veto). Upserts a disabled grant.
    pub fn disable_tenant_feature(
        &self,
        tenant_id: Uuid,
        feature_key: &str,
        admin_id: Option<Uuid>,
    ) -> TenantGrant {
        let mut grants = self.tenant_grants.write().unwrap();
        let grant = grants
            .entry((tenant_id, feature_key.to_string()))
            .and_modify(|g| {
                g.enabled = false;
                g.granted_by = admin_id;
                g.granted_at = Utc::now();
            })
            .or_insert_with(|| {
                let mut g = TenantGrant::disabled(tenant_id, feature_key);
                g.granted_by = admin_id;
                g
            })
            .clone();
        drop(grants);

        debug!(feature = feature_key, %tenant_id, "tenant feature disabled");
        self.audit.append(
            EntitlementLogEntry::new(EntitlementAction::Revoked)
                .feature(feature_key)
                .tenant(tenant_id)
                .detail(json!({"scope": "tenant", "veto": true})),
        );
        grant
    }

    /// Disable a user's grant (soft revoke; the record stays for audit)
    pub fn revoke_user_feature(
        &self,
        user_id: Uuid,
        feature_key: &str,
        admin_id: Option<Uuid>,
    ) -> EntitlementResult<()> {
        let mut grants = self.user_grants.write().unwrap();
        let grant = grants
            .get_mut(&(user_id, feature_key.to_string()))
            .ok_or_else(|| EntitlementError::GrantNotFound {
                feature: feature_key.to_string(),
                scope: "user".to_string(),
            })?;
        grant.enabled = false;
        grant.granted_by = admin_id;
        let tenant_id = grant.tenant_id;
        drop(grants);

        self.audit.append(
            EntitlementLogEntry::new(EntitlementAction::Revoked)
                .feature(feature_key)
                .user(user_id)
                .tenant(tenant_id)
                .detail(json!({"scope": "user"})),
        );
        Ok(())
    }

    /// Issue an override
    pub fn issue_override(&self, o: Override) -> Uuid {
        let id = o.override_id;
        self.audit.append(
            EntitlementLogEntry::new(EntitlementAction::OverrideIssued)
                .feature(o.feature_key.clone())
                .admin(o.issued_by)
                .detail(json!({
                    "enabled": o.enabled,
                    "quota_delta": o.quota_delta,
                    "expires_at": o.expires_at,
                    "reason": o.reason,
                })),
        );
        let mut overrides = self.overrides.write().unwrap();
        overrides.insert(id, o);
        id
    }

    /// Withdraw an override before its window ends
    pub fn revoke_override(&self, override_id: Uuid, admin_id: Uuid) -> EntitlementResult<()> {
        let mut overrides = self.overrides.write().unwrap();
        let o = overrides
            .get_mut(&override_id)
            .ok_or_else(|| EntitlementError::OverrideNotFound {
                override_id: override_id.to_string(),
            })?;
        o.revoke();
        let feature_key = o.feature_key.clone();
        drop(overrides);

        self.audit.append(
            EntitlementLogEntry::new(EntitlementAction::OverrideRevoked)
                .feature(feature_key)
                .admin(admin_id)
                .detail(json!({"override_id": override_id})),
        );
        Ok(())
    }

    /// Assemble the actor's snapshot as of `now`. Expired grants and
    /// overrides are filtered out here, so the resolver sees only records
    /// that could apply.
    pub fn snapshot(
        &self,
        user_id: Uuid,
        tenant_id: Uuid,
        now: DateTime<Utc>,
    ) -> EntitlementResult<ActorSnapshot> {
        let subscription = self.subscription_for(user_id)?;
        if subscription.tenant_id != tenant_id {
            return Err(EntitlementError::SubscriptionNotFound {
                user_id: user_id.to_string(),
            });
        }

        let period = BillingPeriod::current(subscription.interval, now);
        let mut builder = ActorSnapshot::builder(subscription.clone())
            .usage(
                self.usage
                    .counters_for(subscription.subscription_id, &period.label),
            )
            .captured_at(now);

        let tenant_grants = self.tenant_grants.read().unwrap();
        for ((grant_tenant, _), grant) in tenant_grants.iter() {
            if *grant_tenant == tenant_id && grant.is_active(now) {
                builder = builder.tenant_grant(grant.clone());
            }
        }
        drop(tenant_grants);

        let user_grants = self.user_grants.read().unwrap();
        for ((grant_user, _), grant) in user_grants.iter() {
            if *grant_user == user_id && grant.is_active(now) {
                builder = builder.user_grant(grant.clone());
            }
        }
        drop(user_grants);

        let overrides = self.overrides.read().unwrap();
        for o in overrides.values() {
            if o.applies_to(user_id, tenant_id) && o.is_active(now) {
                builder = builder.with_override(o.clone());
            }
        }
        drop(overrides);

        Ok(builder.build())
    }

    /// Consume quota atomically: resolve against a fresh snapshot, propose
    /// a new counter, and compare-and-swap it in, retrying a bounded
    /// number of times when another writer got there first.
    pub fn consume(
        &self,
        resolver: &EntitlementResolver<'_>,
        user_id: Uuid,
        tenant_id: Uuid,
        feature_key: &str,
        amount: u64,
        now: DateTime<Utc>,
    ) -> EntitlementResult<QuotaConsumption> {
        for attempt in 0..MAX_COMMIT_RETRIES {
            let snapshot = self.snapshot(user_id, tenant_id, now)?;
            let proposal = resolver.consume_quota(&snapshot, feature_key, amount, now)?;
            let expected = snapshot.usage.used(feature_key);

            if self.usage.try_commit(
                snapshot.subscription.subscription_id,
                &snapshot.usage.period_label,
                feature_key,
                expected,
                proposal.new_used,
            ) {
                self.audit.append(
                    EntitlementLogEntry::new(EntitlementAction::QuotaConsumed)
                        .feature(feature_key)
                        .user(user_id)
                        .tenant(tenant_id)
                        .detail(json!({
                            "amount": amount,
                            "new_used": proposal.new_used,
                            "period": snapshot.usage.period_label,
                        })),
                );
                return Ok(proposal);
            }
            warn!(
                feature = feature_key,
                attempt, "usage counter changed underneath commit, retrying"
            );
        }

        Err(EntitlementError::ConcurrentUpdate {
            feature: feature_key.to_string(),
            retries: MAX_COMMIT_RETRIES,
        })
    }

    /// Drop a subscription's counters for a period (admin correction)
    pub fn reset_usage(&self, user_id: Uuid, period_label: &str, admin_id: Uuid) -> EntitlementResult<()> {
        let subscription = self.subscription_for(user_id)?;
        self.usage
            .reset_period(subscription.subscription_id, period_label);
        self.audit.append(
            EntitlementLogEntry::new(EntitlementAction::QuotaReset)
                .user(user_id)
                .tenant(subscription.tenant_id)
                .admin(admin_id)
                .detail(json!({"period": period_label})),
        );
        Ok(())
    }
}

impl Default for EntitlementStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{keys, FeatureCatalog};
    use crate::grant::OverrideScope;
    use crate::plan::{PlanCatalog, PlanTier};
    use crate::resolver::AccessReason;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    fn setup(tier: PlanTier) -> (EntitlementStore, Uuid, Uuid) {
        let store = EntitlementStore::new();
        let subscription =
            Subscription::new(Uuid::new_v4(), Uuid::new_v4(), tier, ts(2025, 1, 1));
        let user_id = subscription.user_id;
        let tenant_id = subscription.tenant_id;
        store.register_subscription(subscription);
        (store, user_id, tenant_id)
    }

    #[test]
    fn test_snapshot_filters_expired_records() {
        let (store, user_id, tenant_id) = setup(PlanTier::Free);

        store.grant_user_feature(
            user_id,
            tenant_id,
            keys::DATA_EXPORT,
            QuotaLimit::Limited(10),
            Some(ts(2025, 2, 1)),
            None,
        );

        let before = store.snapshot(user_id, tenant_id, ts(2025, 1, 15)).unwrap();
        assert_eq!(before.user_grants.len(), 1);

        let after = store.snapshot(user_id, tenant_id, ts(2025, 2, 2)).unwrap();
        assert!(after.user_grants.is_empty());
    }

    #[test]
    fn test_snapshot_unknown_user() {
        let store = EntitlementStore::new();
        let result = store.snapshot(Uuid::new_v4(), Uuid::new_v4(), ts(2025, 1, 1));
        assert!(matches!(
            result,
            Err(EntitlementError::SubscriptionNotFound { .. })
        ));
    }

    #[test]
    fn test_consume_commits_across_calls() {
        let (store, user_id, tenant_id) = setup(PlanTier::Free);
        let features = FeatureCatalog::builtin();
        let plans = PlanCatalog::builtin();
        let resolver = EntitlementResolver::new(&features, &plans);
        let now = ts(2025, 2, 10);

        // Free plan: pdf_export limit 5
        let mut seen = Vec::new();
        for _ in 0..5 {
            let proposal = store
                .consume(&resolver, user_id, tenant_id, keys::PDF_EXPORT, 1, now)
                .unwrap();
            seen.push(proposal.remaining);
        }
        assert_eq!(
            seen,
            vec![
                QuotaLimit::Limited(4),
                QuotaLimit::Limited(3),
                QuotaLimit::Limited(2),
                QuotaLimit::Limited(1),
                QuotaLimit::Limited(0),
            ]
        );

        let result = store.consume(&resolver, user_id, tenant_id, keys::PDF_EXPORT, 1, now);
        assert!(matches!(result, Err(EntitlementError::QuotaExceeded { .. })));

        // The committed counter never went past the limit.
        let snapshot = store.snapshot(user_id, tenant_id, now).unwrap();
        assert_eq!(snapshot.usage.used(keys::PDF_EXPORT), 5);
    }

    #[test]
    fn test_usage_resets_at_period_boundary() {
        let (store, user_id, tenant_id) = setup(PlanTier::Free);
        let features = FeatureCatalog::builtin();
        let plans = PlanCatalog::builtin();
        let resolver = EntitlementResolver::new(&features, &plans);

        for _ in 0..5 {
            store
                .consume(&resolver, user_id, tenant_id, keys::PDF_EXPORT, 1, ts(2025, 2, 10))
                .unwrap();
        }
        let exhausted =
            store.consume(&resolver, user_id, tenant_id, keys::PDF_EXPORT, 1, ts(2025, 2, 28));
        assert!(matches!(exhausted, Err(EntitlementError::QuotaExceeded { .. })));

        // A new month is a new counter.
        let fresh = store
            .consume(&resolver, user_id, tenant_id, keys::PDF_EXPORT, 1, ts(2025, 3, 1))
            .unwrap();
        assert_eq!(fresh.remaining, QuotaLimit::Limited(4));
    }

    #[test]
    fn test_tenant_veto_through_store() {
        let (store, user_id, tenant_id) = setup(PlanTier::Pro);
        let features = FeatureCatalog::builtin();
        let plans = PlanCatalog::builtin();
        let resolver = EntitlementResolver::new(&features, &plans);
        let now = ts(2025, 2, 1);

        store.grant_user_feature(
            user_id,
            tenant_id,
            keys::API_ACCESS,
            QuotaLimit::Limited(1_000),
            None,
            None,
        );
        store.disable_tenant_feature(tenant_id, keys::API_ACCESS, None);

        let snapshot = store.snapshot(user_id, tenant_id, now).unwrap();
        let decision = resolver.resolve_access(&snapshot, keys::API_ACCESS, now);
        assert!(!decision.granted);
        assert_eq!(decision.reason, AccessReason::TenantVeto);
    }

    #[test]
    fn test_grant_upsert_reenables() {
        let (store, user_id, tenant_id) = setup(PlanTier::Free);

        store.grant_user_feature(
            user_id,
            tenant_id,
            keys::DATA_EXPORT,
            QuotaLimit::Limited(10),
            None,
            None,
        );
        store.revoke_user_feature(user_id, keys::DATA_EXPORT, None).unwrap();

        let snapshot = store.snapshot(user_id, tenant_id, ts(2025, 2, 1)).unwrap();
        assert!(!snapshot.user_grants[0].enabled);

        let grant = store.grant_user_feature(
            user_id,
            tenant_id,
            keys::DATA_EXPORT,
            QuotaLimit::Limited(25),
            None,
            None,
        );
        assert!(grant.enabled);
        assert_eq!(grant.quota_limit, QuotaLimit::Limited(25));
    }

    #[test]
    fn test_revoke_missing_grant() {
        let (store, user_id, _) = setup(PlanTier::Free);
        let result = store.revoke_user_feature(user_id, keys::DATA_EXPORT, None);
        assert!(matches!(result, Err(EntitlementError::GrantNotFound { .. })));
    }

    #[test]
    fn test_override_issue_and_revoke() {
        let (store, user_id, tenant_id) = setup(PlanTier::Free);
        let features = FeatureCatalog::builtin();
        let plans = PlanCatalog::builtin();
        let resolver = EntitlementResolver::new(&features, &plans);
        let admin = Uuid::new_v4();
        let now = ts(2025, 3, 3);

        let id = store.issue_override(Override::new(
            OverrideScope::User(user_id),
            keys::WHATSAPP_INTEGRATION,
            true,
            admin,
            ts(2025, 3, 1),
            ts(2025, 3, 8),
            "evaluation window",
        ));

        let snapshot = store.snapshot(user_id, tenant_id, now).unwrap();
        let decision = resolver.resolve_access(&snapshot, keys::WHATSAPP_INTEGRATION, now);
        assert!(decision.granted);
        assert_eq!(decision.reason, AccessReason::AdminOverride);

        store.revoke_override(id, admin).unwrap();
        let snapshot = store.snapshot(user_id, tenant_id, now).unwrap();
        let decision = resolver.resolve_access(&snapshot, keys::WHATSAPP_INTEGRATION, now);
        assert!(!decision.granted);
        assert_eq!(decision.reason, AccessReason::PlanDefault);
    }

    #[test]
    fn test_consume_sees_externally_recorded_usage() {
        let (store, user_id, tenant_id) = setup(PlanTier::Free);
        let features = FeatureCatalog::builtin();
        let plans = PlanCatalog::builtin();
        let resolver = EntitlementResolver::new(&features, &plans);
        let now = ts(2025, 2, 10);

        // Another writer consumed 4 units before our snapshot: only one
        // unit of the limit of 5 is left.
        let subscription = store.subscription_for(user_id).unwrap();
        let period = BillingPeriod::current(subscription.interval, now);
        store
            .usage_tracker()
            .record(subscription.subscription_id, &period.label, keys::PDF_EXPORT, 4);

        let proposal = store
            .consume(&resolver, user_id, tenant_id, keys::PDF_EXPORT, 1, now)
            .unwrap();
        assert_eq!(proposal.new_used, 5);
        assert_eq!(proposal.remaining, QuotaLimit::Limited(0));

        let result = store.consume(&resolver, user_id, tenant_id, keys::PDF_EXPORT, 2, now);
        assert!(matches!(result, Err(EntitlementError::QuotaExceeded { .. })));
    }

    #[test]
    fn test_concurrent_consumers_never_over_consume() {
        let (store, user_id, tenant_id) = setup(PlanTier::Free);
        let now = ts(2025, 2, 10);

        // Ten threads race for five units of pdf_export. The CAS commit
        // guarantees the committed counter never passes the limit; a
        // loser either gets QuotaExceeded or exhausts its retries.
        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let features = FeatureCatalog::builtin();
                let plans = PlanCatalog::builtin();
                let resolver = EntitlementResolver::new(&features, &plans);
                store
                    .consume(&resolver, user_id, tenant_id, keys::PDF_EXPORT, 1, now)
                    .is_ok()
            }));
        }
        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        let snapshot = store.snapshot(user_id, tenant_id, now).unwrap();
        let committed = snapshot.usage.used(keys::PDF_EXPORT);
        assert_eq!(committed as usize, successes);
        assert!(committed <= 5);
    }

    #[test]
    fn test_audit_trail_records_mutations() {
        let (store, user_id, tenant_id) = setup(PlanTier::Free);

        store.grant_tenant_feature(
            tenant_id,
            keys::ANALYTICS_DASHBOARD,
            QuotaLimit::Unlimited,
            None,
            Some(Uuid::new_v4()),
        );
        store.grant_user_feature(
            user_id,
            tenant_id,
            keys::DATA_EXPORT,
            QuotaLimit::Limited(10),
            None,
            None,
        );
        store.reset_usage(user_id, "2025-01", Uuid::new_v4()).unwrap();

        let log = store.audit_log();
        assert_eq!(log.len(), 3);
        assert_eq!(log.for_tenant(tenant_id).len(), 3);
        assert_eq!(log.for_feature(keys::DATA_EXPORT).len(), 1);
        assert_eq!(
            log.recent(1)[0].action,
            EntitlementAction::QuotaReset
        );
    }
}
