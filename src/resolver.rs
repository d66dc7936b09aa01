//! # Entitlement Resolver
//!
//! Pure decision core: answers "can this actor use feature F right now?"
//! and "how much quota remains this period?" from a caller-supplied
//! snapshot. Performs no I/O, holds no state, and never fails an access
//! check; denied access is a value, not an error.
//!
//! Precedence is an explicit ordered rule list evaluated short-circuit:
//! tenant veto > admin override > user grant > tenant grant > plan
//! default. The tenant veto is absolute; an admin override does not
//! pierce it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{EntitlementError, EntitlementResult};
use crate::feature::FeatureCatalog;
use crate::plan::PlanCatalog;
use crate::quota::{QuotaConsumption, QuotaLimit, QuotaStatus};
use crate::snapshot::ActorSnapshot;

/// Why an access decision came out the way it did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    /// Granted or denied by the subscription plan's defaults
    PlanDefault,
    /// Granted by a user-specific grant
    UserGrant,
    /// Granted by a tenant-wide grant beyond the plan
    TenantOverride,
    /// Decided by an active admin override
    AdminOverride,
    /// Denied by a tenant-wide disablement
    TenantVeto,
    /// Feature key is not in the catalog
    UnknownFeature,
}

impl AccessReason {
    /// Stable identifier string for API responses
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlanDefault => "plan_default",
            Self::UserGrant => "user_grant",
            Self::TenantOverride => "tenant_override",
            Self::AdminOverride => "admin_override",
            Self::TenantVeto => "tenant_veto",
            Self::UnknownFeature => "unknown_feature",
        }
    }
}

impl std::fmt::Display for AccessReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of an access check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessDecision {
    /// Feature that was evaluated
    pub feature_key: String,
    /// Whether access is granted
    pub granted: bool,
    /// Which precedence rule decided
    pub reason: AccessReason,
    /// Quota position; present for granted metered features
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaStatus>,
}

impl AccessDecision {
    fn granted(feature_key: &str, reason: AccessReason, quota: Option<QuotaStatus>) -> Self {
        Self {
            feature_key: feature_key.to_string(),
            granted: true,
            reason,
            quota,
        }
    }

    fn denied(feature_key: &str, reason: AccessReason) -> Self {
        Self {
            feature_key: feature_key.to_string(),
            granted: false,
            reason,
            quota: None,
        }
    }

    /// Effective quota limit, when the decision carries one
    pub fn quota_limit(&self) -> Option<QuotaLimit> {
        self.quota.map(|q| q.limit)
    }

    /// Remaining quota, when the decision carries one
    pub fn quota_remaining(&self) -> Option<QuotaLimit> {
        self.quota.map(|q| q.remaining)
    }
}

/// Precedence levels, evaluated in declaration order; the first applicable
/// rule wins and later rules are not consulted. New levels are inserted by
/// adding a variant here and an arm in `apply`, not by editing control
/// flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrecedenceRule {
    UnknownFeature,
    TenantVeto,
    AdminOverride,
    UserGrant,
    TenantGrant,
    PlanDefault,
}

const PRECEDENCE: &[PrecedenceRule] = &[
    PrecedenceRule::UnknownFeature,
    PrecedenceRule::TenantVeto,
    PrecedenceRule::AdminOverride,
    PrecedenceRule::UserGrant,
    PrecedenceRule::TenantGrant,
    PrecedenceRule::PlanDefault,
];

/// Stateless resolver over immutable catalog snapshots.
///
/// The catalogs are passed in explicitly so resolution stays a pure
/// function of its inputs; there is no ambient configuration.
#[derive(Debug, Clone, Copy)]
pub struct EntitlementResolver<'a> {
    features: &'a FeatureCatalog,
    plans: &'a PlanCatalog,
}

impl<'a> EntitlementResolver<'a> {
    /// Create a resolver over the given catalogs
    pub fn new(features: &'a FeatureCatalog, plans: &'a PlanCatalog) -> Self {
        Self { features, plans }
    }

    /// Decide whether the snapshot's actor may use `feature_key` at `now`.
    ///
    /// Never fails: unknown features, inactive subscriptions, and missing
    /// grants all come back as denied decisions with a reason the API
    /// layer can turn into an actionable message.
    pub fn resolve_access(
        &self,
        snapshot: &ActorSnapshot,
        feature_key: &str,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        for rule in PRECEDENCE {
            if let Some(decision) = self.apply(*rule, snapshot, feature_key, now) {
                return decision;
            }
        }
        // The chain is total: PlanDefault decides every known feature and
        // UnknownFeature catches the rest.
        AccessDecision::denied(feature_key, AccessReason::UnknownFeature)
    }

    /// Propose a quota consumption for the snapshot's actor.
    ///
    /// Callers must have seen `resolve_access(..).granted == true` for the
    /// feature; a non-granted feature comes back as `FeatureNotGranted`
    /// rather than a panic. The returned proposal is not persisted here;
    /// the persistence layer must commit `new_used` atomically against the
    /// counter value the snapshot was read with.
    ///
    /// Panics if `amount` is zero (contract violation).
    pub fn consume_quota(
        &self,
        snapshot: &ActorSnapshot,
        feature_key: &str,
        amount: u64,
        now: DateTime<Utc>,
    ) -> EntitlementResult<QuotaConsumption> {
        assert!(amount > 0, "consume amount must be positive");

        let decision = self.resolve_access(snapshot, feature_key, now);
        if !decision.granted {
            return Err(match decision.reason {
                AccessReason::UnknownFeature => EntitlementError::UnknownFeature {
                    feature: feature_key.to_string(),
                },
                reason => EntitlementError::FeatureNotGranted {
                    feature: feature_key.to_string(),
                    reason,
                },
            });
        }

        let used = snapshot.usage.used(feature_key);
        // Non-metered features have no counter; consumption is a no-op
        // success with unlimited remaining.
        let limit = decision.quota_limit().unwrap_or(QuotaLimit::Unlimited);

        match limit {
            QuotaLimit::Unlimited => Ok(QuotaConsumption {
                feature_key: feature_key.to_string(),
                amount,
                new_used: used.saturating_add(amount),
                remaining: QuotaLimit::Unlimited,
            }),
            QuotaLimit::Limited(bound) => {
                if !limit.allows(used, amount) {
                    return Err(EntitlementError::QuotaExceeded {
                        feature: feature_key.to_string(),
                        requested: amount,
                        used,
                        limit: bound,
                    });
                }
                let new_used = used + amount;
                Ok(QuotaConsumption {
                    feature_key: feature_key.to_string(),
                    amount,
                    new_used,
                    remaining: QuotaLimit::Limited(bound - new_used),
                })
            }
        }
    }

    fn apply(
        &self,
        rule: PrecedenceRule,
        snapshot: &ActorSnapshot,
        feature_key: &str,
        now: DateTime<Utc>,
    ) -> Option<AccessDecision> {
        match rule {
            PrecedenceRule::UnknownFeature => {
                if self.features.get(feature_key).is_none() {
                    Some(AccessDecision::denied(feature_key, AccessReason::UnknownFeature))
                } else {
                    None
                }
            }

            PrecedenceRule::TenantVeto => {
                let grant = snapshot.tenant_grant(feature_key)?;
                if grant.is_active(now) && !grant.enabled {
                    Some(AccessDecision::denied(feature_key, AccessReason::TenantVeto))
                } else {
                    None
                }
            }

            PrecedenceRule::AdminOverride => {
                let o = snapshot.override_for(feature_key, now)?;
                if !o.enabled {
                    return Some(AccessDecision::denied(
                        feature_key,
                        AccessReason::AdminOverride,
                    ));
                }
                let quota = self.metered(feature_key).then(|| {
                    let base = self.base_quota_limit(snapshot, feature_key, now);
                    QuotaStatus::new(
                        base.add_delta(o.quota_delta),
                        snapshot.usage.used(feature_key),
                    )
                });
                Some(AccessDecision::granted(
                    feature_key,
                    AccessReason::AdminOverride,
                    quota,
                ))
            }

            PrecedenceRule::UserGrant => {
                let grant = snapshot.user_grant(feature_key)?;
                if !grant.is_active(now) || !grant.enabled {
                    return None;
                }
                let quota = self
                    .metered(feature_key)
                    .then(|| QuotaStatus::new(grant.quota_limit, snapshot.usage.used(feature_key)));
                Some(AccessDecision::granted(
                    feature_key,
                    AccessReason::UserGrant,
                    quota,
                ))
            }

            PrecedenceRule::TenantGrant => {
                let grant = snapshot.tenant_grant(feature_key)?;
                if !grant.is_active(now) || !grant.enabled {
                    return None;
                }
                let quota = self
                    .metered(feature_key)
                    .then(|| QuotaStatus::new(grant.quota_limit, snapshot.usage.used(feature_key)));
                Some(AccessDecision::granted(
                    feature_key,
                    AccessReason::TenantOverride,
                    quota,
                ))
            }

            PrecedenceRule::PlanDefault => {
                let def = self.features.get(feature_key)?;
                if !snapshot.subscription.is_active(now) {
                    return Some(AccessDecision::denied(
                        feature_key,
                        AccessReason::PlanDefault,
                    ));
                }
                let tier = snapshot.subscription.tier;
                let plan = self.plans.get(tier);
                let enabled = plan
                    .and_then(|p| p.feature_enabled(feature_key))
                    .unwrap_or_else(|| def.default_for_tier(tier));
                if !enabled {
                    return Some(AccessDecision::denied(
                        feature_key,
                        AccessReason::PlanDefault,
                    ));
                }
                let quota = def.metered.then(|| {
                    let limit = plan
                        .map(|p| p.quota_for(feature_key))
                        .unwrap_or(QuotaLimit::Unlimited);
                    QuotaStatus::new(limit, snapshot.usage.used(feature_key))
                });
                Some(AccessDecision::granted(
                    feature_key,
                    AccessReason::PlanDefault,
                    quota,
                ))
            }
        }
    }

    fn metered(&self, feature_key: &str) -> bool {
        self.features
            .get(feature_key)
            .map(|def| def.metered)
            .unwrap_or(false)
    }

    /// Limit the actor would have without any override: user grant, then
    /// tenant grant, then the plan's default quota while the subscription
    /// is active, else zero.
    fn base_quota_limit(
        &self,
        snapshot: &ActorSnapshot,
        feature_key: &str,
        now: DateTime<Utc>,
    ) -> QuotaLimit {
        if let Some(grant) = snapshot.user_grant(feature_key) {
            if grant.is_active(now) && grant.enabled {
                return grant.quota_limit;
            }
        }
        if let Some(grant) = snapshot.tenant_grant(feature_key) {
            if grant.is_active(now) && grant.enabled {
                return grant.quota_limit;
            }
        }
        if snapshot.subscription.is_active(now) {
            if let Some(plan) = self.plans.get(snapshot.subscription.tier) {
                return plan.quota_for(feature_key);
            }
        }
        QuotaLimit::Limited(0)
    }
}
