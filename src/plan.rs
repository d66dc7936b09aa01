//! # Plan Catalog
//!
//! Subscription plan tiers with their default feature sets and quotas.
//! The catalog is an immutable snapshot passed explicitly into every
//! resolution call; nothing here is global state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::feature::keys;
use crate::quota::QuotaLimit;

/// Subscription pricing tier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    /// Free tier: limited quotas, core features only
    Free,
    /// Basic tier: small workshops
    Basic,
    /// Pro tier: production workloads
    Pro,
    /// Enterprise tier: unlimited quotas
    Enterprise,
}

impl PlanTier {
    /// Numeric level used for minimum-tier comparisons
    pub fn level(&self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Basic => 1,
            Self::Pro => 2,
            Self::Enterprise => 3,
        }
    }

    /// Stable identifier string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Free
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing interval for a plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanInterval {
    Monthly,
    Quarterly,
    Yearly,
    Lifetime,
}

impl Default for PlanInterval {
    fn default() -> Self {
        Self::Monthly
    }
}

impl std::fmt::Display for PlanInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => write!(f, "monthly"),
            Self::Quarterly => write!(f, "quarterly"),
            Self::Yearly => write!(f, "yearly"),
            Self::Lifetime => write!(f, "lifetime"),
        }
    }
}

/// Plan definition: feature map plus default quotas for one tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDef {
    /// Pricing tier
    pub tier: PlanTier,
    /// Display name
    pub name: String,
    /// Billing interval
    #[serde(default)]
    pub interval: PlanInterval,
    /// Trial length in days granted on signup
    #[serde(default)]
    pub trial_days: u32,
    /// Base price in cents per interval (display only; billing owns pricing)
    #[serde(default)]
    pub price_cents: u32,
    /// Explicit feature switches; absent keys fall back to catalog defaults
    #[serde(default)]
    pub features: BTreeMap<String, bool>,
    /// Default quota per metered feature; absent keys are unlimited
    #[serde(default)]
    pub quotas: BTreeMap<String, QuotaLimit>,
}

impl PlanDef {
    /// Free tier defaults
    pub fn free() -> Self {
        Self {
            tier: PlanTier::Free,
            name: "Free".to_string(),
            interval: PlanInterval::Monthly,
            trial_days: 0,
            price_cents: 0,
            features: BTreeMap::new(),
            quotas: BTreeMap::from([
                (keys::PDF_EXPORT.to_string(), QuotaLimit::Limited(5)),
                (keys::QUOTES_MONTHLY.to_string(), QuotaLimit::Limited(20)),
            ]),
        }
    }

    /// Basic tier defaults
    pub fn basic() -> Self {
        Self {
            tier: PlanTier::Basic,
            name: "Basic".to_string(),
            interval: PlanInterval::Monthly,
            trial_days: 14,
            price_cents: 79_900,
            features: BTreeMap::new(),
            quotas: BTreeMap::from([
                (keys::PDF_EXPORT.to_string(), QuotaLimit::Limited(50)),
                (keys::QUOTES_MONTHLY.to_string(), QuotaLimit::Limited(200)),
                (keys::DATA_EXPORT.to_string(), QuotaLimit::Limited(10)),
                (keys::API_ACCESS.to_string(), QuotaLimit::Limited(1_000)),
                (keys::TEAM_MEMBERS.to_string(), QuotaLimit::Limited(3)),
            ]),
        }
    }

    /// Pro tier defaults
    pub fn pro() -> Self {
        Self {
            tier: PlanTier::Pro,
            name: "Pro".to_string(),
            interval: PlanInterval::Monthly,
            trial_days: 14,
            price_cents: 199_900,
            features: BTreeMap::from([(keys::CUSTOM_BRANDING.to_string(), true)]),
            quotas: BTreeMap::from([
                (keys::PDF_EXPORT.to_string(), QuotaLimit::Limited(500)),
                (keys::QUOTES_MONTHLY.to_string(), QuotaLimit::Limited(2_000)),
                (keys::DATA_EXPORT.to_string(), QuotaLimit::Limited(100)),
                (keys::API_ACCESS.to_string(), QuotaLimit::Limited(10_000)),
                (keys::TEAM_MEMBERS.to_string(), QuotaLimit::Limited(10)),
            ]),
        }
    }

    /// Enterprise tier: every quota unlimited
    pub fn enterprise() -> Self {
        Self {
            tier: PlanTier::Enterprise,
            name: "Enterprise".to_string(),
            interval: PlanInterval::Yearly,
            trial_days: 30,
            price_cents: 4_999_900,
            features: BTreeMap::from([(keys::CUSTOM_BRANDING.to_string(), true)]),
            quotas: BTreeMap::new(),
        }
    }

    /// Get the plan definition for a tier
    pub fn for_tier(tier: PlanTier) -> Self {
        match tier {
            PlanTier::Free => Self::free(),
            PlanTier::Basic => Self::basic(),
            PlanTier::Pro => Self::pro(),
            PlanTier::Enterprise => Self::enterprise(),
        }
    }

    /// Explicit feature switch for this plan, if one is configured
    pub fn feature_enabled(&self, feature_key: &str) -> Option<bool> {
        self.features.get(feature_key).copied()
    }

    /// Default quota for a feature under this plan; absent keys are unlimited
    pub fn quota_for(&self, feature_key: &str) -> QuotaLimit {
        self.quotas
            .get(feature_key)
            .copied()
            .unwrap_or(QuotaLimit::Unlimited)
    }
}

/// Immutable tier-indexed plan collection
#[derive(Debug, Clone, Default)]
pub struct PlanCatalog {
    plans: BTreeMap<PlanTier, PlanDef>,
}

impl PlanCatalog {
    /// Build a catalog from plan definitions. A later definition for the
    /// same tier replaces the earlier one.
    pub fn new(plans: impl IntoIterator<Item = PlanDef>) -> Self {
        Self {
            plans: plans.into_iter().map(|p| (p.tier, p)).collect(),
        }
    }

    /// The built-in four-tier catalog
    pub fn builtin() -> Self {
        Self::new([
            PlanDef::free(),
            PlanDef::basic(),
            PlanDef::pro(),
            PlanDef::enterprise(),
        ])
    }

    /// Look up the plan for a tier
    pub fn get(&self, tier: PlanTier) -> Option<&PlanDef> {
        self.plans.get(&tier)
    }

    /// Iterate plans in tier order
    pub fn iter(&self) -> impl Iterator<Item = &PlanDef> {
        self.plans.values()
    }

    /// Number of plans in the catalog
    pub fn len(&self) -> usize {
        self.plans.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}
