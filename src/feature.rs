//! # Feature Catalog
//!
//! Definitions of the product features gated by entitlements. Unknown
//! feature keys are a business outcome ("not granted"), never an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::plan::PlanTier;

/// Well-known feature keys
pub mod keys {
    pub const API_ACCESS: &str = "api_access";
    pub const PDF_EXPORT: &str = "pdf_export";
    pub const QUOTES_MONTHLY: &str = "quotes_monthly";
    pub const WHATSAPP_INTEGRATION: &str = "whatsapp_integration";
    pub const ANALYTICS_DASHBOARD: &str = "analytics_dashboard";
    pub const DATA_EXPORT: &str = "data_export";
    pub const CUSTOM_BRANDING: &str = "custom_branding";
    pub const SUPPORT_24_7: &str = "support_24_7";
    pub const TEAM_MEMBERS: &str = "team_members";
    pub const AUTOMATION: &str = "automation";
}

/// Feature grouping used by the admin surface and reporting
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    Core,
    Quotes,
    Invoices,
    Parties,
    Admin,
    Integrations,
    Analytics,
    Support,
}

impl FeatureCategory {
    /// Stable identifier string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Quotes => "quotes",
            Self::Invoices => "invoices",
            Self::Parties => "parties",
            Self::Admin => "admin",
            Self::Integrations => "integrations",
            Self::Analytics => "analytics",
            Self::Support => "support",
        }
    }
}

impl std::fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Definition of a single gated feature
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDef {
    /// Unique key, referenced by grants, overrides, and plan maps
    pub key: String,
    /// Human-readable name
    pub display_name: String,
    /// Grouping category
    pub category: FeatureCategory,
    /// Available to every plan without an explicit grant
    #[serde(default)]
    pub default_enabled: bool,
    /// Lowest plan tier that receives the feature as a plan default.
    /// `None` means the feature is never tier-derived; it must come from a
    /// plan's explicit feature map, a grant, or an override.
    #[serde(default)]
    pub min_tier: Option<PlanTier>,
    /// Whether usage of the feature counts against a quota
    #[serde(default)]
    pub metered: bool,
}

impl FeatureDef {
    /// Create a feature definition with no default availability
    pub fn new(
        key: impl Into<String>,
        display_name: impl Into<String>,
        category: FeatureCategory,
    ) -> Self {
        Self {
            key: key.into(),
            display_name: display_name.into(),
            category,
            default_enabled: false,
            min_tier: None,
            metered: false,
        }
    }

    /// Mark the feature available to every plan
    pub fn default_enabled(mut self) -> Self {
        self.default_enabled = true;
        self
    }

    /// Set the lowest tier that receives the feature as a plan default
    pub fn min_tier(mut self, tier: PlanTier) -> Self {
        self.min_tier = Some(tier);
        self
    }

    /// Mark the feature quota-bearing
    pub fn metered(mut self) -> Self {
        self.metered = true;
        self
    }

    /// Whether the feature is a plan default at the given tier
    pub fn default_for_tier(&self, tier: PlanTier) -> bool {
        if self.default_enabled {
            return true;
        }
        match self.min_tier {
            Some(min) => tier >= min,
            None => false,
        }
    }
}

/// Immutable keyed feature collection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCatalog {
    features: BTreeMap<String, FeatureDef>,
}

impl FeatureCatalog {
    /// Build a catalog from feature definitions. A later definition for the
    /// same key replaces the earlier one.
    pub fn new(defs: impl IntoIterator<Item = FeatureDef>) -> Self {
        Self {
            features: defs.into_iter().map(|d| (d.key.clone(), d)).collect(),
        }
    }

    /// The built-in product feature set
    pub fn builtin() -> Self {
        Self::new([
            FeatureDef::new(keys::QUOTES_MONTHLY, "Quote Creation", FeatureCategory::Quotes)
                .default_enabled()
                .metered(),
            FeatureDef::new(keys::PDF_EXPORT, "PDF Export", FeatureCategory::Quotes)
                .min_tier(PlanTier::Free)
                .metered(),
            FeatureDef::new(keys::API_ACCESS, "API Access", FeatureCategory::Integrations)
                .min_tier(PlanTier::Basic)
                .metered(),
            FeatureDef::new(
                keys::WHATSAPP_INTEGRATION,
                "WhatsApp Integration",
                FeatureCategory::Integrations,
            )
            .min_tier(PlanTier::Pro),
            FeatureDef::new(
                keys::ANALYTICS_DASHBOARD,
                "Analytics Dashboard",
                FeatureCategory::Analytics,
            )
            .min_tier(PlanTier::Pro),
            FeatureDef::new(keys::DATA_EXPORT, "Data Export", FeatureCategory::Core)
                .min_tier(PlanTier::Basic)
                .metered(),
            FeatureDef::new(keys::CUSTOM_BRANDING, "Custom Branding", FeatureCategory::Core),
            FeatureDef::new(keys::SUPPORT_24_7, "24/7 Support", FeatureCategory::Support)
                .min_tier(PlanTier::Enterprise),
            FeatureDef::new(keys::TEAM_MEMBERS, "Team Members", FeatureCategory::Admin)
                .min_tier(PlanTier::Basic)
                .metered(),
            FeatureDef::new(keys::AUTOMATION, "Automation Rules", FeatureCategory::Core)
                .min_tier(PlanTier::Pro),
        ])
    }

    /// Look up a feature by key
    pub fn get(&self, key: &str) -> Option<&FeatureDef> {
        self.features.get(key)
    }

    /// Whether the catalog knows the key
    pub fn contains(&self, key: &str) -> bool {
        self.features.contains_key(key)
    }

    /// Iterate features in key order
    pub fn iter(&self) -> impl Iterator<Item = &FeatureDef> {
        self.features.values()
    }

    /// Number of features in the catalog
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
