//! # Catalog Configuration
//!
//! TOML-loadable feature and plan catalogs. Validation happens at load
//! time and rejects invalid documents with the offending field named;
//! resolution code never sees a half-valid catalog.
//!
//! ```toml
//! [[features]]
//! key = "pdf_export"
//! display_name = "PDF Export"
//! category = "quotes"
//! min_tier = "free"
//! metered = true
//!
//! [[plans]]
//! tier = "free"
//! name = "Free"
//! [plans.quotas]
//! pdf_export = 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feature::{FeatureCatalog, FeatureDef};
use crate::plan::{PlanCatalog, PlanDef};

/// Catalog configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration for '{field}': {message} (value: {value})")]
    Invalid {
        field: String,
        value: String,
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &str, value: impl std::fmt::Display, message: &str) -> Self {
        Self::Invalid {
            field: field.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        }
    }
}

/// The full entitlement catalog document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitlementConfig {
    /// Feature definitions
    #[serde(default)]
    pub features: Vec<FeatureDef>,
    /// Plan definitions
    #[serde(default)]
    pub plans: Vec<PlanDef>,
}

impl EntitlementConfig {
    /// The built-in catalog as a config document
    pub fn builtin() -> Self {
        Self {
            features: FeatureCatalog::builtin().iter().cloned().collect(),
            plans: PlanCatalog::builtin().iter().cloned().collect(),
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Validate the document
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_features = std::collections::BTreeSet::new();
        for feature in &self.features {
            if feature.key.is_empty() {
                return Err(ConfigError::invalid(
                    "features.key",
                    "\"\"",
                    "feature key must not be empty",
                ));
            }
            if !seen_features.insert(feature.key.as_str()) {
                return Err(ConfigError::invalid(
                    "features.key",
                    &feature.key,
                    "duplicate feature key",
                ));
            }
        }

        let mut seen_tiers = std::collections::BTreeSet::new();
        for plan in &self.plans {
            if !seen_tiers.insert(plan.tier) {
                return Err(ConfigError::invalid(
                    "plans.tier",
                    plan.tier,
                    "duplicate plan tier",
                ));
            }
            for key in plan.features.keys() {
                if !seen_features.contains(key.as_str()) {
                    return Err(ConfigError::invalid(
                        "plans.features",
                        key,
                        "references an unknown feature",
                    ));
                }
            }
            for key in plan.quotas.keys() {
                if !seen_features.contains(key.as_str()) {
                    return Err(ConfigError::invalid(
                        "plans.quotas",
                        key,
                        "references an unknown feature",
                    ));
                }
                let metered = self
                    .features
                    .iter()
                    .find(|f| f.key == *key)
                    .map(|f| f.metered)
                    .unwrap_or(false);
                if !metered {
                    return Err(ConfigError::invalid(
                        "plans.quotas",
                        key,
                        "quota configured for an unmetered feature",
                    ));
                }
            }
        }
        Ok(())
    }

    /// Split into the immutable catalogs the resolver consumes
    pub fn into_catalogs(self) -> (FeatureCatalog, PlanCatalog) {
        (
            FeatureCatalog::new(self.features),
            PlanCatalog::new(self.plans),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::PlanTier;
    use crate::quota::QuotaLimit;
    use std::io::Write;

    const VALID: &str = r#"
[[features]]
key = "pdf_export"
display_name = "PDF Export"
category = "quotes"
min_tier = "free"
metered = true

[[features]]
key = "analytics_dashboard"
display_name = "Analytics Dashboard"
category = "analytics"
min_tier = "pro"

[[plans]]
tier = "free"
name = "Free"

[plans.quotas]
pdf_export = 5

[[plans]]
tier = "pro"
name = "Pro"

[plans.quotas]
pdf_export = "unlimited"
"#;

    #[test]
    fn test_parse_valid_document() {
        let config = EntitlementConfig::from_toml_str(VALID).unwrap();
        assert_eq!(config.features.len(), 2);
        assert_eq!(config.plans.len(), 2);

        let (features, plans) = config.into_catalogs();
        assert!(features.contains("pdf_export"));
        assert_eq!(
            plans.get(PlanTier::Free).unwrap().quota_for("pdf_export"),
            QuotaLimit::Limited(5)
        );
        assert_eq!(
            plans.get(PlanTier::Pro).unwrap().quota_for("pdf_export"),
            QuotaLimit::Unlimited
        );
    }

    #[test]
    fn test_duplicate_feature_key_rejected() {
        let raw = r#"
[[features]]
key = "pdf_export"
display_name = "PDF Export"
category = "quotes"

[[features]]
key = "pdf_export"
display_name = "PDF Export Again"
category = "quotes"
"#;
        let err = EntitlementConfig::from_toml_str(raw).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("duplicate feature key"));
        assert!(msg.contains("pdf_export"));
    }

    #[test]
    fn test_dangling_quota_reference_rejected() {
        let raw = r#"
[[plans]]
tier = "free"
name = "Free"

[plans.quotas]
ghost_feature = 5
"#;
        let err = EntitlementConfig::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("unknown feature"));
    }

    #[test]
    fn test_quota_on_unmetered_feature_rejected() {
        let raw = r#"
[[features]]
key = "custom_branding"
display_name = "Custom Branding"
category = "core"

[[plans]]
tier = "free"
name = "Free"

[plans.quotas]
custom_branding = 5
"#;
        let err = EntitlementConfig::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("unmetered"));
    }

    #[test]
    fn test_builtin_document_validates() {
        EntitlementConfig::builtin().validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(VALID.as_bytes()).unwrap();

        let config = EntitlementConfig::load(file.path()).unwrap();
        assert_eq!(config.plans.len(), 2);

        let err = EntitlementConfig::load("/nonexistent/entitlements.toml").unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
    }
}
