//! # Entitlement Audit Log
//!
//! Append-only record of entitlement changes: who granted what to whom,
//! and when. Entries are never modified; the log is a bounded ring so a
//! runaway caller cannot exhaust memory.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to an entitlement record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementAction {
    /// A grant was created or re-enabled
    Granted,
    /// A grant was revoked or disabled
    Revoked,
    /// An override was issued
    OverrideIssued,
    /// An override was withdrawn early
    OverrideRevoked,
    /// Quota was consumed and committed
    QuotaConsumed,
    /// A period's usage counters were reset
    QuotaReset,
}

impl EntitlementAction {
    /// Stable identifier string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Revoked => "revoked",
            Self::OverrideIssued => "override_issued",
            Self::OverrideRevoked => "override_revoked",
            Self::QuotaConsumed => "quota_consumed",
            Self::QuotaReset => "quota_reset",
        }
    }
}

impl std::fmt::Display for EntitlementAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitlementLogEntry {
    /// Unique entry ID
    pub id: Uuid,
    /// When the change happened
    pub timestamp: DateTime<Utc>,
    /// What happened
    pub action: EntitlementAction,
    /// Feature involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_key: Option<String>,
    /// Tenant involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<Uuid>,
    /// User involved, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
    /// Admin who made the change, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<Uuid>,
    /// Structured change details
    pub detail: serde_json::Value,
}

impl EntitlementLogEntry {
    /// Create an entry with no subjects attached
    pub fn new(action: EntitlementAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action,
            feature_key: None,
            tenant_id: None,
            user_id: None,
            admin_id: None,
            detail: serde_json::Value::Null,
        }
    }

    /// Attach the feature involved
    pub fn feature(mut self, feature_key: impl Into<String>) -> Self {
        self.feature_key = Some(feature_key.into());
        self
    }

    /// Attach the tenant involved
    pub fn tenant(mut self, tenant_id: Uuid) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    /// Attach the user involved
    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Attach the acting admin
    pub fn admin(mut self, admin_id: Uuid) -> Self {
        self.admin_id = Some(admin_id);
        self
    }

    /// Attach structured change details
    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Default entry capacity
const DEFAULT_CAPACITY: usize = 10_000;

/// Append-only, bounded, thread-safe audit log
#[derive(Debug, Clone)]
pub struct EntitlementAuditLog {
    entries: Arc<RwLock<VecDeque<EntitlementLogEntry>>>,
    capacity: usize,
}

impl EntitlementAuditLog {
    /// Create a log with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a log holding at most `capacity` entries; the oldest entries
    /// are dropped first
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest if at capacity
    pub fn append(&self, entry: EntitlementLogEntry) {
        let mut entries = self.entries.write().unwrap();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Whether the log is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent `count` entries, newest first
    pub fn recent(&self, count: usize) -> Vec<EntitlementLogEntry> {
        let entries = self.entries.read().unwrap();
        entries.iter().rev().take(count).cloned().collect()
    }

    /// Entries touching a tenant, oldest first
    pub fn for_tenant(&self, tenant_id: Uuid) -> Vec<EntitlementLogEntry> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter(|e| e.tenant_id == Some(tenant_id))
            .cloned()
            .collect()
    }

    /// Entries touching a feature, oldest first
    pub fn for_feature(&self, feature_key: &str) -> Vec<EntitlementLogEntry> {
        let entries = self.entries.read().unwrap();
        entries
            .iter()
            .filter(|e| e.feature_key.as_deref() == Some(feature_key))
            .cloned()
            .collect()
    }
}

impl Default for EntitlementAuditLog {
    fn default() -> Self {
        Self::new()
    }
}
