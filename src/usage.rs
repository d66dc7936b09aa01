//! # Usage Counters
//!
//! Per-period consumption counters for metered features. `UsageCounters`
//! is the immutable snapshot view the resolver reads; `UsageTracker` is
//! the in-memory reference store behind it. In production, back the
//! tracker with the persistence layer.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable usage view for one actor and billing period
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    /// Billing period the counts were captured for
    pub period_label: String,
    counts: BTreeMap<String, u64>,
}

impl UsageCounters {
    /// Empty counters for a period
    pub fn new(period_label: impl Into<String>) -> Self {
        Self {
            period_label: period_label.into(),
            counts: BTreeMap::new(),
        }
    }

    /// Add a count (builder style, used by tests and snapshot assembly)
    pub fn with_count(mut self, feature_key: impl Into<String>, used: u64) -> Self {
        self.counts.insert(feature_key.into(), used);
        self
    }

    /// Units consumed for a feature; unknown features have consumed zero
    pub fn used(&self, feature_key: &str) -> u64 {
        self.counts.get(feature_key).copied().unwrap_or(0)
    }

    /// Set a count in place
    pub fn set(&mut self, feature_key: impl Into<String>, used: u64) {
        self.counts.insert(feature_key.into(), used);
    }

    /// Iterate (feature key, used) pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Thread-safe in-memory usage tracker keyed by
/// (subscription, period label, feature key).
///
/// Period rollover needs no scheduled reset: a new period label simply
/// starts from zero, and old labels are dropped by `reset_period`.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    counters: Arc<RwLock<HashMap<(Uuid, String, String), u64>>>,
}

impl UsageTracker {
    /// Create a new tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Units consumed for a feature in a period
    pub fn used(&self, subscription_id: Uuid, period_label: &str, feature_key: &str) -> u64 {
        let read = self.counters.read().unwrap();
        read.get(&(
            subscription_id,
            period_label.to_string(),
            feature_key.to_string(),
        ))
        .copied()
        .unwrap_or(0)
    }

    /// Unconditionally add to a counter (metering-style recording, used
    /// when the limit was checked elsewhere)
    pub fn record(
        &self,
        subscription_id: Uuid,
        period_label: &str,
        feature_key: &str,
        amount: u64,
    ) {
        let mut write = self.counters.write().unwrap();
        let entry = write
            .entry((
                subscription_id,
                period_label.to_string(),
                feature_key.to_string(),
            ))
            .or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Compare-and-swap commit of a proposed counter value.
    ///
    /// Returns `false` when the stored counter no longer matches
    /// `expected_used`; the caller must re-read, re-resolve, and retry.
    pub fn try_commit(
        &self,
        subscription_id: Uuid,
        period_label: &str,
        feature_key: &str,
        expected_used: u64,
        new_used: u64,
    ) -> bool {
        let mut write = self.counters.write().unwrap();
        let entry = write
            .entry((
                subscription_id,
                period_label.to_string(),
                feature_key.to_string(),
            ))
            .or_insert(0);
        if *entry != expected_used {
            return false;
        }
        *entry = new_used;
        true
    }

    /// Capture the counters for one subscription and period
    pub fn counters_for(&self, subscription_id: Uuid, period_label: &str) -> UsageCounters {
        let read = self.counters.read().unwrap();
        let mut counters = UsageCounters::new(period_label);
        for ((sub, period, feature), used) in read.iter() {
            if *sub == subscription_id && period == period_label {
                counters.set(feature.clone(), *used);
            }
        }
        counters
    }

    /// Drop every counter for a subscription and period
    pub fn reset_period(&self, subscription_id: Uuid, period_label: &str) {
        let mut write = self.counters.write().unwrap();
        write.retain(|(sub, period, _), _| !(*sub == subscription_id && period == period_label));
    }
}
