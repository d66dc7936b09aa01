//! # Subscription Model
//!
//! Subscription records and their status lifecycle. The resolver's
//! plan-default rule is gated on `is_active`; cancelling or expiring a
//! subscription therefore removes plan-derived entitlements without
//! touching explicit grants or overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::plan::{PlanInterval, PlanTier};

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// In trial period
    Trial,
    /// Paid and current
    Active,
    /// Period ended without renewal
    Expired,
    /// Cancelled by the customer or an admin
    Cancelled,
    /// Suspended (billing issue)
    Suspended,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Trial
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trial => write!(f, "trial"),
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Suspended => write!(f, "suspended"),
        }
    }
}

/// A user's subscription to a plan tier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// Unique subscription identifier
    pub subscription_id: Uuid,
    /// Subscriber
    pub user_id: Uuid,
    /// Subscriber's tenant
    pub tenant_id: Uuid,
    /// Plan tier
    pub tier: PlanTier,
    /// Billing interval, drives usage-period boundaries
    pub interval: PlanInterval,
    /// Current status
    pub status: SubscriptionStatus,
    /// Period start
    pub starts_at: DateTime<Utc>,
    /// Period end; `None` for open-ended subscriptions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    /// Trial end, when the subscription started as a trial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// Whether the subscription renews automatically
    pub auto_renew: bool,
    /// Cancellation timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
    /// Cancellation reason supplied by the customer or admin
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create an active open-ended subscription
    pub fn new(user_id: Uuid, tenant_id: Uuid, tier: PlanTier, starts_at: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            subscription_id: Uuid::new_v4(),
            user_id,
            tenant_id,
            tier,
            interval: PlanInterval::Monthly,
            status: SubscriptionStatus::Active,
            starts_at,
            ends_at: None,
            trial_ends_at: None,
            auto_renew: true,
            cancelled_at: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a trial subscription ending `trial_days` after start
    pub fn trial(
        user_id: Uuid,
        tenant_id: Uuid,
        tier: PlanTier,
        starts_at: DateTime<Utc>,
        trial_days: u32,
    ) -> Self {
        let mut sub = Self::new(user_id, tenant_id, tier, starts_at);
        sub.status = SubscriptionStatus::Trial;
        sub.trial_ends_at = Some(starts_at + chrono::Duration::days(i64::from(trial_days)));
        sub
    }

    /// Set the billing interval
    pub fn with_interval(mut self, interval: PlanInterval) -> Self {
        self.interval = interval;
        self
    }

    /// Set the period end
    pub fn with_end(mut self, ends_at: DateTime<Utc>) -> Self {
        self.ends_at = Some(ends_at);
        self
    }

    /// Whether the subscription confers plan-derived entitlements at `now`
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SubscriptionStatus::Active | SubscriptionStatus::Trial => {}
            _ => return false,
        }
        if now < self.starts_at {
            return false;
        }
        if self.status == SubscriptionStatus::Trial {
            if let Some(trial_end) = self.trial_ends_at {
                if now >= trial_end {
                    return false;
                }
            }
        }
        match self.ends_at {
            Some(end) => now < end,
            None => true,
        }
    }

    /// Promote a trial to a paid subscription
    pub fn activate(&mut self) {
        self.status = SubscriptionStatus::Active;
        self.updated_at = Utc::now();
    }

    /// Cancel the subscription
    pub fn cancel(&mut self, reason: impl Into<String>) {
        let now = Utc::now();
        self.status = SubscriptionStatus::Cancelled;
        self.auto_renew = false;
        self.cancelled_at = Some(now);
        self.cancellation_reason = Some(reason.into());
        self.updated_at = now;
    }

    /// Suspend the subscription (billing issue)
    pub fn suspend(&mut self) {
        self.status = SubscriptionStatus::Suspended;
        self.updated_at = Utc::now();
    }

    /// Mark the subscription expired
    pub fn expire(&mut self) {
        self.status = SubscriptionStatus::Expired;
        self.auto_renew = false;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_active_subscription() {
        let sub = Subscription::new(Uuid::new_v4(), Uuid::new_v4(), PlanTier::Pro, ts(2025, 1, 1));
        assert!(sub.is_active(ts(2025, 6, 1)));
        assert!(!sub.is_active(ts(2024, 12, 31)));
    }

    #[test]
    fn test_bounded_subscription() {
        let sub = Subscription::new(Uuid::new_v4(), Uuid::new_v4(), PlanTier::Basic, ts(2025, 1, 1))
            .with_end(ts(2025, 2, 1));
        assert!(sub.is_active(ts(2025, 1, 15)));
        assert!(!sub.is_active(ts(2025, 2, 1)));
        assert!(!sub.is_active(ts(2025, 3, 1)));
    }

    #[test]
    fn test_trial_window() {
        let sub = Subscription::trial(
            Uuid::new_v4(),
            Uuid::new_v4(),
            PlanTier::Pro,
            ts(2025, 1, 1),
            14,
        );
        assert!(sub.is_active(ts(2025, 1, 10)));
        assert!(!sub.is_active(ts(2025, 1, 20)));
    }

    #[test]
    fn test_lifecycle() {
        let mut sub =
            Subscription::new(Uuid::new_v4(), Uuid::new_v4(), PlanTier::Pro, ts(2025, 1, 1));
        assert!(sub.is_active(ts(2025, 6, 1)));

        sub.cancel("switching providers");
        assert_eq!(sub.status, SubscriptionStatus::Cancelled);
        assert!(!sub.auto_renew);
        assert!(sub.cancelled_at.is_some());
        assert!(!sub.is_active(ts(2025, 6, 1)));

        sub.activate();
        assert!(sub.is_active(ts(2025, 6, 1)));

        sub.suspend();
        assert!(!sub.is_active(ts(2025, 6, 1)));
    }
}
