//! # Billing Periods
//!
//! Usage counters are keyed by period label, so a new period starts with a
//! fresh counter at exactly the boundary instant. Nothing is mutated at
//! rollover; the old period's counters simply stop being consulted.

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::plan::PlanInterval;

/// A half-open billing window `[starts_at, ends_at)` with a stable label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingPeriod {
    /// Stable label used as the usage-counter key
    pub label: String,
    /// First instant of the period
    pub starts_at: DateTime<Utc>,
    /// First instant of the next period; `None` for lifetime plans
    pub ends_at: Option<DateTime<Utc>>,
}

impl BillingPeriod {
    /// The period containing `now` for the given interval
    pub fn current(interval: PlanInterval, now: DateTime<Utc>) -> Self {
        let year = now.year();
        let month = now.month();
        match interval {
            PlanInterval::Monthly => Self {
                label: format!("{:04}-{:02}", year, month),
                starts_at: month_start(year, month),
                ends_at: Some(next_month_start(year, month)),
            },
            PlanInterval::Quarterly => {
                let quarter = (month - 1) / 3;
                let first_month = quarter * 3 + 1;
                Self {
                    label: format!("{:04}-Q{}", year, quarter + 1),
                    starts_at: month_start(year, first_month),
                    ends_at: Some(if quarter == 3 {
                        month_start(year + 1, 1)
                    } else {
                        month_start(year, first_month + 3)
                    }),
                }
            }
            PlanInterval::Yearly => Self {
                label: format!("{:04}", year),
                starts_at: month_start(year, 1),
                ends_at: Some(month_start(year + 1, 1)),
            },
            PlanInterval::Lifetime => Self {
                label: "lifetime".to_string(),
                starts_at: DateTime::<Utc>::UNIX_EPOCH,
                ends_at: None,
            },
        }
    }

    /// Label of the period containing `now`
    pub fn current_label(interval: PlanInterval, now: DateTime<Utc>) -> String {
        Self::current(interval, now).label
    }

    /// Whether `at` falls inside this period
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if at < self.starts_at {
            return false;
        }
        match self.ends_at {
            Some(end) => at < end,
            None => true,
        }
    }

    /// When counters keyed by this period stop being consulted
    pub fn next_reset(&self) -> Option<DateTime<Utc>> {
        self.ends_at
    }
}

fn month_start(year: i32, month: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .expect("first of month is a valid timestamp")
}

fn next_month_start(year: i32, month: u32) -> DateTime<Utc> {
    if month == 12 {
        month_start(year + 1, 1)
    } else {
        month_start(year, month + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_monthly_labels() {
        assert_eq!(
            BillingPeriod::current_label(PlanInterval::Monthly, ts(2025, 3, 15, 10)),
            "2025-03"
        );
        assert_eq!(
            BillingPeriod::current_label(PlanInterval::Monthly, ts(2025, 12, 31, 23)),
            "2025-12"
        );
    }

    #[test]
    fn test_month_boundary_changes_label() {
        let before = Utc.with_ymd_and_hms(2025, 3, 31, 23, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let label_before = BillingPeriod::current_label(PlanInterval::Monthly, before);
        let label_after = BillingPeriod::current_label(PlanInterval::Monthly, after);
        assert_ne!(label_before, label_after);
        assert_eq!(label_before, "2025-03");
        assert_eq!(label_after, "2025-04");
    }

    #[test]
    fn test_monthly_bounds() {
        let period = BillingPeriod::current(PlanInterval::Monthly, ts(2025, 12, 15, 0));
        assert_eq!(period.starts_at, ts(2025, 12, 1, 0));
        assert_eq!(period.ends_at, Some(Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()));
        assert!(period.contains(ts(2025, 12, 31, 23)));
        assert!(!period.contains(ts(2026, 1, 1, 0)));
    }

    #[test]
    fn test_quarterly_labels() {
        assert_eq!(
            BillingPeriod::current_label(PlanInterval::Quarterly, ts(2025, 2, 10, 0)),
            "2025-Q1"
        );
        assert_eq!(
            BillingPeriod::current_label(PlanInterval::Quarterly, ts(2025, 11, 10, 0)),
            "2025-Q4"
        );

        let q4 = BillingPeriod::current(PlanInterval::Quarterly, ts(2025, 11, 10, 0));
        assert_eq!(q4.starts_at, ts(2025, 10, 1, 0));
        assert_eq!(q4.ends_at, Some(ts(2026, 1, 1, 0)));
    }

    #[test]
    fn test_yearly_period() {
        let period = BillingPeriod::current(PlanInterval::Yearly, ts(2025, 7, 4, 0));
        assert_eq!(period.label, "2025");
        assert_eq!(period.starts_at, ts(2025, 1, 1, 0));
        assert_eq!(period.ends_at, Some(ts(2026, 1, 1, 0)));
    }

    #[test]
    fn test_lifetime_never_resets() {
        let period = BillingPeriod::current(PlanInterval::Lifetime, ts(2025, 7, 4, 0));
        assert_eq!(period.label, "lifetime");
        assert_eq!(period.next_reset(), None);
        assert!(period.contains(ts(2099, 1, 1, 0)));
    }
}
