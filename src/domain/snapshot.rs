use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::metric::MetricName;

/// Ratios and rates derived from one cycle's raw metrics, rounded to whole numbers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    /// Active players as a percentage of all players
    pub retention_rate: i64,
    /// Accepted applications as a percentage of all applications
    pub conversion_rate: i64,
    /// Monthly revenue per active player
    pub arpu: i64,
    /// Attended share of the recent attendance sample, in percent
    pub average_attendance: i64,
    /// Mean hours between an application and its review
    pub response_time: i64,
    /// Month-over-month revenue change, in percent
    pub growth_rate: i64,
}

/// Dashboard state as of `computed_at`
///
/// Produced once per aggregation cycle and shared behind an `Arc`; a newer
/// snapshot replaces it rather than mutating it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub total_players: i64,
    pub active_players: i64,
    pub inactive_players: i64,
    pub pending_payments: i64,
    pub monthly_revenue: Decimal,
    pub previous_month_revenue: Decimal,
    pub unread_notifications: i64,
    pub pending_applications: i64,
    pub total_users: i64,

    #[serde(flatten)]
    pub derived: DerivedMetrics,

    /// Sources that fell back to zero in the cycle that produced this snapshot
    pub degraded_sources: Vec<MetricName>,
    /// Cycle number, increasing per cache key
    pub cycle: u64,
    pub computed_at: DateTime<Utc>,
}

impl DashboardSnapshot {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_sources.is_empty()
    }

    /// Seconds elapsed between computation and `now`
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.computed_at).num_seconds().max(0)
    }
}
