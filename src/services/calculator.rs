//! Derived dashboard metrics
//!
//! Pure functions from one cycle's [`RawMetrics`] to rounded rates. Every
//! ratio with a zero denominator is 0, and so is any result that overflows.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{DashboardSnapshot, DerivedMetrics, MetricName, RawMetrics};

/// Round half up to the nearest integer
fn round_half_up(value: Decimal) -> i64 {
    value
        .checked_add(dec!(0.5))
        .and_then(|v| v.floor().to_i64())
        .unwrap_or(0)
}

/// `round(numerator / denominator * scale)`, 0 when the denominator is zero
fn scaled_ratio(numerator: Decimal, denominator: Decimal, scale: Decimal) -> i64 {
    if denominator.is_zero() {
        return 0;
    }
    numerator
        .checked_mul(scale)
        .and_then(|scaled| scaled.checked_div(denominator))
        .map(round_half_up)
        .unwrap_or(0)
}

fn percent(numerator: Decimal, denominator: Decimal) -> i64 {
    scaled_ratio(numerator, denominator, Decimal::ONE_HUNDRED)
}

pub struct DerivedMetricsCalculator;

impl DerivedMetricsCalculator {
    pub fn retention_rate(raw: &RawMetrics) -> i64 {
        percent(
            raw.get(MetricName::ActivePlayers),
            raw.get(MetricName::TotalPlayers),
        )
    }

    pub fn conversion_rate(raw: &RawMetrics) -> i64 {
        percent(
            raw.get(MetricName::AcceptedApplications),
            raw.get(MetricName::TotalApplications),
        )
    }

    pub fn arpu(raw: &RawMetrics) -> i64 {
        scaled_ratio(
            raw.get(MetricName::MonthlyRevenue),
            raw.get(MetricName::ActivePlayers),
            Decimal::ONE,
        )
    }

    /// Attended share of the capped recent sample
    pub fn average_attendance(raw: &RawMetrics) -> i64 {
        percent(
            raw.get(MetricName::AttendanceAttended),
            raw.get(MetricName::AttendanceSampled),
        )
    }

    pub fn response_time(raw: &RawMetrics) -> i64 {
        scaled_ratio(
            raw.get(MetricName::ResponseHoursTotal),
            raw.get(MetricName::RespondedApplications),
            Decimal::ONE,
        )
    }

    /// Month-over-month revenue growth
    ///
    /// No previous-month revenue yields 0, which reads the same as flat revenue.
    pub fn growth_rate(raw: &RawMetrics) -> i64 {
        let current = raw.get(MetricName::MonthlyRevenue);
        let previous = raw.get(MetricName::PreviousMonthRevenue);
        current
            .checked_sub(previous)
            .map_or(0, |delta| percent(delta, previous))
    }

    pub fn derive(raw: &RawMetrics) -> DerivedMetrics {
        DerivedMetrics {
            retention_rate: Self::retention_rate(raw),
            conversion_rate: Self::conversion_rate(raw),
            arpu: Self::arpu(raw),
            average_attendance: Self::average_attendance(raw),
            response_time: Self::response_time(raw),
            growth_rate: Self::growth_rate(raw),
        }
    }

    /// Build the snapshot for one cycle; derived fields only read `raw`
    pub fn snapshot(raw: &RawMetrics, cycle: u64, computed_at: DateTime<Utc>) -> DashboardSnapshot {
        DashboardSnapshot {
            total_players: raw.count(MetricName::TotalPlayers),
            active_players: raw.count(MetricName::ActivePlayers),
            inactive_players: raw.count(MetricName::InactivePlayers),
            pending_payments: raw.count(MetricName::PendingPayments),
            monthly_revenue: raw.get(MetricName::MonthlyRevenue),
            previous_month_revenue: raw.get(MetricName::PreviousMonthRevenue),
            unread_notifications: raw.count(MetricName::UnreadNotifications),
            pending_applications: raw.count(MetricName::PendingApplications),
            total_users: raw.count(MetricName::TotalUsers),
            derived: Self::derive(raw),
            degraded_sources: raw.failures().keys().copied().collect(),
            cycle,
            computed_at,
        }
    }
}
