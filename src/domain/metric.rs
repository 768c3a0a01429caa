use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw values the dashboard needs from the data store, one per metric source
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricName {
    TotalPlayers,
    ActivePlayers,
    InactivePlayers,
    PendingPayments,
    MonthlyRevenue,
    PreviousMonthRevenue,
    UnreadNotifications,
    PendingApplications,
    TotalApplications,
    AcceptedApplications,
    TotalUsers,
    AttendanceSampled,
    AttendanceAttended,
    RespondedApplications,
    ResponseHoursTotal,
}

impl MetricName {
    pub const ALL: [MetricName; 15] = [
        MetricName::TotalPlayers,
        MetricName::ActivePlayers,
        MetricName::InactivePlayers,
        MetricName::PendingPayments,
        MetricName::MonthlyRevenue,
        MetricName::PreviousMonthRevenue,
        MetricName::UnreadNotifications,
        MetricName::PendingApplications,
        MetricName::TotalApplications,
        MetricName::AcceptedApplications,
        MetricName::TotalUsers,
        MetricName::AttendanceSampled,
        MetricName::AttendanceAttended,
        MetricName::RespondedApplications,
        MetricName::ResponseHoursTotal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::TotalPlayers => "totalPlayers",
            MetricName::ActivePlayers => "activePlayers",
            MetricName::InactivePlayers => "inactivePlayers",
            MetricName::PendingPayments => "pendingPayments",
            MetricName::MonthlyRevenue => "monthlyRevenue",
            MetricName::PreviousMonthRevenue => "previousMonthRevenue",
            MetricName::UnreadNotifications => "unreadNotifications",
            MetricName::PendingApplications => "pendingApplications",
            MetricName::TotalApplications => "totalApplications",
            MetricName::AcceptedApplications => "acceptedApplications",
            MetricName::TotalUsers => "totalUsers",
            MetricName::AttendanceSampled => "attendanceSampled",
            MetricName::AttendanceAttended => "attendanceAttended",
            MetricName::RespondedApplications => "respondedApplications",
            MetricName::ResponseHoursTotal => "responseHoursTotal",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single source fell back to its neutral default
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFailure {
    /// The query ran and reported an error
    Query { reason: String },
    /// The read did not finish inside its budget
    Timeout { after_ms: u64 },
    /// The task running the read panicked or was aborted
    Panicked { reason: String },
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFailure::Query { reason } => write!(f, "query failed: {}", reason),
            SourceFailure::Timeout { after_ms } => write!(f, "timed out after {}ms", after_ms),
            SourceFailure::Panicked { reason } => write!(f, "task panicked: {}", reason),
        }
    }
}

/// Values collected by one aggregation cycle
///
/// Every requested metric has a value: failed sources are recorded as zero and
/// listed in `failures`. Built once through [`RawMetricsBuilder`] and never
/// mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetrics {
    values: BTreeMap<MetricName, Decimal>,
    failures: BTreeMap<MetricName, SourceFailure>,
}

impl RawMetrics {
    pub fn builder() -> RawMetricsBuilder {
        RawMetricsBuilder::default()
    }

    /// Build directly from successful values
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = (MetricName, Decimal)>,
    {
        let mut builder = Self::builder();
        for (name, value) in values {
            builder.record(name, value);
        }
        builder.build()
    }

    /// Value for `name`, zero when the metric was not collected
    pub fn get(&self, name: MetricName) -> Decimal {
        self.values.get(&name).copied().unwrap_or(Decimal::ZERO)
    }

    /// Value for `name` truncated to a whole count
    pub fn count(&self, name: MetricName) -> i64 {
        self.get(name).trunc().to_i64().unwrap_or(0)
    }

    pub fn contains(&self, name: MetricName) -> bool {
        self.values.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn failures(&self) -> &BTreeMap<MetricName, SourceFailure> {
        &self.failures
    }

    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct RawMetricsBuilder {
    values: BTreeMap<MetricName, Decimal>,
    failures: BTreeMap<MetricName, SourceFailure>,
}

impl RawMetricsBuilder {
    pub fn record(&mut self, name: MetricName, value: Decimal) -> &mut Self {
        self.failures.remove(&name);
        self.values.insert(name, value);
        self
    }

    /// Record a failed source with the neutral default of zero
    pub fn record_failure(&mut self, name: MetricName, failure: SourceFailure) -> &mut Self {
        self.values.insert(name, Decimal::ZERO);
        self.failures.insert(name, failure);
        self
    }

    pub fn build(self) -> RawMetrics {
        RawMetrics {
            values: self.values,
            failures: self.failures,
        }
    }
}
