//! Standard dashboard source catalog
//!
//! Maps every [`MetricName`] to the count or sum query that produces it.

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, Months, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::instrument;

use super::query::{CountQuery, Filter, MetricQuery, SumExpr, SumQuery, Table};
use super::{MetricSource, StoreReader};
use crate::cache::Clock;
use crate::domain::MetricName;
use crate::error::Result;

/// Calendar month relative to the current instant, in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonthWindow {
    /// `[start of this month, now)`
    Current,
    /// `[start of previous month, start of this month)`
    Previous,
}

/// Half-open bounds of `window` as seen from `now`
pub fn month_bounds(now: DateTime<Utc>, window: MonthWindow) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let first_of_month = today - Days::new(u64::from(today.day0()));
    let start_this = Utc.from_utc_datetime(&first_of_month.and_time(NaiveTime::MIN));

    match window {
        MonthWindow::Current => (start_this, now),
        MonthWindow::Previous => {
            let first_of_prev = first_of_month - Months::new(1);
            let start_prev = Utc.from_utc_datetime(&first_of_prev.and_time(NaiveTime::MIN));
            (start_prev, start_this)
        }
    }
}

/// Metric source answering one store query
pub struct StoreMetricSource {
    name: MetricName,
    query: MetricQuery,
    store: Arc<dyn StoreReader>,
    clock: Arc<dyn Clock>,
}

impl StoreMetricSource {
    pub fn new(
        name: MetricName,
        query: MetricQuery,
        store: Arc<dyn StoreReader>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            query,
            store,
            clock,
        }
    }

    pub fn query(&self) -> &MetricQuery {
        &self.query
    }
}

#[async_trait]
impl MetricSource for StoreMetricSource {
    fn name(&self) -> MetricName {
        self.name
    }

    #[instrument(skip(self), fields(source = %self.name))]
    async fn fetch(&self) -> Result<Decimal> {
        match self.query.resolve(self.clock.now()) {
            MetricQuery::Count(q) => Ok(Decimal::from(self.store.count(&q).await?)),
            MetricQuery::Sum(q) => self.store.sum(&q).await,
        }
    }
}

/// Query behind each dashboard metric
pub fn query_for(name: MetricName, attendance_sample_size: u32) -> MetricQuery {
    use MetricName::*;

    match name {
        TotalPlayers => MetricQuery::Count(CountQuery::new(Table::Players)),
        ActivePlayers => MetricQuery::Count(
            CountQuery::new(Table::Players).filter(Filter::eq("status", "active")),
        ),
        InactivePlayers => MetricQuery::Count(
            CountQuery::new(Table::Players).filter(Filter::eq("status", "inactive")),
        ),
        PendingPayments => MetricQuery::Count(
            CountQuery::new(Table::Orders).filter(Filter::eq("payment_status", "pending")),
        ),
        MonthlyRevenue => paid_revenue(MonthWindow::Current),
        PreviousMonthRevenue => paid_revenue(MonthWindow::Previous),
        UnreadNotifications => MetricQuery::Count(
            CountQuery::new(Table::Notifications).filter(Filter::flag("read", false)),
        ),
        PendingApplications => MetricQuery::Count(
            CountQuery::new(Table::Applications).filter(Filter::eq("status", "pending")),
        ),
        TotalApplications => MetricQuery::Count(CountQuery::new(Table::Applications)),
        AcceptedApplications => MetricQuery::Count(
            CountQuery::new(Table::Applications).filter(Filter::eq("status", "accepted")),
        ),
        TotalUsers => MetricQuery::Count(CountQuery::new(Table::Users)),
        AttendanceSampled => MetricQuery::Count(
            CountQuery::new(Table::Attendance).recent(attendance_sample_size),
        ),
        AttendanceAttended => MetricQuery::Count(
            CountQuery::new(Table::Attendance)
                .recent(attendance_sample_size)
                .filter(Filter::flag("attended", true)),
        ),
        RespondedApplications => MetricQuery::Count(
            CountQuery::new(Table::Applications).filter(Filter::not_null("reviewed_at")),
        ),
        ResponseHoursTotal => MetricQuery::Sum(
            SumQuery::new(
                Table::Applications,
                SumExpr::HoursBetween {
                    start: "created_at",
                    end: "reviewed_at",
                },
            )
            .filter(Filter::not_null("reviewed_at")),
        ),
    }
}

// Currency is ignored: amounts in different currencies are summed as-is.
fn paid_revenue(window: MonthWindow) -> MetricQuery {
    MetricQuery::Sum(
        SumQuery::new(Table::Orders, SumExpr::Column("total"))
            .filter(Filter::eq("payment_status", "paid"))
            .filter(Filter::in_month("created_at", window)),
    )
}

/// Every source the dashboard snapshot is built from
pub fn dashboard_sources(
    store: Arc<dyn StoreReader>,
    clock: Arc<dyn Clock>,
    attendance_sample_size: u32,
) -> Vec<Arc<dyn MetricSource>> {
    MetricName::ALL
        .iter()
        .map(|&name| {
            Arc::new(StoreMetricSource::new(
                name,
                query_for(name, attendance_sample_size),
                store.clone(),
                clock.clone(),
            )) as Arc<dyn MetricSource>
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::error::KpiError;
    use crate::sources::MockStoreReader;
    use rust_decimal_macros::dec;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_month_bounds_current() {
        let now = at(2024, 5, 17, 9);
        assert_eq!(
            month_bounds(now, MonthWindow::Current),
            (at(2024, 5, 1, 0), now)
        );
    }

    #[test]
    fn test_month_bounds_previous_across_year() {
        let now = at(2024, 1, 3, 12);
        assert_eq!(
            month_bounds(now, MonthWindow::Previous),
            (at(2023, 12, 1, 0), at(2024, 1, 1, 0))
        );
    }

    #[test]
    fn test_month_bounds_first_instant_of_month() {
        let now = at(2024, 3, 1, 0);
        let (from, to) = month_bounds(now, MonthWindow::Current);
        assert_eq!(from, to);
        assert_eq!(
            month_bounds(now, MonthWindow::Previous),
            (at(2024, 2, 1, 0), at(2024, 3, 1, 0))
        );
    }

    #[test]
    fn test_catalog_covers_every_metric_once() {
        let clock = Arc::new(ManualClock::new(at(2024, 5, 17, 9)));
        let sources = dashboard_sources(Arc::new(MockStoreReader::new()), clock, 500);
        let names: Vec<_> = sources.iter().map(|s| s.name()).collect();
        assert_eq!(names, MetricName::ALL.to_vec());
    }

    #[test]
    fn test_attendance_queries_share_sample_cap() {
        for name in [MetricName::AttendanceSampled, MetricName::AttendanceAttended] {
            match query_for(name, 500) {
                MetricQuery::Count(q) => {
                    assert_eq!(q.table, Table::Attendance);
                    assert_eq!(q.recent_limit, Some(500));
                }
                other => panic!("unexpected query {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_revenue_source_resolves_window_from_clock() {
        let now = at(2024, 5, 17, 9);
        let mut store = MockStoreReader::new();
        store
            .expect_sum()
            .withf(move |q| {
                q.table == Table::Orders
                    && q.filters.contains(&Filter::Between {
                        column: "created_at",
                        from: at(2024, 4, 1, 0),
                        to: at(2024, 5, 1, 0),
                    })
            })
            .times(1)
            .returning(|_| Ok(dec!(55000)));

        let source = StoreMetricSource::new(
            MetricName::PreviousMonthRevenue,
            query_for(MetricName::PreviousMonthRevenue, 500),
            Arc::new(store),
            Arc::new(ManualClock::new(now)),
        );

        assert_eq!(source.fetch().await.unwrap(), dec!(55000));
    }

    #[tokio::test]
    async fn test_count_source_propagates_store_error() {
        let mut store = MockStoreReader::new();
        store
            .expect_count()
            .returning(|_| Err(KpiError::source_failed("players", "relation does not exist")));

        let source = StoreMetricSource::new(
            MetricName::TotalPlayers,
            query_for(MetricName::TotalPlayers, 500),
            Arc::new(store),
            Arc::new(ManualClock::new(at(2024, 5, 17, 9))),
        );

        assert!(source.fetch().await.is_err());
    }
}
