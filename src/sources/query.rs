use chrono::{DateTime, Utc};

use super::catalog::{month_bounds, MonthWindow};

/// Tables the dashboard reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Players,
    Orders,
    Notifications,
    Applications,
    Users,
    Attendance,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Players => "players",
            Table::Orders => "orders",
            Table::Notifications => "notifications",
            Table::Applications => "applications",
            Table::Users => "users",
            Table::Attendance => "attendance",
        }
    }
}

/// Row predicate; column names are fixed in code, values are always bound
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Eq {
        column: &'static str,
        value: &'static str,
    },
    Flag {
        column: &'static str,
        value: bool,
    },
    NotNull {
        column: &'static str,
    },
    /// `column` in `[from, to)`
    Between {
        column: &'static str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    /// Calendar-month range resolved against the clock at fetch time
    InMonth {
        column: &'static str,
        window: MonthWindow,
    },
}

impl Filter {
    pub fn eq(column: &'static str, value: &'static str) -> Self {
        Filter::Eq { column, value }
    }

    pub fn flag(column: &'static str, value: bool) -> Self {
        Filter::Flag { column, value }
    }

    pub fn not_null(column: &'static str) -> Self {
        Filter::NotNull { column }
    }

    pub fn in_month(column: &'static str, window: MonthWindow) -> Self {
        Filter::InMonth { column, window }
    }

    fn resolve(&self, now: DateTime<Utc>) -> Filter {
        match self {
            Filter::InMonth { column, window } => {
                let (from, to) = month_bounds(now, *window);
                Filter::Between {
                    column: *column,
                    from,
                    to,
                }
            }
            other => other.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Filter::InMonth { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountQuery {
    pub table: Table,
    pub filters: Vec<Filter>,
    /// Restrict the count to the most recent `n` rows by `created_at`
    pub recent_limit: Option<u32>,
}

impl CountQuery {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            recent_limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn recent(mut self, limit: u32) -> Self {
        self.recent_limit = Some(limit);
        self
    }
}

/// Value summed by a [`SumQuery`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SumExpr {
    Column(&'static str),
    /// Hours elapsed between two timestamp columns
    HoursBetween {
        start: &'static str,
        end: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumQuery {
    pub table: Table,
    pub expr: SumExpr,
    pub filters: Vec<Filter>,
}

impl SumQuery {
    pub fn new(table: Table, expr: SumExpr) -> Self {
        Self {
            table,
            expr,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricQuery {
    Count(CountQuery),
    Sum(SumQuery),
}

impl MetricQuery {
    /// Replace clock-relative filters with concrete bounds
    pub fn resolve(&self, now: DateTime<Utc>) -> MetricQuery {
        match self {
            MetricQuery::Count(q) => MetricQuery::Count(CountQuery {
                table: q.table,
                filters: q.filters.iter().map(|f| f.resolve(now)).collect(),
                recent_limit: q.recent_limit,
            }),
            MetricQuery::Sum(q) => MetricQuery::Sum(SumQuery {
                table: q.table,
                expr: q.expr,
                filters: q.filters.iter().map(|f| f.resolve(now)).collect(),
            }),
        }
    }

    pub fn filters(&self) -> &[Filter] {
        match self {
            MetricQuery::Count(q) => &q.filters,
            MetricQuery::Sum(q) => &q.filters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_replaces_month_window() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap();
        let query = MetricQuery::Sum(
            SumQuery::new(Table::Orders, SumExpr::Column("total"))
                .filter(Filter::eq("payment_status", "paid"))
                .filter(Filter::in_month("created_at", MonthWindow::Previous)),
        );

        let resolved = query.resolve(now);
        assert!(resolved.filters().iter().all(Filter::is_resolved));
        assert_eq!(
            resolved.filters()[1],
            Filter::Between {
                column: "created_at",
                from: Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
                to: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            }
        );
        assert!(!query.filters()[1].is_resolved());
    }
}
