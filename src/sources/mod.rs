//! Metric sources
//!
//! A metric source is one named, idempotent read against the data store. The
//! store itself is reached through [`StoreReader`], which only knows the two
//! primitive read shapes the dashboard needs: a row count and a column sum.

pub mod catalog;
pub mod query;

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::MetricName;
use crate::error::Result;

pub use catalog::{dashboard_sources, month_bounds, MonthWindow, StoreMetricSource};
pub use query::{CountQuery, Filter, MetricQuery, SumExpr, SumQuery, Table};

/// One named read producing a single number
///
/// Implementations must be safe to call concurrently and repeatedly, and must
/// report failures through the returned `Result` instead of panicking. Callers
/// enforce their own timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetricSource: Send + Sync {
    fn name(&self) -> MetricName;

    async fn fetch(&self) -> Result<Decimal>;
}

/// Primitive reads against the relational store
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreReader: Send + Sync {
    /// Number of rows matching the query's filters
    async fn count(&self, query: &CountQuery) -> Result<i64>;

    /// Sum of the query's expression over matching rows, zero when none match
    async fn sum(&self, query: &SumQuery) -> Result<Decimal>;
}
