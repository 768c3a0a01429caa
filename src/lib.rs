pub mod adapters;
pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod sources;

pub use cache::{CacheKey, Clock, ManualClock, SnapshotCache, SystemClock};
pub use config::AppConfig;
pub use domain::{CacheState, DashboardSnapshot, DerivedMetrics, MetricName, RawMetrics};
pub use error::{KpiError, Result};
pub use services::{
    DashboardMetrics, DashboardService, DashboardServiceConfig, DerivedMetricsCalculator,
    FanOutAggregator,
};
pub use sources::{MetricSource, StoreReader};
