pub mod aggregator;
pub mod calculator;
pub mod dashboard;
pub mod metrics;

pub use aggregator::FanOutAggregator;
pub use calculator::DerivedMetricsCalculator;
pub use dashboard::{DashboardService, DashboardServiceConfig};
pub use metrics::DashboardMetrics;
