//! Fan-out aggregation over metric sources
//!
//! All sources of a cycle run concurrently, each on its own task with its own
//! timeout. A failing, slow or panicking source is recorded as zero and the
//! cycle still produces a complete [`RawMetrics`]. The cycle itself fails only
//! when it cannot be scheduled, is cancelled, or every one of several sources
//! failed.

use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::{RawMetrics, SourceFailure};
use crate::error::{KpiError, Result};
use crate::services::DashboardMetrics;
use crate::sources::MetricSource;

pub struct FanOutAggregator {
    sources: Vec<Arc<dyn MetricSource>>,
    source_timeout: Duration,
    metrics: Option<Arc<DashboardMetrics>>,
}

impl FanOutAggregator {
    /// Create an aggregator; source names must be unique
    pub fn new(sources: Vec<Arc<dyn MetricSource>>, source_timeout: Duration) -> Result<Self> {
        if sources.is_empty() {
            return Err(KpiError::Validation(
                "aggregator needs at least one metric source".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for source in &sources {
            if !seen.insert(source.name()) {
                return Err(KpiError::Validation(format!(
                    "duplicate metric source: {}",
                    source.name()
                )));
            }
        }

        Ok(Self {
            sources,
            source_timeout,
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<DashboardMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Run every source once and join on all of them
    pub async fn collect(&self, cancel: &CancellationToken) -> Result<RawMetrics> {
        if cancel.is_cancelled() {
            return Err(KpiError::Cancelled);
        }
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| KpiError::CycleFailed(format!("cannot schedule sources: {}", e)))?;

        let started = Instant::now();
        let timeout = self.source_timeout;
        let mut names = Vec::with_capacity(self.sources.len());
        let mut handles = Vec::with_capacity(self.sources.len());

        for source in &self.sources {
            let source = source.clone();
            names.push(source.name());
            handles.push(runtime.spawn(async move { read_source(source, timeout).await }));
        }
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let joined = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                for abort in aborts {
                    abort.abort();
                }
                debug!("aggregation cycle cancelled");
                return Err(KpiError::Cancelled);
            }
            joined = join_all(handles) => joined,
        };

        let mut builder = RawMetrics::builder();
        for (name, outcome) in names.into_iter().zip(joined) {
            let failure = match outcome {
                Ok(Ok(value)) => {
                    builder.record(name, value);
                    continue;
                }
                Ok(Err(failure)) => {
                    warn!(source = %name, error = %failure, "metric source failed, using 0");
                    failure
                }
                Err(e) => {
                    error!(source = %name, error = %e, "metric source task panicked, using 0");
                    SourceFailure::Panicked {
                        reason: e.to_string(),
                    }
                }
            };

            if let Some(metrics) = &self.metrics {
                metrics.inc_source_failures();
                if matches!(failure, SourceFailure::Timeout { .. }) {
                    metrics.inc_source_timeouts();
                }
            }
            builder.record_failure(name, failure);
        }

        let raw = builder.build();
        if raw.len() > 1 && raw.failures().len() == raw.len() {
            return Err(KpiError::CycleFailed(format!(
                "all {} metric sources failed",
                raw.len()
            )));
        }
        info!(
            sources = raw.len(),
            failed = raw.failures().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregation cycle collected"
        );
        Ok(raw)
    }
}

async fn read_source(
    source: Arc<dyn MetricSource>,
    timeout: Duration,
) -> std::result::Result<Decimal, SourceFailure> {
    let started = Instant::now();
    match tokio::time::timeout(timeout, source.fetch()).await {
        Ok(Ok(value)) => {
            debug!(
                source = %source.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "metric source read"
            );
            Ok(value)
        }
        Ok(Err(e)) => Err(SourceFailure::Query {
            reason: e.to_string(),
        }),
        Err(_) => Err(SourceFailure::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    }
}
