use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the aggregation engine and snapshot cache
#[derive(Debug, Default)]
pub struct DashboardMetrics {
    /// Aggregation cycles started
    pub cycles_started: AtomicU64,
    /// Cycles that produced a snapshot
    pub cycles_completed: AtomicU64,
    /// Cycles that failed or were cancelled
    pub cycles_failed: AtomicU64,
    /// Individual source reads that fell back to zero
    pub source_failures: AtomicU64,
    /// Source reads that hit their timeout
    pub source_timeouts: AtomicU64,
    /// Reads served from a fresh entry
    pub fresh_hits: AtomicU64,
    /// Reads served from a stale entry
    pub stale_hits: AtomicU64,
    /// Reads that found no entry
    pub misses: AtomicU64,
    /// Completed cycles whose result was superseded
    pub discarded_results: AtomicU64,
    /// Duration of the most recent completed cycle
    last_cycle_ms: AtomicU64,
}

impl DashboardMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_cycles_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cycle_completed(&self, elapsed_ms: u64) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
        self.last_cycle_ms.store(elapsed_ms, Ordering::Relaxed);
    }

    pub fn inc_cycles_failed(&self) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_source_failures(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_source_timeouts(&self) {
        self.source_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fresh_hits(&self) {
        self.fresh_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_stale_hits(&self) {
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_misses(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_discarded_results(&self) {
        self.discarded_results.fetch_add(1, Ordering::Relaxed);
    }

    pub fn last_cycle_ms(&self) -> u64 {
        self.last_cycle_ms.load(Ordering::Relaxed)
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycles_started.load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus format
    pub fn prometheus(&self) -> String {
        format!(
            r#"# HELP academy_kpi_cycles_started_total Aggregation cycles started
# TYPE academy_kpi_cycles_started_total counter
academy_kpi_cycles_started_total {}

# HELP academy_kpi_cycles_completed_total Aggregation cycles that produced a snapshot
# TYPE academy_kpi_cycles_completed_total counter
academy_kpi_cycles_completed_total {}

# HELP academy_kpi_cycles_failed_total Aggregation cycles that failed or were cancelled
# TYPE academy_kpi_cycles_failed_total counter
academy_kpi_cycles_failed_total {}

# HELP academy_kpi_source_failures_total Metric source reads defaulted to zero
# TYPE academy_kpi_source_failures_total counter
academy_kpi_source_failures_total {}

# HELP academy_kpi_source_timeouts_total Metric source reads that timed out
# TYPE academy_kpi_source_timeouts_total counter
academy_kpi_source_timeouts_total {}

# HELP academy_kpi_cache_fresh_hits_total Snapshot reads served fresh
# TYPE academy_kpi_cache_fresh_hits_total counter
academy_kpi_cache_fresh_hits_total {}

# HELP academy_kpi_cache_stale_hits_total Snapshot reads served stale
# TYPE academy_kpi_cache_stale_hits_total counter
academy_kpi_cache_stale_hits_total {}

# HELP academy_kpi_cache_misses_total Snapshot reads with no cached entry
# TYPE academy_kpi_cache_misses_total counter
academy_kpi_cache_misses_total {}

# HELP academy_kpi_discarded_results_total Cycle results superseded by a newer cycle
# TYPE academy_kpi_discarded_results_total counter
academy_kpi_discarded_results_total {}

# HELP academy_kpi_last_cycle_duration_ms Duration of the last completed cycle
# TYPE academy_kpi_last_cycle_duration_ms gauge
academy_kpi_last_cycle_duration_ms {}
"#,
            self.cycles_started.load(Ordering::Relaxed),
            self.cycles_completed.load(Ordering::Relaxed),
            self.cycles_failed.load(Ordering::Relaxed),
            self.source_failures.load(Ordering::Relaxed),
            self.source_timeouts.load(Ordering::Relaxed),
            self.fresh_hits.load(Ordering::Relaxed),
            self.stale_hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
            self.discarded_results.load(Ordering::Relaxed),
            self.last_cycle_ms.load(Ordering::Relaxed),
        )
    }
}
