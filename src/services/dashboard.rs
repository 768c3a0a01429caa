//! Dashboard snapshot service
//!
//! Owns the aggregator, the snapshot cache and the background refresh tasks.
//! `get()` never blocks on I/O while any snapshot is cached; only the first
//! read of an empty cache waits for a cycle, and every concurrent caller
//! shares that one cycle.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheKey, Checkout, Clock, RefreshTicket, SnapshotCache};
use crate::domain::{CacheState, DashboardSnapshot};
use crate::error::{KpiError, Result};
use crate::services::{DashboardMetrics, DerivedMetricsCalculator, FanOutAggregator};

/// Service-level options
#[derive(Debug, Clone)]
pub struct DashboardServiceConfig {
    /// Schedule a first cycle from `start()`
    pub warm_on_start: bool,
}

impl Default for DashboardServiceConfig {
    fn default() -> Self {
        Self {
            warm_on_start: true,
        }
    }
}

pub struct DashboardService {
    inner: Arc<Inner>,
    config: DashboardServiceConfig,
    tracker: TaskTracker,
    cancel: CancellationToken,
    started: AtomicBool,
}

/// State shared with refresh tasks
struct Inner {
    key: CacheKey,
    aggregator: FanOutAggregator,
    cache: Arc<SnapshotCache>,
    clock: Arc<dyn Clock>,
    metrics: Arc<DashboardMetrics>,
}

impl DashboardService {
    pub fn new(
        aggregator: FanOutAggregator,
        cache: Arc<SnapshotCache>,
        metrics: Arc<DashboardMetrics>,
        config: DashboardServiceConfig,
    ) -> Self {
        Self::with_key(CacheKey::dashboard(), aggregator, cache, metrics, config)
    }

    pub fn with_key(
        key: CacheKey,
        aggregator: FanOutAggregator,
        cache: Arc<SnapshotCache>,
        metrics: Arc<DashboardMetrics>,
        config: DashboardServiceConfig,
    ) -> Self {
        let clock = cache.clock();
        Self {
            inner: Arc::new(Inner {
                key,
                aggregator,
                cache,
                clock,
                metrics,
            }),
            config,
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn metrics(&self) -> Arc<DashboardMetrics> {
        self.inner.metrics.clone()
    }

    pub fn key(&self) -> &CacheKey {
        &self.inner.key
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Begin serving; schedules a warm-up cycle when configured
    pub async fn start(&self) -> Result<()> {
        if self.is_stopped() {
            return Err(KpiError::ServiceStopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("dashboard service already started");
            return Ok(());
        }

        info!(key = %self.inner.key, "dashboard service started");
        if self.config.warm_on_start {
            if let Checkout::Miss {
                refresh: Some(ticket),
                ..
            } = self.inner.cache.checkout(&self.inner.key).await
            {
                self.spawn_refresh(ticket);
            }
        }
        Ok(())
    }

    /// Cancel in-flight cycles and wait for every refresh task to finish
    ///
    /// A stopped service keeps serving its last snapshot but never starts
    /// another cycle.
    pub async fn stop(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!(key = %self.inner.key, "stopping dashboard service");
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!(key = %self.inner.key, "dashboard service stopped");
    }

    /// Current dashboard snapshot
    pub async fn get(&self) -> Result<Arc<DashboardSnapshot>> {
        loop {
            if self.is_stopped() {
                return self.last_snapshot().await;
            }

            return match self.inner.cache.checkout(&self.inner.key).await {
                Checkout::Fresh(entry) => {
                    self.inner.metrics.inc_fresh_hits();
                    Ok(entry.snapshot)
                }
                Checkout::Stale { entry, refresh } => {
                    self.inner.metrics.inc_stale_hits();
                    if let Some(ticket) = refresh {
                        debug!(
                            key = %self.inner.key,
                            age_secs = entry.snapshot.age_secs(self.inner.clock.now()),
                            "serving stale snapshot, refreshing in background"
                        );
                        self.spawn_refresh(ticket);
                    }
                    Ok(entry.snapshot)
                }
                Checkout::Miss { waiter, .. } if waiter.is_superseded() => {
                    debug!(key = %self.inner.key, "waiting for invalidated cycle to finish");
                    waiter.settle().await;
                    continue;
                }
                Checkout::Miss { refresh, waiter } => {
                    self.inner.metrics.inc_misses();
                    if let Some(ticket) = refresh {
                        self.spawn_refresh(ticket);
                    }
                    waiter.wait().await
                }
            };
        }
    }

    /// Run (or join) a refresh and wait for its result
    pub async fn refresh_now(&self) -> Result<Arc<DashboardSnapshot>> {
        loop {
            if self.is_stopped() {
                return Err(KpiError::ServiceStopped);
            }
            let (ticket, waiter) = self.inner.cache.claim_refresh(&self.inner.key).await;
            if let Some(ticket) = ticket {
                self.spawn_refresh(ticket);
            } else if waiter.is_superseded() {
                waiter.settle().await;
                continue;
            }
            return waiter.wait().await;
        }
    }

    /// Time as seen by the cache's TTL decisions
    pub fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    pub async fn state(&self) -> CacheState {
        self.inner.cache.state(&self.inner.key).await
    }

    pub async fn peek(&self) -> Option<CacheEntry> {
        self.inner.cache.peek(&self.inner.key).await
    }

    /// Drop the cached snapshot so the next read recomputes it
    pub async fn invalidate(&self) {
        self.inner.cache.invalidate(&self.inner.key).await;
    }

    /// Wait until no refresh task is running
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        if !self.is_stopped() {
            self.tracker.reopen();
        }
    }

    async fn last_snapshot(&self) -> Result<Arc<DashboardSnapshot>> {
        self.inner
            .cache
            .peek(&self.inner.key)
            .await
            .map(|entry| entry.snapshot)
            .ok_or(KpiError::ServiceStopped)
    }

    fn spawn_refresh(&self, ticket: RefreshTicket) {
        let inner = self.inner.clone();
        let cancel = self.cancel.child_token();
        self.tracker.spawn(async move {
            inner.refresh(ticket, cancel).await;
        });
    }
}

impl Inner {
    async fn refresh(&self, ticket: RefreshTicket, cancel: CancellationToken) {
        let cycle = ticket.cycle();
        self.metrics.inc_cycles_started();
        let started = Instant::now();

        match self.run_cycle(cycle, &cancel).await {
            Ok(snapshot) => {
                let degraded = snapshot.degraded_sources.len();
                let (_, installed) = self.cache.complete(ticket, snapshot).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_cycle_completed(elapsed_ms);
                if installed {
                    info!(
                        key = %self.key,
                        cycle,
                        degraded,
                        elapsed_ms,
                        "dashboard snapshot refreshed"
                    );
                } else {
                    debug!(key = %self.key, cycle, "refresh result superseded");
                    self.metrics.inc_discarded_results();
                }
            }
            Err(e) => {
                self.metrics.inc_cycles_failed();
                warn!(key = %self.key, cycle, error = %e, "dashboard refresh failed");
                let reason = match e {
                    KpiError::CycleFailed(reason) => reason,
                    other => other.to_string(),
                };
                self.cache.abandon(ticket, reason).await;
            }
        }
    }

    async fn run_cycle(&self, cycle: u64, cancel: &CancellationToken) -> Result<DashboardSnapshot> {
        let raw = self.aggregator.collect(cancel).await?;
        Ok(DerivedMetricsCalculator::snapshot(
            &raw,
            cycle,
            self.clock.now(),
        ))
    }
}
