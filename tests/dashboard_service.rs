use academy_kpi::cache::{ManualClock, SnapshotCache};
use academy_kpi::domain::{CacheState, MetricName};
use academy_kpi::error::{KpiError, Result};
use academy_kpi::services::{
    DashboardMetrics, DashboardService, DashboardServiceConfig, FanOutAggregator,
};
use academy_kpi::sources::MetricSource;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::future::join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

/// Knobs shared by every source of one test service
#[derive(Default)]
struct Script {
    calls: AtomicU64,
    failing: AtomicBool,
    delay_ms: AtomicU64,
    running: AtomicU64,
    peak_running: AtomicU64,
}

struct ScriptedSource {
    name: MetricName,
    value: Decimal,
    script: Arc<Script>,
    /// Extra latency for this source only
    stall: Option<Duration>,
}

#[async_trait]
impl MetricSource for ScriptedSource {
    fn name(&self) -> MetricName {
        self.name
    }

    async fn fetch(&self) -> Result<Decimal> {
        self.script.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.script.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.script.peak_running.fetch_max(running, Ordering::SeqCst);
        let delay = self.script.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        self.script.running.fetch_sub(1, Ordering::SeqCst);
        if self.script.failing.load(Ordering::SeqCst) {
            return Err(KpiError::source_failed(self.name.as_str(), "connection refused"));
        }
        Ok(self.value)
    }
}

struct Harness {
    service: DashboardService,
    clock: Arc<ManualClock>,
    script: Arc<Script>,
    metrics: Arc<DashboardMetrics>,
}

fn harness(values: &[(MetricName, Decimal)], stalled: Option<(MetricName, Duration)>) -> Harness {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 15, 9, 0, 0).unwrap(),
    ));
    let script = Arc::new(Script::default());
    let metrics = Arc::new(DashboardMetrics::new());

    let sources: Vec<Arc<dyn MetricSource>> = values
        .iter()
        .map(|&(name, value)| {
            Arc::new(ScriptedSource {
                name,
                value,
                script: script.clone(),
                stall: stalled.filter(|(n, _)| *n == name).map(|(_, d)| d),
            }) as Arc<dyn MetricSource>
        })
        .collect();

    let aggregator = FanOutAggregator::new(sources, Duration::from_secs(5))
        .unwrap()
        .with_metrics(metrics.clone());
    let cache = Arc::new(SnapshotCache::new(chrono::Duration::seconds(60), clock.clone()));
    let service = DashboardService::new(
        aggregator,
        cache,
        metrics.clone(),
        DashboardServiceConfig {
            warm_on_start: false,
        },
    );

    Harness {
        service,
        clock,
        script,
        metrics,
    }
}

fn admin_dashboard_values() -> Vec<(MetricName, Decimal)> {
    vec![
        (MetricName::TotalPlayers, dec!(200)),
        (MetricName::ActivePlayers, dec!(150)),
        (MetricName::InactivePlayers, dec!(50)),
        (MetricName::PendingPayments, dec!(7)),
        (MetricName::MonthlyRevenue, dec!(68000)),
        (MetricName::PreviousMonthRevenue, dec!(55000)),
        (MetricName::UnreadNotifications, dec!(3)),
        (MetricName::PendingApplications, dec!(4)),
    ]
}

#[tokio::test]
async fn fresh_reads_return_the_same_snapshot() {
    let h = harness(&admin_dashboard_values(), None);

    let first = assert_ok!(h.service.get().await);
    h.clock.advance(chrono::Duration::seconds(59));
    let second = assert_ok!(h.service.get().await);

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(h.metrics.cycles_started(), 1);
    assert_eq!(h.metrics.fresh_hits.load(Ordering::Relaxed), 1);
    assert_eq!(h.service.state().await, CacheState::Fresh);
}

#[tokio::test(start_paused = true)]
async fn concurrent_first_reads_share_one_cycle() {
    let h = harness(&admin_dashboard_values(), None);
    h.script.delay_ms.store(200, Ordering::SeqCst);

    let results = join_all((0..16).map(|_| h.service.get())).await;
    let snapshots: Vec<_> = results.into_iter().map(|r| r.unwrap()).collect();

    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
    assert_eq!(h.metrics.cycles_started(), 1);
    assert_eq!(h.script.calls.load(Ordering::SeqCst), 8);
}

#[tokio::test(start_paused = true)]
async fn concurrent_reads_after_expiry_start_one_refresh() {
    let h = harness(&admin_dashboard_values(), None);
    let original = assert_ok!(h.service.get().await);

    h.clock.advance(chrono::Duration::seconds(61));
    h.script.delay_ms.store(500, Ordering::SeqCst);

    let results = join_all((0..16).map(|_| h.service.get())).await;
    for snapshot in results {
        // Stale reads never wait for the refresh
        assert!(Arc::ptr_eq(&snapshot.unwrap(), &original));
    }
    assert_eq!(h.service.state().await, CacheState::Refreshing);

    h.service.wait_idle().await;
    assert_eq!(h.metrics.cycles_started(), 2);
    assert_eq!(h.metrics.stale_hits.load(Ordering::Relaxed), 16);

    let refreshed = assert_ok!(h.service.get().await);
    assert_eq!(refreshed.cycle, original.cycle + 1);
    assert_eq!(h.service.state().await, CacheState::Fresh);
}

#[tokio::test(start_paused = true)]
async fn refresh_now_joins_running_refresh() {
    let h = harness(&admin_dashboard_values(), None);
    assert_ok!(h.service.get().await);

    h.clock.advance(chrono::Duration::seconds(90));
    h.script.delay_ms.store(500, Ordering::SeqCst);
    assert_ok!(h.service.get().await);

    let joined = assert_ok!(h.service.refresh_now().await);
    assert_eq!(joined.cycle, 2);
    assert_eq!(h.metrics.cycles_started(), 2);
}

#[tokio::test]
async fn failed_refresh_keeps_previous_snapshot() {
    let h = harness(&admin_dashboard_values(), None);
    let original = assert_ok!(h.service.get().await);

    h.clock.advance(chrono::Duration::seconds(120));
    h.script.failing.store(true, Ordering::SeqCst);

    let served = assert_ok!(h.service.get().await);
    assert!(Arc::ptr_eq(&served, &original));
    h.service.wait_idle().await;

    let entry = h.service.peek().await.unwrap();
    assert!(Arc::ptr_eq(&entry.snapshot, &original));
    assert_eq!(h.metrics.cycles_failed.load(Ordering::Relaxed), 1);
    assert_eq!(h.service.state().await, CacheState::Stale);

    // The next stale read retries
    h.script.failing.store(false, Ordering::SeqCst);
    assert_ok!(h.service.get().await);
    h.service.wait_idle().await;
    assert_eq!(h.service.state().await, CacheState::Fresh);
    assert_eq!(h.metrics.cycles_started(), 3);
}

#[tokio::test]
async fn first_cycle_failure_reaches_the_caller() {
    let h = harness(&admin_dashboard_values(), None);
    h.script.failing.store(true, Ordering::SeqCst);

    assert!(matches!(
        h.service.get().await,
        Err(KpiError::CycleFailed(_))
    ));
    assert_eq!(h.service.state().await, CacheState::Empty);
}

#[tokio::test(start_paused = true)]
async fn timed_out_source_degrades_to_zero() {
    let h = harness(
        &admin_dashboard_values(),
        Some((MetricName::PendingPayments, Duration::from_secs(30))),
    );

    let snapshot = assert_ok!(h.service.get().await);

    assert_eq!(snapshot.pending_payments, 0);
    assert_eq!(snapshot.degraded_sources, vec![MetricName::PendingPayments]);
    assert_eq!(snapshot.total_players, 200);
    assert_eq!(snapshot.active_players, 150);
    assert_eq!(snapshot.inactive_players, 50);
    assert_eq!(snapshot.monthly_revenue, dec!(68000));
    assert_eq!(snapshot.previous_month_revenue, dec!(55000));
    assert_eq!(snapshot.unread_notifications, 3);
    assert_eq!(snapshot.pending_applications, 4);
    assert_eq!(snapshot.derived.retention_rate, 75);
    assert_eq!(snapshot.derived.growth_rate, 24);
    assert_eq!(snapshot.derived.arpu, 453);
    assert_eq!(h.metrics.source_timeouts.load(Ordering::Relaxed), 1);
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_in_flight_refresh() {
    let h = harness(&admin_dashboard_values(), None);
    let original = assert_ok!(h.service.get().await);

    h.clock.advance(chrono::Duration::seconds(61));
    h.script.delay_ms.store(60_000, Ordering::SeqCst);
    assert_ok!(h.service.get().await);

    h.service.stop().await;

    assert_eq!(h.metrics.cycles_failed.load(Ordering::Relaxed), 1);
    let served = assert_ok!(h.service.get().await);
    assert!(Arc::ptr_eq(&served, &original));
    assert!(h.service.is_stopped());
}

#[tokio::test(start_paused = true)]
async fn invalidate_during_refresh_never_overlaps_cycles() {
    let h = harness(&[(MetricName::TotalPlayers, dec!(200))], None);
    assert_ok!(h.service.get().await);

    h.clock.advance(chrono::Duration::seconds(61));
    h.script.delay_ms.store(500, Ordering::SeqCst);
    assert_ok!(h.service.get().await);
    assert_eq!(h.service.state().await, CacheState::Refreshing);

    h.service.invalidate().await;
    let recomputed = assert_ok!(h.service.get().await);

    assert_eq!(h.script.peak_running.load(Ordering::SeqCst), 1);
    assert_eq!(recomputed.cycle, 3);
    assert_eq!(h.metrics.cycles_started(), 3);
    assert_eq!(h.metrics.discarded_results.load(Ordering::Relaxed), 1);

    h.service.wait_idle().await;
    assert_eq!(h.service.peek().await.unwrap().cycle(), 3);
    assert_eq!(h.service.state().await, CacheState::Fresh);
}
