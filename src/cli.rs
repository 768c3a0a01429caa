use clap::{Parser, Subcommand};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::PostgresStore;
use crate::api::{create_router, AppState};
use crate::cache::{SnapshotCache, SystemClock};
use crate::config::AppConfig;
use crate::domain::DashboardSnapshot;
use crate::error::{KpiError, Result};
use crate::services::{
    DashboardMetrics, DashboardService, DashboardServiceConfig, FanOutAggregator,
};
use crate::sources::dashboard_sources;

#[derive(Parser)]
#[command(name = "academy-kpi")]
#[command(author = "Academy Platform Team")]
#[command(version = "0.1.0")]
#[command(about = "Sports academy dashboard KPI aggregation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding default.toml and <ACADEMY_ENV>.toml
    #[arg(long, global = true, default_value = "config")]
    pub config_dir: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute one dashboard snapshot and print it
    Snapshot {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the dashboard periodically, refreshing through the cache
    Watch {
        /// Seconds between reads
        #[arg(long, default_value = "10")]
        interval_secs: u64,
    },
    /// Serve the dashboard over HTTP
    Serve {
        /// Listen port (overrides api.port)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate configuration and ping the database
    Check,
}

/// Load and validate configuration from `config_dir`
pub fn load_config(config_dir: &str) -> Result<AppConfig> {
    let config = AppConfig::load_from(config_dir)?;
    config
        .validate()
        .map_err(|errors| KpiError::Validation(errors.join("; ")))?;
    Ok(config)
}

/// Wire the Postgres-backed source catalog into a dashboard service
pub async fn build_service(config: &AppConfig) -> Result<(Arc<DashboardService>, PostgresStore)> {
    let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    let clock = Arc::new(SystemClock);
    let metrics = Arc::new(DashboardMetrics::new());

    let sources = dashboard_sources(
        Arc::new(store.clone()),
        clock.clone(),
        config.aggregator.attendance_sample_size,
    );
    let aggregator = FanOutAggregator::new(sources, config.aggregator.source_timeout())?
        .with_metrics(metrics.clone());
    let cache = Arc::new(SnapshotCache::new(config.cache.ttl(), clock));

    let service = DashboardService::new(
        aggregator,
        cache,
        metrics,
        DashboardServiceConfig {
            warm_on_start: config.cache.warm_on_start,
        },
    );
    Ok((Arc::new(service), store))
}

/// One cycle, printed as a table or JSON
pub async fn snapshot(service: &DashboardService, json: bool) -> Result<()> {
    let snapshot = service.get().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&*snapshot)?);
    } else {
        print_snapshot(&snapshot);
    }
    Ok(())
}

/// Read the dashboard every `interval` until `cancel` fires
pub async fn watch(service: &DashboardService, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match service.get().await {
            Ok(snapshot) => {
                println!(
                    "[cycle {}] {} | players {} (active {}) | revenue {} | retention {}% | growth {}%",
                    snapshot.cycle,
                    service.state().await,
                    snapshot.total_players,
                    snapshot.active_players,
                    snapshot.monthly_revenue,
                    snapshot.derived.retention_rate,
                    snapshot.derived.growth_rate,
                );
                if snapshot.is_degraded() {
                    warn!(sources = ?snapshot.degraded_sources, "snapshot degraded");
                }
            }
            Err(e) => warn!(error = %e, "dashboard unavailable"),
        }
    }
}

/// Serve the HTTP API until `shutdown` resolves
pub async fn serve(
    service: Arc<DashboardService>,
    store: PostgresStore,
    port: u16,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let router = create_router(AppState::new(service).with_store(store));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "dashboard API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

/// Config validation plus a database round trip
pub async fn check(config: &AppConfig) -> Result<()> {
    println!("Configuration OK");
    println!("  cache ttl:        {}s", config.cache.ttl_secs);
    println!("  source timeout:   {}ms", config.aggregator.source_timeout_ms);
    println!(
        "  attendance cap:   {}",
        config.aggregator.attendance_sample_size
    );

    let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    store.ping().await?;
    println!("Database OK");
    Ok(())
}

fn print_snapshot(s: &DashboardSnapshot) {
    println!("Dashboard (cycle {}, computed {})", s.cycle, s.computed_at);
    println!("  Players:               {}", s.total_players);
    println!("    active / inactive:   {} / {}", s.active_players, s.inactive_players);
    println!("  Pending payments:      {}", s.pending_payments);
    println!("  Monthly revenue:       {}", s.monthly_revenue);
    println!("  Previous month:        {}", s.previous_month_revenue);
    println!("  Unread notifications:  {}", s.unread_notifications);
    println!("  Pending applications:  {}", s.pending_applications);
    println!("  Users:                 {}", s.total_users);
    println!();
    println!("  Retention rate:        {}%", s.derived.retention_rate);
    println!("  Conversion rate:       {}%", s.derived.conversion_rate);
    println!("  ARPU:                  {}", s.derived.arpu);
    println!("  Average attendance:    {}%", s.derived.average_attendance);
    println!("  Response time:         {}h", s.derived.response_time);
    println!("  Growth rate:           {}%", s.derived.growth_rate);
    if s.is_degraded() {
        let names: Vec<&str> = s.degraded_sources.iter().map(|n| n.as_str()).collect();
        println!();
        println!("  Degraded sources (reported as 0): {}", names.join(", "));
    }
}
