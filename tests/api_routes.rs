use academy_kpi::api::{create_router, AppState};
use academy_kpi::cache::{ManualClock, SnapshotCache};
use academy_kpi::domain::MetricName;
use academy_kpi::error::{KpiError, Result};
use academy_kpi::services::{
    DashboardMetrics, DashboardService, DashboardServiceConfig, FanOutAggregator,
};
use academy_kpi::sources::MetricSource;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct FixedSource(MetricName, Option<Decimal>);

#[async_trait]
impl MetricSource for FixedSource {
    fn name(&self) -> MetricName {
        self.0
    }

    async fn fetch(&self) -> Result<Decimal> {
        self.1
            .ok_or_else(|| KpiError::source_failed(self.0.as_str(), "relation does not exist"))
    }
}

fn service(values: &[(MetricName, Option<Decimal>)]) -> Arc<DashboardService> {
    service_at(values, Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 15, 9, 0, 0).unwrap(),
    )))
}

fn service_at(
    values: &[(MetricName, Option<Decimal>)],
    clock: Arc<ManualClock>,
) -> Arc<DashboardService> {
    let sources = values
        .iter()
        .map(|&(name, value)| Arc::new(FixedSource(name, value)) as Arc<dyn MetricSource>)
        .collect();
    let aggregator = FanOutAggregator::new(sources, Duration::from_secs(1)).unwrap();
    let cache = Arc::new(SnapshotCache::new(chrono::Duration::seconds(60), clock));
    Arc::new(DashboardService::new(
        aggregator,
        cache,
        Arc::new(DashboardMetrics::new()),
        DashboardServiceConfig::default(),
    ))
}

fn healthy() -> Arc<DashboardService> {
    service(&[
        (MetricName::TotalPlayers, Some(dec!(200))),
        (MetricName::ActivePlayers, Some(dec!(150))),
        (MetricName::TotalApplications, Some(dec!(0))),
        (MetricName::PendingPayments, None),
    ])
}

async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn send_json(router: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(router, method, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn dashboard_returns_camel_case_snapshot() {
    let router = create_router(AppState::new(healthy()));

    let (status, body) = send_json(&router, "GET", "/api/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPlayers"], 200);
    assert_eq!(body["retentionRate"], 75);
    assert_eq!(body["conversionRate"], 0);
    assert_eq!(body["pendingPayments"], 0);
    assert_eq!(body["degradedSources"][0], "pendingPayments");
    assert_eq!(body["cycle"], 1);
}

#[tokio::test]
async fn state_reports_fresh_after_first_read() {
    let router = create_router(AppState::new(healthy()));

    let (_, body) = send_json(&router, "GET", "/api/dashboard/state").await;
    assert_eq!(body["state"], "empty");
    assert!(body["cycle"].is_null());

    send(&router, "GET", "/api/dashboard").await;
    let (status, body) = send_json(&router, "GET", "/api/dashboard/state").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "fresh");
    assert_eq!(body["key"], "admin-dashboard");
    assert_eq!(body["cycle"], 1);
    assert_eq!(body["stopped"], false);
}

#[tokio::test]
async fn state_age_follows_the_cache_clock() {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 5, 15, 9, 0, 0).unwrap(),
    ));
    let service = service_at(&[(MetricName::TotalPlayers, Some(dec!(200)))], clock.clone());
    let router = create_router(AppState::new(service));
    send(&router, "GET", "/api/dashboard").await;

    clock.advance(chrono::Duration::seconds(45));
    let (_, body) = send_json(&router, "GET", "/api/dashboard/state").await;
    assert_eq!(body["ageSecs"], 45);
    assert_eq!(body["state"], "fresh");

    clock.advance(chrono::Duration::seconds(30));
    let (_, body) = send_json(&router, "GET", "/api/dashboard/state").await;
    assert_eq!(body["ageSecs"], 75);
    assert_eq!(body["state"], "stale");
}

#[tokio::test]
async fn refresh_runs_a_new_cycle() {
    let router = create_router(AppState::new(healthy()));
    send(&router, "GET", "/api/dashboard").await;

    let (status, body) = send_json(&router, "POST", "/api/dashboard/refresh").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cycle"], 2);
}

#[tokio::test]
async fn dashboard_unavailable_without_any_snapshot() {
    let service = service(&[
        (MetricName::TotalPlayers, None),
        (MetricName::ActivePlayers, None),
    ]);
    let router = create_router(AppState::new(service));

    let (status, body) = send_json(&router, "GET", "/api/dashboard").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("all 2 metric sources failed"));
}

#[tokio::test]
async fn stopped_service_still_serves_last_snapshot() {
    let service = healthy();
    let router = create_router(AppState::new(service.clone()));
    send(&router, "GET", "/api/dashboard").await;
    service.stop().await;

    let (status, body) = send_json(&router, "GET", "/api/dashboard").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPlayers"], 200);

    let (status, _) = send(&router, "POST", "/api/dashboard/refresh").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send_json(&router, "GET", "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn health_without_database() {
    let router = create_router(AppState::new(healthy()));

    let (status, body) = send_json(&router, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], "not_configured");
    assert_eq!(body["cache"], "empty");
}

#[tokio::test]
async fn metrics_exposes_cache_counters() {
    let router = create_router(AppState::new(healthy()));
    send(&router, "GET", "/api/dashboard").await;
    send(&router, "GET", "/api/dashboard").await;

    let (status, body) = send(&router, "GET", "/metrics").await;
    let text = String::from_utf8(body).unwrap();
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("academy_kpi_cache_misses_total 1\n"));
    assert!(text.contains("academy_kpi_cache_fresh_hits_total 1\n"));
    assert!(text.contains("academy_kpi_cycles_completed_total 1\n"));
}
