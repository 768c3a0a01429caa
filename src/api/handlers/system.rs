use axum::{extract::State, http::header, http::StatusCode, response::IntoResponse, Json};

use crate::api::{state::AppState, types::*};

/// GET /health -- liveness plus database reachability when a store is attached
pub async fn health_handler(
    State(state): State<AppState>,
) -> std::result::Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let db_status = match &state.store {
        Some(store) => match store.ping().await {
            Ok(()) => "connected",
            Err(_) => "disconnected",
        },
        None => "not_configured",
    };

    let ok = db_status != "disconnected" && !state.service.is_stopped();
    let resp = HealthResponse {
        status: if ok { "ok" } else { "degraded" }.to_string(),
        db: db_status.to_string(),
        cache: state.service.state().await,
        uptime_secs: state.uptime_seconds(),
    };

    if ok {
        Ok(Json(resp))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(resp)))
    }
}

/// GET /metrics -- Prometheus text exposition
pub async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.service.metrics().prometheus(),
    )
}
