use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::warn;

use crate::api::{state::AppState, types::*};
use crate::domain::DashboardSnapshot;
use crate::error::KpiError;

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error_response(e: KpiError) -> ApiError {
    let status = if e.is_cycle_failure() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (
        status,
        Json(ErrorResponse {
            error: e.to_string(),
        }),
    )
}

/// GET /api/dashboard
///
/// Serves the cached snapshot, stale or not; 503 only when none can be produced.
pub async fn get_dashboard(
    State(state): State<AppState>,
) -> std::result::Result<Json<Arc<DashboardSnapshot>>, ApiError> {
    match state.service.get().await {
        Ok(snapshot) => Ok(Json(snapshot)),
        Err(e) => {
            warn!(error = %e, "no dashboard snapshot available");
            Err(error_response(e))
        }
    }
}

/// GET /api/dashboard/state
pub async fn get_dashboard_state(State(state): State<AppState>) -> Json<CacheStateResponse> {
    let service = &state.service;
    let entry = service.peek().await;
    let now = service.now();

    Json(CacheStateResponse {
        key: service.key().to_string(),
        state: service.state().await,
        cycle: entry.as_ref().map(|e| e.cycle()),
        computed_at: entry.as_ref().map(|e| e.computed_at),
        age_secs: entry.as_ref().map(|e| e.snapshot.age_secs(now)),
        stopped: service.is_stopped(),
    })
}

/// POST /api/dashboard/refresh
pub async fn refresh_dashboard(
    State(state): State<AppState>,
) -> std::result::Result<Json<Arc<DashboardSnapshot>>, ApiError> {
    state.service.refresh_now().await.map(Json).map_err(|e| {
        warn!(error = %e, "manual dashboard refresh failed");
        error_response(e)
    })
}
