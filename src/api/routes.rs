use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Dashboard endpoints
        .route("/api/dashboard", get(handlers::get_dashboard))
        .route("/api/dashboard/state", get(handlers::get_dashboard_state))
        .route("/api/dashboard/refresh", post(handlers::refresh_dashboard))
        // System endpoints
        .route("/metrics", get(handlers::metrics_handler))
        .route("/health", get(handlers::health_handler))
        .with_state(state)
        .layer(cors)
}
