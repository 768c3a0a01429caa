use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::adapters::PostgresStore;
use crate::services::DashboardService;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<DashboardService>,

    /// Database probed by `/health`; absent when the service runs on in-memory sources
    pub store: Option<PostgresStore>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: Arc<DashboardService>) -> Self {
        Self {
            service,
            store: None,
            start_time: Utc::now(),
        }
    }

    pub fn with_store(mut self, store: PostgresStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
