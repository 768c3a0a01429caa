use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::CacheState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub db: String,
    pub cache: CacheState,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStateResponse {
    pub key: String,
    pub state: CacheState,
    pub cycle: Option<u64>,
    pub computed_at: Option<DateTime<Utc>>,
    pub age_secs: Option<i64>,
    pub stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
