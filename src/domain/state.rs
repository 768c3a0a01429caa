use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one snapshot cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    /// No snapshot computed yet (a first cycle may be running)
    Empty,
    /// Snapshot younger than the TTL
    Fresh,
    /// Snapshot past its TTL, no refresh running
    Stale,
    /// Snapshot past its TTL, one background refresh running
    Refreshing,
}

impl CacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Empty => "empty",
            CacheState::Fresh => "fresh",
            CacheState::Stale => "stale",
            CacheState::Refreshing => "refreshing",
        }
    }

    /// Check if this state can transition to another state
    pub fn can_transition_to(&self, target: CacheState) -> bool {
        use CacheState::*;

        match (self, target) {
            // First cycle completes
            (Empty, Fresh) => true,
            // First cycle took longer than the TTL
            (Empty, Stale) => true,

            // TTL elapses
            (Fresh, Stale) => true,
            // Manual refresh of a fresh entry
            (Fresh, Refreshing) => true,

            // Stale read schedules a refresh
            (Stale, Refreshing) => true,

            // Refresh succeeded
            (Refreshing, Fresh) => true,
            // Refresh failed, old entry kept
            (Refreshing, Stale) => true,

            // Invalidation drops the entry
            (Fresh | Stale | Refreshing, Empty) => true,

            _ => false,
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
