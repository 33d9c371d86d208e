use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observability snapshot for one user or group of the rate limiter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitMetrics {
    /// Hits inside the current window
    pub total_hits: usize,
    /// Window capacity left before the group is limited
    pub remaining_hits: usize,
    /// Milliseconds since the most recent hit, if any
    pub time_since_last_hit_ms: Option<u64>,
    /// Mean spacing between consecutive hits in the window
    pub average_spacing_ms: Option<f64>,
    pub is_rate_limited: bool,
}

impl HitMetrics {
    pub fn new(
        total_hits: usize,
        max_hits: usize,
        time_since_last_hit: Option<Duration>,
        average_spacing: Option<Duration>,
    ) -> Self {
        Self {
            total_hits,
            remaining_hits: max_hits.saturating_sub(total_hits),
            time_since_last_hit_ms: time_since_last_hit.map(|d| d.as_millis() as u64),
            average_spacing_ms: average_spacing.map(|d| d.as_micros() as f64 / 1000.0),
            is_rate_limited: total_hits >= max_hits,
        }
    }
}

/// Aggregate counts over the whole limiter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterStats {
    pub users: usize,
    pub groups: usize,
    /// Hits still inside their window, across all groups
    pub hits_in_window: usize,
}
