use serde::{Deserialize, Serialize};

/// Configuration for a [`TaskQueue`](super::TaskQueue)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Upper bound on queued (not yet started) entries; unbounded when unset
    #[serde(default)]
    pub max_pending: Option<usize>,
}

impl QueueConfig {
    pub fn bounded(max_pending: usize) -> Self {
        Self {
            max_pending: Some(max_pending),
        }
    }
}
