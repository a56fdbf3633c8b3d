use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Execution stats for one vertex.
#[derive(Debug, Clone, Serialize)]
pub struct VertexStats {
    pub vertex: String,
    pub tasks: usize,
    pub duration: Duration,
}

/// Snapshot of one completed graph run, serializable for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_tasks: usize,
    pub vertices: Vec<VertexStats>,
}

impl RunMetrics {
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
