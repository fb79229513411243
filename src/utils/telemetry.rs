// file: src/utils/telemetry.rs
// description: operation timing and throughput reporting for pipeline commands
// reference: Production observability best practices

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::info;

/// Operation timer for performance tracking
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        info!("Starting operation: {}", operation);
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn checkpoint(&self, message: &str) {
        info!(
            "Operation checkpoint [{}]: {} at {:.2}s",
            self.operation,
            message,
            self.elapsed().as_secs_f64()
        );
    }

    pub fn finish_with_count(self, count: usize) -> PerformanceMetrics {
        let metrics = PerformanceMetrics::new(&self.operation, count, self.elapsed());
        info!("Completed operation: {}", metrics.format());
        metrics
    }
}

/// Performance metrics for operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub operation: String,
    pub count: usize,
    pub duration_ms: u64,
    pub throughput: f64, // items per second
    pub avg_item_time_ms: f64,
}

impl PerformanceMetrics {
    pub fn new(operation: &str, count: usize, duration: Duration) -> Self {
        let duration_ms = duration.as_millis() as u64;
        let duration_secs = duration.as_secs_f64();

        let throughput = if duration_secs > 0.0 {
            count as f64 / duration_secs
        } else {
            0.0
        };

        let avg_item_time_ms = if count > 0 {
            duration_ms as f64 / count as f64
        } else {
            0.0
        };

        Self {
            operation: operation.to_string(),
            count,
            duration_ms,
            throughput,
            avg_item_time_ms,
        }
    }

    pub fn format(&self) -> String {
        format!(
            "{}: {} items in {}ms ({:.2} items/sec, {:.2}ms per item)",
            self.operation, self.count, self.duration_ms, self.throughput, self.avg_item_time_ms
        )
    }
}
