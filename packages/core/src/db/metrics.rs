//! Query Metrics Collection
//!
//! Every statement issued through [`DatabaseService`](super::DatabaseService)
//! is recorded here with its operation name and duration. The counters are
//! what tests use to pin query budgets (for example, that a memoized default
//! locale lookup hits the database at most once); `canopy-dev --metrics`
//! prints the report after a command.
//!
//! # Usage
//!
//! ```rust
//! use canopy_core::db::metrics::QueryMetrics;
//! use std::time::Duration;
//!
//! let metrics = QueryMetrics::new();
//! metrics.record("fetch_page", Duration::from_micros(120));
//! metrics.record("fetch_page", Duration::from_micros(80));
//!
//! assert_eq!(metrics.count_for("fetch_page"), 2);
//! println!("{}", metrics.generate_report());
//! ```

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Thread-safe collector of query timings
#[derive(Debug, Default)]
pub struct QueryMetrics {
    samples: Mutex<Vec<QueryMetric>>,
}

/// Single recorded statement
#[derive(Debug, Clone)]
pub struct QueryMetric {
    /// Name of the operation (e.g., "fetch_page", "update_url_path")
    pub operation: String,
    pub duration: Duration,
}

/// Aggregated statistics for one operation
#[derive(Debug, Clone)]
pub struct QueryStats {
    pub operation: String,
    pub count: usize,
    pub avg: Duration,
    pub p50: Duration,
    pub p95: Duration,
    pub max: Duration,
}

impl QueryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn samples(&self) -> MutexGuard<'_, Vec<QueryMetric>> {
        // A panic while holding the lock cannot leave the Vec half-written
        self.samples.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record(&self, operation: &str, duration: Duration) {
        self.samples().push(QueryMetric {
            operation: operation.to_string(),
            duration,
        });
    }

    /// Total number of recorded statements
    pub fn total(&self) -> usize {
        self.samples().len()
    }

    pub fn count_for(&self, operation: &str) -> usize {
        self.samples()
            .iter()
            .filter(|m| m.operation == operation)
            .count()
    }

    /// Statements whose operation name starts with `prefix` (e.g. "locale_")
    pub fn count_matching(&self, prefix: &str) -> usize {
        self.samples()
            .iter()
            .filter(|m| m.operation.starts_with(prefix))
            .count()
    }

    /// Calculate statistics for a specific operation
    ///
    /// Returns None if nothing was recorded for the operation
    pub fn stats_for(&self, operation: &str) -> Option<QueryStats> {
        let mut durations: Vec<Duration> = self
            .samples()
            .iter()
            .filter(|m| m.operation == operation)
            .map(|m| m.duration)
            .collect();

        if durations.is_empty() {
            return None;
        }
        durations.sort();

        let count = durations.len();
        let total: Duration = durations.iter().sum();

        Some(QueryStats {
            operation: operation.to_string(),
            count,
            avg: total / count as u32,
            p50: percentile(&durations, 50.0),
            p95: percentile(&durations, 95.0),
            max: durations[count - 1],
        })
    }

    /// Formatted per-operation summary
    pub fn generate_report(&self) -> String {
        let mut operations: Vec<String> = self
            .samples()
            .iter()
            .map(|m| m.operation.clone())
            .collect();
        operations.sort();
        operations.dedup();

        let mut report = String::new();
        report.push_str("=== Query Metrics ===\n");
        report.push_str(&format!("Total statements: {}\n\n", self.total()));

        for operation in operations {
            if let Some(stats) = self.stats_for(&operation) {
                report.push_str(&format!(
                    "{}: {} calls | avg {:.3}ms | p50 {:.3}ms | p95 {:.3}ms | max {:.3}ms\n",
                    stats.operation,
                    stats.count,
                    stats.avg.as_secs_f64() * 1000.0,
                    stats.p50.as_secs_f64() * 1000.0,
                    stats.p95.as_secs_f64() * 1000.0,
                    stats.max.as_secs_f64() * 1000.0,
                ));
            }
        }

        report
    }

    pub fn clear(&self) {
        self.samples().clear();
    }
}

/// Calculate percentile from sorted durations
fn percentile(sorted_durations: &[Duration], percentile: f64) -> Duration {
    if sorted_durations.is_empty() {
        return Duration::from_nanos(0);
    }

    let index = ((percentile / 100.0) * (sorted_durations.len() as f64 - 1.0)).round() as usize;
    sorted_durations[index.min(sorted_durations.len() - 1)]
}
