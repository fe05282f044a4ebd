/// Utility functions and helpers
///
/// Poll-cycle metrics, operation timing, and human-readable formatting.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

/// Counters describing poll and synchronization health
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollMetrics {
    /// Poll cycles run
    pub cycles: u64,
    /// Cycles in which every group was read
    pub complete_cycles: u64,
    /// Group reads that failed
    pub failed_reads: u64,
    /// Failed group reads that were timeouts
    pub timeouts: u64,
    /// Virtual summer setpoints rewritten
    pub sync_writes: u64,
    /// Synchronization writes that failed
    pub sync_failures: u64,
    pub total_duration: Duration,
    pub min_duration: Option<Duration>,
    pub max_duration: Option<Duration>,
    pub avg_duration: Duration,
    pub last_cycle_at: Option<DateTime<Utc>>,
}

impl PollMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished poll cycle
    pub fn record_cycle(&mut self, duration: Duration, failed_reads: u64, timeouts: u64) {
        self.cycles += 1;
        if failed_reads == 0 {
            self.complete_cycles += 1;
        }
        self.failed_reads += failed_reads;
        self.timeouts += timeouts;
        self.total_duration += duration;

        self.min_duration = Some(self.min_duration.map_or(duration, |min| min.min(duration)));
        self.max_duration = Some(self.max_duration.map_or(duration, |max| max.max(duration)));
        self.avg_duration = self.total_duration / self.cycles as u32;
        self.last_cycle_at = Some(Utc::now());
    }

    /// Record one synchronization write
    pub fn record_sync(&mut self, success: bool) {
        if success {
            self.sync_writes += 1;
        } else {
            self.sync_failures += 1;
        }
    }

    /// Share of cycles with no failed read, as a percentage
    pub fn completeness_rate(&self) -> f64 {
        if self.cycles == 0 {
            return 0.0;
        }
        (self.complete_cycles as f64 / self.cycles as f64) * 100.0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Timer for measuring operation duration
pub struct OperationTimer {
    start: Instant,
    operation_name: String,
}

impl OperationTimer {
    /// Start a new timer
    pub fn start(operation_name: &str) -> Self {
        debug!("Starting operation: {}", operation_name);
        Self {
            start: Instant::now(),
            operation_name: operation_name.to_string(),
        }
    }

    /// Stop the timer and return duration
    pub fn stop(self) -> Duration {
        let duration = self.start.elapsed();
        debug!("Operation '{}' completed in {:?}", self.operation_name, duration);
        duration
    }

    /// Stop timer and log result
    pub fn stop_and_log(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        if success {
            info!("Operation '{}' succeeded in {}", self.operation_name, format::format_duration(duration));
        } else {
            warn!("Operation '{}' incomplete after {}", self.operation_name, format::format_duration(duration));
        }
        duration
    }
}

/// Formatting and display utilities
pub mod format {
    use super::*;

    /// Format register values as hex
    pub fn registers_to_hex(registers: &[u16]) -> String {
        registers
            .iter()
            .map(|r| format!("{:04X}", r))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Format duration in a human-readable way
    pub fn format_duration(duration: Duration) -> String {
        let millis = duration.as_millis();
        if millis < 1000 {
            format!("{}ms", millis)
        } else if millis < 60_000 {
            format!("{:.2}s", duration.as_secs_f64())
        } else {
            let mins = millis / 60_000;
            let secs = (millis % 60_000) as f64 / 1000.0;
            format!("{}m {:.1}s", mins, secs)
        }
    }

    /// Format poll metrics as a table
    pub fn format_metrics(metrics: &PollMetrics) -> String {
        format!(
            "Poll Metrics:\n\
             ├─ Cycles: {}\n\
             ├─ Complete: {} ({:.1}%)\n\
             ├─ Failed Reads: {} ({} timeouts)\n\
             ├─ Sync Writes: {} ({} failed)\n\
             ├─ Average Duration: {}\n\
             ├─ Min Duration: {}\n\
             └─ Max Duration: {}",
            metrics.cycles,
            metrics.complete_cycles,
            metrics.completeness_rate(),
            metrics.failed_reads,
            metrics.timeouts,
            metrics.sync_writes,
            metrics.sync_failures,
            format_duration(metrics.avg_duration),
            metrics.min_duration.map_or("N/A".to_string(), format_duration),
            metrics.max_duration.map_or("N/A".to_string(), format_duration),
        )
    }
}

/// Logging utilities
pub mod logging {
    /// Initialize simple logger for testing
    pub fn init_test_logger() {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .try_init();
    }
}
