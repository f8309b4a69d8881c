//! Latency and time-left telemetry for long per-account loops.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    label: &'static str,
    total: usize,
    completed: usize,
    runtime_sum: Duration,
    parallelism: usize,
    interval: Option<usize>,
}

impl ProgressTracker {
    /// `interval` of `None` keeps counting but never logs.
    pub fn new(label: &'static str, total: usize, interval: Option<usize>) -> Self {
        Self {
            label,
            total,
            completed: 0,
            runtime_sum: Duration::ZERO,
            parallelism: 1,
            interval,
        }
    }

    /// Number of items processed concurrently; divides the time-left estimate.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    /// Record one completed item and log a progress line when due.
    pub fn record(&mut self, latency: Duration) {
        self.completed += 1;
        self.runtime_sum += latency;
        if let Some(every) = self.interval {
            if every > 0 && self.completed % every == 0 {
                log::info!("{}", self.report());
            }
        }
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    pub fn average(&self) -> Option<Duration> {
        if self.completed == 0 {
            return None;
        }
        Some(self.runtime_sum / self.completed as u32)
    }

    pub fn estimated_remaining(&self) -> Option<Duration> {
        let average = self.average()?;
        Some(average.mul_f64(self.remaining() as f64 / self.parallelism as f64))
    }

    pub fn report(&self) -> String {
        let average_ms = self.average().map(|d| d.as_millis()).unwrap_or(0);
        let left = self
            .estimated_remaining()
            .map(format_duration)
            .unwrap_or_else(|| "unknown".to_string());
        format!(
            "{}: average {:03} ms per account, estimated time left {}, {:05} remaining",
            self.label,
            average_ms,
            left,
            self.remaining()
        )
    }
}

/// Whole minutes once past a minute, whole seconds below that.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{} minutes", secs / 60)
    } else {
        format!("{} seconds", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_and_estimate() {
        let mut tracker = ProgressTracker::new("sizing", 10, None);
        assert!(tracker.average().is_none());

        tracker.record(Duration::from_millis(100));
        tracker.record(Duration::from_millis(300));
        assert_eq!(tracker.completed(), 2);
        assert_eq!(tracker.remaining(), 8);
        assert_eq!(tracker.average(), Some(Duration::from_millis(200)));
        assert_eq!(tracker.estimated_remaining(), Some(Duration::from_millis(1600)));
    }

    #[test]
    fn test_parallelism_shortens_estimate() {
        let mut tracker = ProgressTracker::new("sizing", 5, None).with_parallelism(4);
        tracker.record(Duration::from_secs(2));
        assert_eq!(tracker.estimated_remaining(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42 seconds");
        assert_eq!(format_duration(Duration::from_secs(185)), "3 minutes");
    }

    #[test]
    fn test_report_mentions_label() {
        let mut tracker = ProgressTracker::new("lookup", 3, Some(1));
        tracker.record(Duration::from_millis(5));
        let report = tracker.report();
        assert!(report.starts_with("lookup:"));
        assert!(report.contains("00002 remaining"));
    }
}
