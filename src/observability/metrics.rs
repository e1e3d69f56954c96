//! Thread-safe metrics collection for the task pipeline
//!
//! Atomic counters for high-frequency pipeline events plus a
//! mutex-protected latency series for percentile statistics.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    tasks_started: AtomicU64,
    tasks_completed: AtomicU64,
    tasks_failed: AtomicU64,
    events_consumed: AtomicU64,
    frames_emitted: AtomicU64,
    moderation_flips: AtomicU64,
    messages_persisted: AtomicU64,

    // Task latencies in milliseconds, bounded
    task_latencies: Mutex<Vec<u64>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            tasks_started: AtomicU64::new(0),
            tasks_completed: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            events_consumed: AtomicU64::new(0),
            frames_emitted: AtomicU64::new(0),
            moderation_flips: AtomicU64::new(0),
            messages_persisted: AtomicU64::new(0),
            task_latencies: Mutex::new(Vec::new()),
        }
    }

    pub fn task_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn task_completed(&self, duration: Duration) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(duration);
    }

    pub fn task_failed(&self, duration: Duration) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        self.record_latency(duration);
    }

    pub fn event_consumed(&self) {
        self.events_consumed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_emitted(&self) {
        self.frames_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn moderation_flip(&self) {
        self.moderation_flips.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_persisted(&self) {
        self.messages_persisted.fetch_add(1, Ordering::Relaxed);
    }

    fn record_latency(&self, duration: Duration) {
        if let Ok(mut latencies) = self.task_latencies.lock() {
            latencies.push(duration.as_millis() as u64);

            // Limit to last 1000 measurements to prevent unbounded growth
            if latencies.len() > 1000 {
                latencies.remove(0);
            }
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        self.tasks_started.store(0, Ordering::Relaxed);
        self.tasks_completed.store(0, Ordering::Relaxed);
        self.tasks_failed.store(0, Ordering::Relaxed);
        self.events_consumed.store(0, Ordering::Relaxed);
        self.frames_emitted.store(0, Ordering::Relaxed);
        self.moderation_flips.store(0, Ordering::Relaxed);
        self.messages_persisted.store(0, Ordering::Relaxed);
        if let Ok(mut latencies) = self.task_latencies.lock() {
            latencies.clear();
        }
    }

    fn latency_statistics(&self) -> (f64, f64, f64, f64) {
        if let Ok(latencies) = self.task_latencies.lock() {
            if latencies.is_empty() {
                (0.0, 0.0, 0.0, 0.0)
            } else {
                let mut sorted = latencies.clone();
                sorted.sort_unstable();

                let avg = sorted.iter().sum::<u64>() as f64 / sorted.len() as f64;
                (
                    avg,
                    percentile(&sorted, 50.0),
                    percentile(&sorted, 95.0),
                    percentile(&sorted, 99.0),
                )
            }
        } else {
            (0.0, 0.0, 0.0, 0.0)
        }
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let (avg_task_latency_ms, p50, p95, p99) = self.latency_statistics();

        MetricsSnapshot {
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            events_consumed: self.events_consumed.load(Ordering::Relaxed),
            frames_emitted: self.frames_emitted.load(Ordering::Relaxed),
            moderation_flips: self.moderation_flips.load(Ordering::Relaxed),
            messages_persisted: self.messages_persisted.load(Ordering::Relaxed),
            avg_task_latency_ms,
            task_latency_p50_ms: p50,
            task_latency_p95_ms: p95,
            task_latency_p99_ms: p99,
            timestamp: current_timestamp(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of pipeline metrics
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub events_consumed: u64,
    pub frames_emitted: u64,
    pub moderation_flips: u64,
    pub messages_persisted: u64,
    pub avg_task_latency_ms: f64,
    pub task_latency_p50_ms: f64,
    pub task_latency_p95_ms: f64,
    pub task_latency_p99_ms: f64,
    pub timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let len = sorted_data.len();
    let index = (percentile / 100.0) * (len - 1) as f64;

    if index.fract() == 0.0 {
        sorted_data[index as usize] as f64
    } else {
        let lower = sorted_data[index.floor() as usize] as f64;
        let upper = sorted_data[index.ceil() as usize] as f64;
        lower + (upper - lower) * index.fract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_task_counters() {
        let collector = MetricsCollector::new();

        collector.task_started();
        collector.task_completed(Duration::from_millis(1500));

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.tasks_started, 1);
        assert_eq!(snapshot.tasks_completed, 1);
        assert_eq!(snapshot.tasks_failed, 0);
        assert!(snapshot.avg_task_latency_ms > 1400.0);
    }

    #[test]
    fn test_pipeline_counters() {
        let collector = MetricsCollector::new();

        collector.event_consumed();
        collector.event_consumed();
        collector.frame_emitted();
        collector.moderation_flip();
        collector.message_persisted();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.events_consumed, 2);
        assert_eq!(snapshot.frames_emitted, 1);
        assert_eq!(snapshot.moderation_flips, 1);
        assert_eq!(snapshot.messages_persisted, 1);
    }

    #[test]
    fn test_thread_safety() {
        let collector = Arc::new(MetricsCollector::new());

        let mut handles = vec![];
        for _ in 0..10 {
            let collector = Arc::clone(&collector);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    collector.event_consumed();
                    collector.frame_emitted();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.events_consumed, 1000);
        assert_eq!(snapshot.frames_emitted, 1000);
    }

    #[test]
    fn test_percentile_calculation() {
        let data = vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10];

        let p50 = percentile(&data, 50.0);
        let p95 = percentile(&data, 95.0);
        assert!((p50 - 5.5).abs() < 0.1, "P50: expected ~5.5, got {p50}");
        assert!((p95 - 9.5).abs() < 0.1, "P95: expected ~9.5, got {p95}");
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn test_latency_series_bounded() {
        let collector = MetricsCollector::new();
        for i in 0..1500 {
            collector.task_completed(Duration::from_millis(i));
        }

        let latencies = collector.task_latencies.lock().unwrap();
        assert_eq!(latencies.len(), 1000);
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new();
        collector.task_started();
        collector.message_persisted();
        collector.reset();

        let snapshot = collector.get_metrics();
        assert_eq!(snapshot.tasks_started, 0);
        assert_eq!(snapshot.messages_persisted, 0);
    }
}
