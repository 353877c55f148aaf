//! Request counters and per-method latency samples.
//!
//! Hot-path updates are plain atomic increments; only the composite
//! `get_metrics` read takes the sample lock.

use cam_protocol::{MethodStats, MetricsSnapshot};
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Samples retained per method; older observations fall off the front.
const MAX_SAMPLES_PER_METHOD: usize = 128;

pub struct PerformanceMetrics {
    total_requests: AtomicU64,
    total_errors: AtomicU64,
    active_connections: AtomicUsize,
    started_at: Instant,
    samples: RwLock<HashMap<String, VecDeque<f64>>>,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            total_errors: AtomicU64::new(0),
            active_connections: AtomicUsize::new(0),
            started_at: Instant::now(),
            samples: RwLock::new(HashMap::new()),
        }
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Claim a connection slot if the cap allows it.  The increment and the
    /// cap check are one atomic step, so connection N+1 of N never gets a
    /// slot even transiently.
    pub fn try_reserve_connection(&self, cap: usize) -> bool {
        self.active_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                (current < cap).then_some(current + 1)
            })
            .is_ok()
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Record one handler duration for a method.
    pub fn observe(&self, method: &str, duration: Duration) {
        let mut samples = self.samples.write().unwrap_or_else(|e| e.into_inner());
        let buf = samples.entry(method.to_owned()).or_default();
        if buf.len() == MAX_SAMPLES_PER_METHOD {
            buf.pop_front();
        }
        buf.push_back(duration.as_secs_f64() * 1000.0);
    }

    /// Composite snapshot for `get_metrics`.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let samples = self.samples.read().unwrap_or_else(|e| e.into_inner());
        let methods = samples
            .iter()
            .map(|(name, buf)| {
                let count = buf.len() as u64;
                let sum: f64 = buf.iter().sum();
                let max = buf.iter().copied().fold(0.0_f64, f64::max);
                (
                    name.clone(),
                    MethodStats {
                        count,
                        avg_ms: if count == 0 { 0.0 } else { sum / count as f64 },
                        max_ms: max,
                    },
                )
            })
            .collect();
        MetricsSnapshot {
            total_requests: self.total_requests(),
            total_errors: self.total_errors(),
            active_connections: self.active_connections(),
            uptime_secs: self.uptime().as_secs(),
            methods,
        }
    }
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_independently() {
        let metrics = PerformanceMetrics::new();
        metrics.record_request();
        metrics.record_request();
        metrics.record_error();
        assert!(metrics.try_reserve_connection(usize::MAX));
        assert!(metrics.try_reserve_connection(usize::MAX));
        metrics.connection_closed();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.total_errors, 1);
        assert_eq!(snap.active_connections, 1);
    }

    #[test]
    fn reservation_stops_exactly_at_the_cap() {
        let metrics = PerformanceMetrics::new();
        assert!(metrics.try_reserve_connection(2));
        assert!(metrics.try_reserve_connection(2));
        assert!(!metrics.try_reserve_connection(2));

        metrics.connection_closed();
        assert!(metrics.try_reserve_connection(2));
        assert_eq!(metrics.active_connections(), 2);
    }

    #[test]
    fn per_method_samples_aggregate() {
        let metrics = PerformanceMetrics::new();
        metrics.observe("ping", Duration::from_millis(2));
        metrics.observe("ping", Duration::from_millis(4));
        metrics.observe("get_camera_list", Duration::from_millis(10));

        let snap = metrics.snapshot();
        let ping = &snap.methods["ping"];
        assert_eq!(ping.count, 2);
        assert!((ping.avg_ms - 3.0).abs() < 0.5);
        assert!(ping.max_ms >= 3.9);
        assert_eq!(snap.methods["get_camera_list"].count, 1);
    }

    #[test]
    fn sample_buffer_is_bounded() {
        let metrics = PerformanceMetrics::new();
        for _ in 0..(MAX_SAMPLES_PER_METHOD + 10) {
            metrics.observe("ping", Duration::from_millis(1));
        }
        let snap = metrics.snapshot();
        assert_eq!(snap.methods["ping"].count, MAX_SAMPLES_PER_METHOD as u64);
    }
}
