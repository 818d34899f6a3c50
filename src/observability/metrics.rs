//! Process-wide routing metrics
//!
//! Atomic counters for the hot path, mutex-protected maps for per-handler and
//! per-method breakdowns. Metrics are written by the pipeline and read only by
//! the `/metrics` endpoint.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MAX_SAMPLES: usize = 1000;

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

pub struct MetricsCollector {
    requests_received: AtomicU64,
    requests_completed: AtomicU64,
    requests_escalated: AtomicU64,
    requests_rejected: AtomicU64,
    requests_failed: AtomicU64,
    delegations: AtomicU64,

    // milliseconds, bounded to the last MAX_SAMPLES requests
    processing_times: Mutex<Vec<u64>>,
    handler_stats: Mutex<HashMap<String, HandlerStats>>,
    classifications: Mutex<HashMap<String, u64>>,

    started_at: u64,
}

#[derive(Debug, Default)]
struct HandlerStats {
    calls: u64,
    failures: u64,
    timeouts: u64,
    call_times: Vec<u64>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            requests_received: AtomicU64::new(0),
            requests_completed: AtomicU64::new(0),
            requests_escalated: AtomicU64::new(0),
            requests_rejected: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
            delegations: AtomicU64::new(0),
            processing_times: Mutex::new(Vec::new()),
            handler_stats: Mutex::new(HashMap::new()),
            classifications: Mutex::new(HashMap::new()),
            started_at: current_timestamp(),
        }
    }

    pub fn request_received(&self) {
        self.requests_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Request rejected by envelope validation
    pub fn request_rejected(&self) {
        self.requests_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_failed(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_completed(&self, duration: Duration, escalated: bool) {
        self.requests_completed.fetch_add(1, Ordering::Relaxed);
        if escalated {
            self.requests_escalated.fetch_add(1, Ordering::Relaxed);
        }
        if let Ok(mut times) = self.processing_times.lock() {
            push_bounded(&mut times, duration.as_millis() as u64);
        }
    }

    pub fn classification(&self, method: &str) {
        if let Ok(mut counts) = self.classifications.lock() {
            *counts.entry(method.to_string()).or_insert(0) += 1;
        }
    }

    pub fn delegation(&self) {
        self.delegations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_called(&self, handler: &str, duration: Duration, success: bool) {
        if let Ok(mut stats) = self.handler_stats.lock() {
            let entry = stats.entry(handler.to_string()).or_default();
            entry.calls += 1;
            if !success {
                entry.failures += 1;
            }
            push_bounded(&mut entry.call_times, duration.as_millis() as u64);
        }
    }

    pub fn handler_timeout(&self, handler: &str) {
        if let Ok(mut stats) = self.handler_stats.lock() {
            stats.entry(handler.to_string()).or_default().timeouts += 1;
        }
    }

    /// Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.requests_received,
            &self.requests_completed,
            &self.requests_escalated,
            &self.requests_rejected,
            &self.requests_failed,
            &self.delegations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        if let Ok(mut times) = self.processing_times.lock() {
            times.clear();
        }
        if let Ok(mut stats) = self.handler_stats.lock() {
            stats.clear();
        }
        if let Ok(mut counts) = self.classifications.lock() {
            counts.clear();
        }
    }

    fn processing_time_statistics(&self) -> (f64, f64, f64) {
        let Ok(times) = self.processing_times.lock() else {
            return (0.0, 0.0, 0.0);
        };
        if times.is_empty() {
            return (0.0, 0.0, 0.0);
        }

        let mut sorted = times.clone();
        sorted.sort_unstable();
        (
            average(&sorted),
            percentile(&sorted, 50.0),
            percentile(&sorted, 95.0),
        )
    }

    fn handler_snapshots(&self) -> BTreeMap<String, HandlerMetrics> {
        let Ok(stats) = self.handler_stats.lock() else {
            return BTreeMap::new();
        };

        stats
            .iter()
            .map(|(name, s)| {
                let success_rate = if s.calls == 0 {
                    0.0
                } else {
                    (s.calls - s.failures) as f64 / s.calls as f64
                };
                (
                    name.clone(),
                    HandlerMetrics {
                        calls: s.calls,
                        failures: s.failures,
                        timeouts: s.timeouts,
                        avg_call_time_ms: average(&s.call_times),
                        success_rate,
                    },
                )
            })
            .collect()
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();
        let (avg, p50, p95) = self.processing_time_statistics();
        let classifications = self
            .classifications
            .lock()
            .map(|counts| counts.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();

        MetricsSnapshot {
            requests: RequestMetrics {
                received: self.requests_received.load(Ordering::Relaxed),
                completed: self.requests_completed.load(Ordering::Relaxed),
                escalated: self.requests_escalated.load(Ordering::Relaxed),
                rejected: self.requests_rejected.load(Ordering::Relaxed),
                failed: self.requests_failed.load(Ordering::Relaxed),
                avg_processing_time_ms: avg,
                processing_time_p50_ms: p50,
                processing_time_p95_ms: p95,
            },
            delegations: self.delegations.load(Ordering::Relaxed),
            handlers: self.handler_snapshots(),
            classifications,
            uptime_seconds: now.saturating_sub(self.started_at),
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub requests: RequestMetrics,
    pub delegations: u64,
    pub handlers: BTreeMap<String, HandlerMetrics>,
    /// Request count per classification method
    pub classifications: BTreeMap<String, u64>,
    pub uptime_seconds: u64,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct RequestMetrics {
    pub received: u64,
    pub completed: u64,
    pub escalated: u64,
    pub rejected: u64,
    pub failed: u64,
    pub avg_processing_time_ms: f64,
    pub processing_time_p50_ms: f64,
    pub processing_time_p95_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct HandlerMetrics {
    pub calls: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub avg_call_time_ms: f64,
    pub success_rate: f64,
}

fn push_bounded(samples: &mut Vec<u64>, value: u64) {
    samples.push(value);
    if samples.len() > MAX_SAMPLES {
        samples.remove(0);
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn average(data: &[u64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<u64>() as f64 / data.len() as f64
}

fn percentile(sorted_data: &[u64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = sorted_data[index.floor() as usize] as f64;
    let upper = sorted_data[index.ceil() as usize] as f64;

    lower + (upper - lower) * index.fract()
}
