//! Gateway request counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Serializable snapshot of a gateway's counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayMetrics {
    /// Requests issued
    pub requests: u64,
    /// Requests that ended in a transport error
    pub failures: u64,
    /// Body bytes received
    pub bytes_received: u64,
    /// Moving average of request latency, in milliseconds
    pub average_latency_ms: f64,
}

/// Lock-free counters updated by the gateway on every request
#[derive(Debug, Default)]
pub struct AtomicGatewayMetrics {
    requests: AtomicU64,
    failures: AtomicU64,
    bytes_received: AtomicU64,
    avg_latency_us: AtomicU64,
}

impl AtomicGatewayMetrics {
    /// All counters at zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a request that completed with a body
    pub fn record_success(&self, bytes: usize, latency_us: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.update_latency_us(latency_us);
    }

    /// Count a request that failed
    pub fn record_failure(&self, latency_us: u64) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.update_latency_us(latency_us);
    }

    fn update_latency_us(&self, latency_us: u64) {
        let current = self.avg_latency_us.load(Ordering::Relaxed);
        let new_avg = if current == 0 {
            latency_us
        } else {
            // alpha = 0.1
            current.saturating_mul(9).saturating_add(latency_us) / 10
        };
        self.avg_latency_us.store(new_avg, Ordering::Relaxed);
    }

    /// Current values
    #[must_use]
    pub fn snapshot(&self) -> GatewayMetrics {
        GatewayMetrics {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            average_latency_ms: self.avg_latency_us.load(Ordering::Relaxed) as f64 / 1000.0,
        }
    }

    /// Zero every counter
    pub fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.bytes_received.store(0, Ordering::Relaxed);
        self.avg_latency_us.store(0, Ordering::Relaxed);
    }
}
