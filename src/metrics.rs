// ═══════════════════════════════════════════════════════════════
// METRICS COLLECTOR - Because if you can't measure it, it didn't happen
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters for every stage of the engine: cycles, fetches, match
// strategies, dedup suppressions, deliveries, failures. Lock-free because
// counters should never be the thing a delivery waits on. Exposes a tiny
// HTTP endpoint so anything with curl can check engine health.

use portable_atomic::{AtomicU64, Ordering};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info};

use crate::models::{MarketCapSegment, MatchStrategy};

/// The metrics snapshot - what gets serialized to JSON
#[derive(Debug, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub cycles_completed: u64,
    pub records_fetched: u64,
    pub matched_exact: u64,
    pub matched_normalized: u64,
    pub matched_substring: u64,
    pub matched_token_overlap: u64,
    pub records_unmatched: u64,
    pub duplicates_suppressed: u64,
    pub notifications_delivered: u64,
    pub deliveries_failed: u64,
    pub partial_failures: u64,
    pub fetch_errors_large: u64,
    pub fetch_errors_mid: u64,
    pub fetch_errors_small: u64,
    pub uptime_seconds: u64,
    pub deliveries_per_hour: f64,
    pub status: String,
}

/// Thread-safe atomic metrics collector.
pub struct MetricsCollector {
    cycles_completed: AtomicU64,
    records_fetched: AtomicU64,
    matched_exact: AtomicU64,
    matched_normalized: AtomicU64,
    matched_substring: AtomicU64,
    matched_token_overlap: AtomicU64,
    records_unmatched: AtomicU64,
    duplicates_suppressed: AtomicU64,
    notifications_delivered: AtomicU64,
    deliveries_failed: AtomicU64,
    partial_failures: AtomicU64,
    fetch_errors_large: AtomicU64,
    fetch_errors_mid: AtomicU64,
    fetch_errors_small: AtomicU64,
    start_time: Instant,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            cycles_completed: AtomicU64::new(0),
            records_fetched: AtomicU64::new(0),
            matched_exact: AtomicU64::new(0),
            matched_normalized: AtomicU64::new(0),
            matched_substring: AtomicU64::new(0),
            matched_token_overlap: AtomicU64::new(0),
            records_unmatched: AtomicU64::new(0),
            duplicates_suppressed: AtomicU64::new(0),
            notifications_delivered: AtomicU64::new(0),
            deliveries_failed: AtomicU64::new(0),
            partial_failures: AtomicU64::new(0),
            fetch_errors_large: AtomicU64::new(0),
            fetch_errors_mid: AtomicU64::new(0),
            fetch_errors_small: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_cycles(&self) {
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetched(&self, count: u64) {
        self.records_fetched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_matched(&self, strategy: MatchStrategy) {
        let counter = match strategy {
            MatchStrategy::Exact => &self.matched_exact,
            MatchStrategy::Normalized => &self.matched_normalized,
            MatchStrategy::Substring => &self.matched_substring,
            MatchStrategy::TokenOverlap => &self.matched_token_overlap,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_unmatched(&self) {
        self.records_unmatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_suppressed(&self) {
        self.duplicates_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_delivered(&self) {
        self.notifications_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.deliveries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_partial_failure(&self) {
        self.partial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetch_error(&self, segment: MarketCapSegment) {
        let counter = match segment {
            MarketCapSegment::Large => &self.fetch_errors_large,
            MarketCapSegment::Mid => &self.fetch_errors_mid,
            MarketCapSegment::Small => &self.fetch_errors_small,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all metrics (lock-free reads)
    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let delivered = self.notifications_delivered.load(Ordering::Relaxed);
        let deliveries_per_hour = if uptime > 0 {
            (delivered as f64 / uptime as f64) * 3600.0
        } else {
            0.0
        };

        MetricsSnapshot {
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            records_fetched: self.records_fetched.load(Ordering::Relaxed),
            matched_exact: self.matched_exact.load(Ordering::Relaxed),
            matched_normalized: self.matched_normalized.load(Ordering::Relaxed),
            matched_substring: self.matched_substring.load(Ordering::Relaxed),
            matched_token_overlap: self.matched_token_overlap.load(Ordering::Relaxed),
            records_unmatched: self.records_unmatched.load(Ordering::Relaxed),
            duplicates_suppressed: self.duplicates_suppressed.load(Ordering::Relaxed),
            notifications_delivered: delivered,
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            partial_failures: self.partial_failures.load(Ordering::Relaxed),
            fetch_errors_large: self.fetch_errors_large.load(Ordering::Relaxed),
            fetch_errors_mid: self.fetch_errors_mid.load(Ordering::Relaxed),
            fetch_errors_small: self.fetch_errors_small.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            deliveries_per_hour,
            status: "operational".to_string(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a tiny HTTP server that serves metrics as JSON.
pub async fn run_metrics_server(
    metrics: Arc<MetricsCollector>,
    port: u16,
    shutdown: &mut watch::Receiver<bool>,
) {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    let listener = match TcpListener::bind(("0.0.0.0", port)).await {
        Ok(l) => l,
        Err(e) => {
            error!(port, error = %e, "failed to bind metrics server");
            return;
        }
    };

    info!(port, "metrics server listening");

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((mut stream, _addr)) => {
                        let snapshot = metrics.snapshot();
                        let json = serde_json::to_string_pretty(&snapshot)
                            .unwrap_or_else(|_| "{}".to_string());

                        let response = format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\n\r\n{}",
                            json.len(),
                            json,
                        );

                        let _ = stream.write_all(response.as_bytes()).await;
                    }
                    Err(e) => {
                        error!(error = %e, "metrics server accept error");
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("metrics server shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_land_in_the_snapshot() {
        let metrics = MetricsCollector::new();
        metrics.increment_cycles();
        metrics.record_fetched(7);
        metrics.increment_matched(MatchStrategy::Exact);
        metrics.increment_matched(MatchStrategy::TokenOverlap);
        metrics.increment_unmatched();
        metrics.increment_suppressed();
        metrics.increment_delivered();
        metrics.increment_failed();
        metrics.increment_partial_failure();
        metrics.increment_fetch_error(MarketCapSegment::Mid);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles_completed, 1);
        assert_eq!(snapshot.records_fetched, 7);
        assert_eq!(snapshot.matched_exact, 1);
        assert_eq!(snapshot.matched_token_overlap, 1);
        assert_eq!(snapshot.records_unmatched, 1);
        assert_eq!(snapshot.duplicates_suppressed, 1);
        assert_eq!(snapshot.notifications_delivered, 1);
        assert_eq!(snapshot.deliveries_failed, 1);
        assert_eq!(snapshot.partial_failures, 1);
        assert_eq!(snapshot.fetch_errors_mid, 1);
        assert_eq!(snapshot.fetch_errors_large, 0);
        assert_eq!(snapshot.status, "operational");
    }
}
