pub mod logger;
pub mod report;

use crate::network::RequestOutcome;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use parking_lot::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsSnapshot {
    pub timestamp: f64,
    pub requests_sent: u64,
    pub successes: u64,
    pub failures: u64,
    pub bytes_received: u64,
    pub success_rate: f64,
    pub requests_per_minute: f64,
    pub avg_latency_ms: f64,
    pub active_sessions: u64,
    pub sessions_completed: u64,
    pub sessions_aborted: u64,
}

/// Process-wide aggregate shared by every session. Each request is
/// recorded under a single write lock so concurrent sessions never lose updates.
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<RwLock<MetricsInner>>,
    page_hits: Arc<DashMap<String, u64>>,
    start_time: Instant,
}

#[derive(Debug, Default)]
struct MetricsInner {
    requests_sent: u64,
    successes: u64,
    failures: u64,
    bytes_received: u64,
    total_latency_ms: f64,
    active_sessions: u64,
    sessions_completed: u64,
    sessions_aborted: u64,
    snapshots: Vec<MetricsSnapshot>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(MetricsInner::default())),
            page_hits: Arc::new(DashMap::new()),
            start_time: Instant::now(),
        }
    }

    pub fn record(&self, outcome: &RequestOutcome) {
        {
            let mut inner = self.inner.write();
            inner.requests_sent += 1;
            if outcome.is_success() {
                inner.successes += 1;
            } else {
                inner.failures += 1;
            }
            inner.bytes_received += outcome.bytes;
            inner.total_latency_ms += outcome.elapsed_ms();
        }
        *self.page_hits.entry(outcome.page.clone()).or_insert(0) += 1;
    }

    pub fn session_started(&self) {
        self.inner.write().active_sessions += 1;
    }

    pub fn session_finished(&self, aborted: bool) {
        let mut inner = self.inner.write();
        inner.active_sessions = inner.active_sessions.saturating_sub(1);
        if aborted {
            inner.sessions_aborted += 1;
        } else {
            inner.sessions_completed += 1;
        }
    }

    pub fn page_hits(&self) -> BTreeMap<String, u64> {
        self.page_hits
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.read();

        let elapsed = self.start_time.elapsed().as_secs_f64();

        let requests_per_minute = if elapsed > 0.0 {
            inner.requests_sent as f64 * 60.0 / elapsed
        } else {
            0.0
        };

        let success_rate = if inner.requests_sent > 0 {
            inner.successes as f64 / inner.requests_sent as f64
        } else {
            0.0
        };

        let avg_latency_ms = if inner.requests_sent > 0 {
            inner.total_latency_ms / inner.requests_sent as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            timestamp: elapsed,
            requests_sent: inner.requests_sent,
            successes: inner.successes,
            failures: inner.failures,
            bytes_received: inner.bytes_received,
            success_rate,
            requests_per_minute,
            avg_latency_ms,
            active_sessions: inner.active_sessions,
            sessions_completed: inner.sessions_completed,
            sessions_aborted: inner.sessions_aborted,
        }
    }

    pub fn save_snapshot(&self) {
        let snapshot = self.snapshot();
        self.inner.write().snapshots.push(snapshot);
    }

    pub fn get_snapshots(&self) -> Vec<MetricsSnapshot> {
        self.inner.read().snapshots.clone()
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
