//! Process-wide counters surfaced on the admin dashboards.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

/// Webhook intake health counters. Mutated under a lock on every webhook
/// request; the admin health endpoint reads a snapshot.
#[derive(Default)]
pub struct WebhookStats {
    inner: Mutex<WebhookStatsInner>,
}

#[derive(Default, Clone, Serialize)]
struct WebhookStatsInner {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    last_request_time: Option<i64>,
    last_error_time: Option<i64>,
    last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub last_request_time: Option<i64>,
    pub last_error_time: Option<i64>,
    pub last_error: Option<String>,
    /// "healthy", "degraded", or "idle".
    pub status: &'static str,
}

impl WebhookStats {
    pub fn record_request(&self, now: i64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.total_requests += 1;
            inner.last_request_time = Some(now);
        }
    }

    pub fn record_success(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.successful_requests += 1;
        }
    }

    pub fn record_failure(&self, now: i64, error: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failed_requests += 1;
            inner.last_error_time = Some(now);
            inner.last_error = Some(error.to_string());
        }
    }

    pub fn reset(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner = WebhookStatsInner::default();
        }
    }

    pub fn snapshot(&self) -> WebhookStatsSnapshot {
        let inner = match self.inner.lock() {
            Ok(inner) => inner.clone(),
            Err(_) => WebhookStatsInner::default(),
        };
        let success_rate = if inner.total_requests == 0 {
            100.0
        } else {
            inner.successful_requests as f64 / inner.total_requests as f64 * 100.0
        };
        let status = if inner.total_requests == 0 {
            "idle"
        } else if success_rate >= 90.0 {
            "healthy"
        } else {
            "degraded"
        };
        WebhookStatsSnapshot {
            total_requests: inner.total_requests,
            successful_requests: inner.successful_requests,
            failed_requests: inner.failed_requests,
            success_rate,
            last_request_time: inner.last_request_time,
            last_error_time: inner.last_error_time,
            last_error: inner.last_error,
            status,
        }
    }
}

/// Aggregated application errors, grouped by kind and by path.
#[derive(Default)]
pub struct ErrorMetrics {
    inner: Mutex<ErrorMetricsInner>,
}

#[derive(Default)]
struct ErrorMetricsInner {
    by_kind: HashMap<String, u64>,
    by_path: HashMap<String, u64>,
    recent: Vec<RecentError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentError {
    pub kind: String,
    pub path: String,
    pub status: u16,
    pub at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMetricsSnapshot {
    pub total: u64,
    pub by_kind: HashMap<String, u64>,
    pub by_path: HashMap<String, u64>,
    pub recent: Vec<RecentError>,
}

const RECENT_CAPACITY: usize = 50;

impl ErrorMetrics {
    pub fn record(&self, kind: &str, path: &str, status: u16, now: i64) {
        if let Ok(mut inner) = self.inner.lock() {
            *inner.by_kind.entry(kind.to_string()).or_insert(0) += 1;
            *inner.by_path.entry(path.to_string()).or_insert(0) += 1;
            inner.recent.push(RecentError {
                kind: kind.to_string(),
                path: path.to_string(),
                status,
                at: now,
            });
            if inner.recent.len() > RECENT_CAPACITY {
                let overflow = inner.recent.len() - RECENT_CAPACITY;
                inner.recent.drain(..overflow);
            }
        }
    }

    pub fn snapshot(&self) -> ErrorMetricsSnapshot {
        match self.inner.lock() {
            Ok(inner) => ErrorMetricsSnapshot {
                total: inner.by_kind.values().sum(),
                by_kind: inner.by_kind.clone(),
                by_path: inner.by_path.clone(),
                recent: inner.recent.clone(),
            },
            Err(_) => ErrorMetricsSnapshot {
                total: 0,
                by_kind: HashMap::new(),
                by_path: HashMap::new(),
                recent: Vec::new(),
            },
        }
    }
}
