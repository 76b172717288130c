//! Sliding-window rate limiting for abuse-prone endpoints.
//!
//! Limits are applied per client identifier (IP address):
//! - login: 5 attempts per minute
//! - password recovery: 3 attempts per hour
//! - webhook intake from non-processor sources: 10 per minute
//!
//! Processor-originated webhook requests (identified by user agent) bypass
//! the limiter entirely; the handlers make that call, not this module.

use std::collections::HashMap;
use std::sync::Mutex;

use axum::http::HeaderMap;

use crate::error::{AppError, Result};

/// Sliding-window request counter keyed by client identifier.
pub struct RateLimiter {
    max_requests: usize,
    window_secs: i64,
    hits: Mutex<HashMap<String, Vec<i64>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_secs: i64) -> RateLimiter {
        RateLimiter {
            max_requests,
            window_secs,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn login() -> RateLimiter {
        RateLimiter::new(5, 60)
    }

    pub fn recover() -> RateLimiter {
        RateLimiter::new(3, 3600)
    }

    pub fn webhook() -> RateLimiter {
        RateLimiter::new(10, 60)
    }

    /// Record a hit for `identifier` and fail with `RateLimited` once the
    /// window is full.
    pub fn check(&self, identifier: &str, now: i64) -> Result<()> {
        let mut hits = self
            .hits
            .lock()
            .map_err(|_| AppError::Internal("rate limiter lock poisoned".into()))?;

        let window_start = now - self.window_secs;
        let entry = hits.entry(identifier.to_string()).or_default();
        entry.retain(|&t| t > window_start);

        if entry.len() >= self.max_requests {
            tracing::warn!(identifier, "rate limit exceeded");
            return Err(AppError::RateLimited);
        }
        entry.push(now);

        // Drop stale keys occasionally so the map doesn't grow unbounded.
        if hits.len() > 10_000 {
            hits.retain(|_, times| times.iter().any(|&t| t > window_start));
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn remaining(&self, identifier: &str, now: i64) -> usize {
        let hits = self.hits.lock().unwrap();
        let window_start = now - self.window_secs;
        let used = hits
            .get(identifier)
            .map(|e| e.iter().filter(|&&t| t > window_start).count())
            .unwrap_or(0);
        self.max_requests.saturating_sub(used)
    }
}

/// Best-effort client identifier: proxy headers first, then the literal
/// peer, which axum only exposes through ConnectInfo (omitted here since
/// every deployment sits behind a proxy).
pub fn client_identifier(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_string();
        }
    }
    "unknown".to_string()
}

/// Does the request's user agent identify the payment processor?
pub fn is_processor_user_agent(headers: &HeaderMap) -> bool {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|ua| ua.starts_with("Stripe/"))
        .unwrap_or(false)
}
