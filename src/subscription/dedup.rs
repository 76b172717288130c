//! Deduplication key for the dual purchase-delivery paths.
//!
//! The checkout-success redirect and the webhook both complete the same
//! purchase. Each derives the same logical purchase identity, so only one
//! of them can insert the Payment row (unique index on
//! `payments(user_id, stripe_id)`); the other observes `Duplicate`.

/// The logical purchase identity half of the `(user, identity)` dedup tuple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey(String);

impl DedupKey {
    /// Derive the key, in priority order:
    /// 1. the checkout session id (both delivery paths carry it);
    /// 2. the subscription id plus invoice period start, so recurring
    ///    invoices stay distinct while the initial invoice collapses with
    ///    its checkout session only when that session id is known;
    /// 3. the raw event id as a last resort.
    pub fn derive(
        checkout_session_id: Option<&str>,
        subscription_id: Option<&str>,
        period_start: Option<i64>,
        event_id: &str,
    ) -> DedupKey {
        if let Some(session) = checkout_session_id.filter(|s| !s.is_empty()) {
            return DedupKey(session.to_string());
        }
        if let Some(sub) = subscription_id.filter(|s| !s.is_empty()) {
            let start = period_start.unwrap_or(0);
            return DedupKey(format!("{}:{}", sub, start));
        }
        DedupKey(event_id.to_string())
    }

    /// Key for a purchase identified directly by its checkout session.
    pub fn from_session(session_id: &str) -> DedupKey {
        DedupKey(session_id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DedupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
