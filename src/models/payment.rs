use serde::{Deserialize, Serialize};

use crate::subscription::Tier;

/// Lifecycle status of a payment as reported by the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            _ => Err(()),
        }
    }
}

/// A recorded payment. Immutable after insertion; the unique index on
/// `(user_id, stripe_id)` makes inserts at-most-once per logical purchase.
#[derive(Debug, Clone, Serialize)]
pub struct Payment {
    pub id: i64,
    pub user_id: i64,
    /// Amount in minor units (cents).
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub description: String,
    /// The logical purchase identity (checkout session id, subscription id
    /// plus period start, or event id - see the dedup key derivation).
    pub stripe_id: String,
    pub tier: Option<Tier>,
    pub period_start: i64,
    pub period_end: i64,
    pub created_at: i64,
}

impl Payment {
    /// Format the amount with a currency symbol for display.
    pub fn format_amount(&self) -> String {
        let units = self.amount as f64 / 100.0;
        match self.currency.as_str() {
            "usd" => format!("${:.2}", units),
            "eur" => format!("\u{20ac}{:.2}", units),
            "gbp" => format!("\u{a3}{:.2}", units),
            other => format!("{:.2} {}", units, other),
        }
    }
}

/// Fields supplied when recording a payment through the idempotency guard.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub description: String,
    pub tier: Option<Tier>,
    pub period_start: i64,
    pub period_end: i64,
}
