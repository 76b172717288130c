use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::config::StripeConfig;
use crate::error::{AppError, Result};
use crate::subscription::Tier;

type HmacSha256 = Hmac<Sha256>;

/// Deadline on every outbound call to the processor.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A created checkout session: the processor id and the hosted URL to
/// redirect the buyer to.
#[derive(Debug, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// A checkout session retrieved after the buyer returns.
#[derive(Debug, Deserialize)]
pub struct RetrievedSession {
    pub id: String,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub subscription: Option<String>,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(default)]
    pub subscription_tier: Option<String>,
}

impl RetrievedSession {
    /// The tier this session purchased. Metadata is authoritative; the
    /// amount is only a fallback.
    pub fn tier(&self) -> Option<Tier> {
        if let Some(tier) = self
            .metadata
            .subscription_tier
            .as_deref()
            .and_then(|t| t.parse().ok())
        {
            return Some(tier);
        }
        self.amount_total.map(Tier::from_amount)
    }
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> StripeClient {
        StripeClient {
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            secret_key: config.secret_key.clone(),
            webhook_secret: config.webhook_secret.clone(),
            config: config.clone(),
        }
    }

    fn price_id(&self, tier: Tier) -> Option<&str> {
        match tier {
            Tier::Monthly => self.config.price_monthly.as_deref(),
            Tier::Yearly => self.config.price_yearly.as_deref(),
            Tier::Lifetime => self.config.price_lifetime.as_deref(),
            Tier::PremiumLifetime => self.config.price_premium.as_deref(),
            Tier::Free => None,
        }
    }

    /// Create a hosted checkout session for `tier`.
    ///
    /// Prefers dashboard-configured price ids; falls back to inline
    /// price_data at the canonical amount. Recurring tiers use
    /// subscription mode, lifetime tiers a one-time payment.
    pub async fn create_checkout_session(
        &self,
        user_id: i64,
        tier: Tier,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession> {
        let mode = match tier {
            Tier::Monthly | Tier::Yearly => "subscription",
            _ => "payment",
        };
        let user_ref = user_id.to_string();
        let amount = tier.price_cents().to_string();

        let mut form: Vec<(&str, &str)> = vec![
            ("mode", mode),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("client_reference_id", &user_ref),
            ("metadata[subscription_tier]", tier.as_str()),
            ("line_items[0][quantity]", "1"),
        ];
        let interval = match tier {
            Tier::Monthly => "month",
            Tier::Yearly => "year",
            _ => "",
        };
        if let Some(price_id) = self.price_id(tier) {
            form.push(("line_items[0][price]", price_id));
        } else {
            form.push(("line_items[0][price_data][currency]", "usd"));
            form.push(("line_items[0][price_data][unit_amount]", &amount));
            form.push((
                "line_items[0][price_data][product_data][name]",
                tier.plan_name(),
            ));
            if mode == "subscription" {
                form.push((
                    "line_items[0][price_data][recurring][interval]",
                    interval,
                ));
            }
        }

        let response = self
            .client
            .post("https://api.stripe.com/v1/checkout/sessions")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("stripe request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Transient(format!(
                "stripe checkout creation failed: {}",
                error_text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Transient(format!("bad stripe response: {}", e)))
    }

    /// Fetch a checkout session by id, for the success-redirect path.
    pub async fn retrieve_checkout_session(&self, session_id: &str) -> Result<RetrievedSession> {
        let response = self
            .client
            .get(format!(
                "https://api.stripe.com/v1/checkout/sessions/{}",
                session_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("stripe request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(AppError::NotFound(format!(
                "checkout session {}",
                session_id
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Transient(format!("bad stripe response: {}", e)))
    }

    /// Ask the processor to stop renewing at the period end.
    pub async fn cancel_at_period_end(&self, subscription_id: &str) -> Result<()> {
        let response = self
            .client
            .post(format!(
                "https://api.stripe.com/v1/subscriptions/{}",
                subscription_id
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[("cancel_at_period_end", "true")])
            .send()
            .await
            .map_err(|e| AppError::Transient(format!("stripe request failed: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Transient(format!(
                "stripe cancellation failed: {}",
                error_text
            )));
        }
        Ok(())
    }

    /// Maximum age of a webhook timestamp before it's rejected.
    /// Stripe recommends 300 seconds.
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        verify_signature(
            &self.webhook_secret,
            payload,
            signature,
            chrono::Utc::now().timestamp(),
            Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS,
        )
    }
}

/// Verify a `t=timestamp,v1=hex` signature header against the shared
/// secret, rejecting stale or future timestamps.
pub fn verify_signature(
    secret: &str,
    payload: &[u8],
    signature: &str,
    now: i64,
    tolerance_secs: i64,
) -> Result<bool> {
    let mut timestamp = None;
    let mut sig_v1 = None;
    for part in signature.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(s) = part.strip_prefix("v1=") {
            sig_v1 = Some(s);
        }
    }

    let timestamp_str = timestamp
        .ok_or_else(|| AppError::SignatureInvalid("missing timestamp".into()))?;
    let sig_v1 =
        sig_v1.ok_or_else(|| AppError::SignatureInvalid("missing v1 signature".into()))?;

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AppError::SignatureInvalid("bad timestamp".into()))?;

    // Replay protection, with 60s of forward clock-skew allowance.
    let age = now - timestamp;
    if age > tolerance_secs {
        tracing::warn!(age, "webhook rejected: timestamp too old");
        return Ok(false);
    }
    if age < -60 {
        tracing::warn!(age, "webhook rejected: timestamp in the future");
        return Ok(false);
    }

    let signed_payload = format!("{}.{}", timestamp_str, String::from_utf8_lossy(payload));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("invalid webhook secret".into()))?;
    mac.update(signed_payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    // Length is not secret (always 64 hex chars); the content comparison
    // is constant-time.
    let expected_bytes = expected.as_bytes();
    let provided_bytes = sig_v1.as_bytes();
    if expected_bytes.len() != provided_bytes.len() {
        return Ok(false);
    }
    Ok(expected_bytes.ct_eq(provided_bytes).into())
}

/// Compute a valid signature header for `payload`. Test fixtures use this
/// to exercise the verification path end to end.
pub fn sign_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let signed_payload = format!("{}.{}", timestamp, String::from_utf8_lossy(payload));
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(signed_payload.as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn valid_signature_verifies() {
        let payload = br#"{"type":"invoice.paid"}"#;
        let header = sign_payload(SECRET, payload, NOW);
        assert!(verify_signature(SECRET, payload, &header, NOW, 300).unwrap());
    }

    #[test]
    fn wrong_secret_or_tampered_payload_fails() {
        let payload = br#"{"type":"invoice.paid"}"#;
        let header = sign_payload(SECRET, payload, NOW);
        assert!(!verify_signature("whsec_other", payload, &header, NOW, 300).unwrap());
        assert!(!verify_signature(SECRET, b"{}", &header, NOW, 300).unwrap());
    }

    #[test]
    fn stale_and_future_timestamps_fail() {
        let payload = b"{}";
        let header = sign_payload(SECRET, payload, NOW - 301);
        assert!(!verify_signature(SECRET, payload, &header, NOW, 300).unwrap());

        let header = sign_payload(SECRET, payload, NOW + 120);
        assert!(!verify_signature(SECRET, payload, &header, NOW, 300).unwrap());
    }

    #[test]
    fn malformed_header_is_an_error() {
        assert!(verify_signature(SECRET, b"{}", "v1=abc", NOW, 300).is_err());
        assert!(verify_signature(SECRET, b"{}", "t=notanumber,v1=abc", NOW, 300).is_err());
    }
}
