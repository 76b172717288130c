//! Outbound email via the Resend API.
//!
//! Delivery is never on the critical path: callers send after their
//! transaction commits, and a failure is logged and surfaced as a warning
//! flash at most.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;

use crate::config::Config;
use crate::error::Result;

const RESEND_API_URL: &str = "https://api.resend.com/emails";
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Abstraction over the mail collaborator so tests can record instead of
/// sending.
pub trait Mailer: Send + Sync {
    fn send_verification(&self, to: &str, verify_url: &str) -> Result<()>;
    fn send_recovery(&self, to: &str, reset_url: &str) -> Result<()>;
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: String,
}

/// Production mailer backed by the Resend HTTP API.
pub struct ResendMailer {
    client: Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn from_config(config: &Config) -> Option<ResendMailer> {
        let api_key = config.resend_api_key.clone()?;
        Some(ResendMailer {
            client: Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key,
            from: config.email_from.clone(),
        })
    }

    /// Queue the send on the runtime and return immediately. Delivery
    /// failures are logged, not propagated; mail must never sit in the
    /// request's critical path.
    fn send(&self, to: &str, subject: &str, html: String) -> Result<()> {
        let request = ResendRequest {
            from: &self.from,
            to: [to],
            subject,
            html,
        };
        let body = serde_json::to_vec(&request)?;
        let pending = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .body(body);
        let to = to.to_string();
        tokio::spawn(async move {
            match pending.send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(%to, "email sent");
                }
                Ok(resp) => {
                    tracing::warn!(%to, status = %resp.status(), "resend rejected email");
                }
                Err(e) => {
                    tracing::warn!(%to, error = %e, "resend request failed");
                }
            }
        });
        Ok(())
    }
}

impl Mailer for ResendMailer {
    fn send_verification(&self, to: &str, verify_url: &str) -> Result<()> {
        let html = format!(
            "<p>Welcome to The Virtual Armory!</p>\
             <p>Please <a href=\"{}\">verify your email address</a> to activate your account.</p>\
             <p>This link expires in 24 hours.</p>",
            verify_url
        );
        self.send(to, "Verify your email address", html)
    }

    fn send_recovery(&self, to: &str, reset_url: &str) -> Result<()> {
        let html = format!(
            "<p>A password reset was requested for your account.</p>\
             <p><a href=\"{}\">Reset your password</a></p>\
             <p>If you did not request this, you can ignore this email.</p>",
            reset_url
        );
        self.send(to, "Reset your password", html)
    }
}

/// No-op mailer used when no API key is configured. Logs the URLs so
/// local development can complete the flows by hand.
pub struct DisabledMailer;

impl Mailer for DisabledMailer {
    fn send_verification(&self, to: &str, verify_url: &str) -> Result<()> {
        tracing::info!(to, verify_url, "email disabled, verification link logged");
        Ok(())
    }

    fn send_recovery(&self, to: &str, reset_url: &str) -> Result<()> {
        tracing::info!(to, reset_url, "email disabled, recovery link logged");
        Ok(())
    }
}

/// Test mailer that records every send.
#[derive(Default)]
pub struct MockMailer {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
}

impl Mailer for MockMailer {
    fn send_verification(&self, to: &str, verify_url: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to.to_string(), verify_url.to_string()));
        }
        Ok(())
    }

    fn send_recovery(&self, to: &str, reset_url: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to.to_string(), reset_url.to_string()));
        }
        Ok(())
    }
}
