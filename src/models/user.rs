use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::subscription::Tier;

/// Basic email format validation.
///
/// Validates that email has:
/// - Exactly one @ symbol
/// - Non-empty local part (before @)
/// - Non-empty domain part (after @) with at least one dot
///
/// This is intentionally permissive to avoid rejecting valid but unusual
/// emails. It's not meant to be RFC 5322 compliant - just a sanity check.
pub fn validate_email_format(email: &str) -> Result<()> {
    let email = email.trim();

    if email.is_empty() {
        return Err(AppError::ValidationFailed("Email is required".into()));
    }

    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 {
        return Err(AppError::ValidationFailed("Invalid email format".into()));
    }

    let local_part = parts[0];
    let domain_part = parts[1];

    if local_part.is_empty() || local_part.contains(' ') {
        return Err(AppError::ValidationFailed("Invalid email format".into()));
    }

    if domain_part.is_empty()
        || !domain_part.contains('.')
        || domain_part.starts_with('.')
        || domain_part.ends_with('.')
    {
        return Err(AppError::ValidationFailed("Invalid email format".into()));
    }

    Ok(())
}

/// A registered account, including its subscription state.
///
/// Subscription fields are only ever written by the subscription mutator;
/// the rest of the application treats them as read-only.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_admin: bool,
    pub confirmed: bool,
    #[serde(skip_serializing)]
    pub confirm_token: Option<String>,
    #[serde(skip_serializing)]
    pub confirm_token_expiry: Option<i64>,
    #[serde(skip_serializing)]
    pub recover_token: Option<String>,
    #[serde(skip_serializing)]
    pub recover_token_expiry: Option<i64>,
    pub attempt_count: i32,
    pub last_attempt: Option<i64>,
    pub subscription_tier: Tier,
    /// Unix timestamp; 0 means "never had a paid subscription".
    pub subscription_expires_at: i64,
    pub subscription_canceled: bool,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// Soft delete timestamp (None = active)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

impl User {
    /// The active-subscription predicate used by the quota enforcer.
    pub fn has_active_subscription(&self, now: i64) -> bool {
        crate::subscription::has_active_subscription(
            self.subscription_tier,
            self.subscription_expires_at,
            now,
        )
    }

    pub fn is_lifetime_subscriber(&self) -> bool {
        self.subscription_tier.is_lifetime()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub password: String,
}

impl CreateUser {
    pub fn validate(&self) -> Result<()> {
        validate_email_format(&self.email)?;
        if self.password.is_empty() {
            return Err(AppError::ValidationFailed("Password is required".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_addresses() {
        assert!(validate_email_format("user@example.com").is_ok());
        assert!(validate_email_format("a+b@sub.domain.org").is_ok());
    }

    #[test]
    fn rejects_malformed_addresses() {
        for bad in ["", "no-at-sign", "@example.com", "user@", "user@nodot", "u ser@x.com", "user@.com"] {
            assert!(validate_email_format(bad).is_err(), "should reject {:?}", bad);
        }
    }
}
