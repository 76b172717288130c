use std::env;

/// Which environment the server runs in.
///
/// Test mode replaces the Stripe roundtrip with synthetic checkout sessions
/// and accepts the literal `test_signature` on the webhook endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Test,
    Production,
}

impl AppEnv {
    fn from_str(s: &str) -> Self {
        match s {
            "production" => AppEnv::Production,
            "test" => AppEnv::Test,
            _ => AppEnv::Development,
        }
    }
}

/// Stripe credentials plus the per-tier price ids configured in the dashboard.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    pub price_monthly: Option<String>,
    pub price_yearly: Option<String>,
    pub price_lifetime: Option<String>,
    pub price_premium: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub env: AppEnv,
    pub base_url: String,
    pub database_path: String,
    /// None when no Stripe keys are configured; the app then runs in
    /// test-mode redirects regardless of APP_ENV.
    pub stripe: Option<StripeConfig>,
    pub webhook_secret: String,
    pub resend_api_key: Option<String>,
    pub email_from: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env_kind = AppEnv::from_str(
            env::var("APP_ENV")
                .unwrap_or_else(|_| "development".to_string())
                .as_str(),
        );

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let base_url =
            env::var("APP_BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let webhook_secret = env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default();

        let stripe = env::var("STRIPE_SECRET_KEY").ok().map(|secret_key| StripeConfig {
            secret_key,
            webhook_secret: webhook_secret.clone(),
            price_monthly: env::var("STRIPE_PRICE_MONTHLY").ok(),
            price_yearly: env::var("STRIPE_PRICE_YEARLY").ok(),
            price_lifetime: env::var("STRIPE_PRICE_LIFETIME").ok(),
            price_premium: env::var("STRIPE_PRICE_PREMIUM").ok(),
        });

        Self {
            host,
            port,
            env: env_kind,
            base_url,
            database_path: database_path_from_env(),
            stripe,
            webhook_secret,
            resend_api_key: env::var("RESEND_API_KEY").ok(),
            email_from: env::var("EMAIL_FROM").unwrap_or_else(|_| "noreply@armory.local".to_string()),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether checkout and webhook handling run against synthetic sessions.
    /// Missing Stripe keys downgrade any environment to test-mode redirects.
    pub fn test_mode(&self) -> bool {
        self.env == AppEnv::Test || self.stripe.is_none()
    }
}

fn database_path_from_env() -> String {
    let raw = env::var("DATABASE_URL").unwrap_or_else(|_| "armory.db".to_string());
    // Accept both a bare path and a sqlite:// URL.
    raw.strip_prefix("sqlite://")
        .map(String::from)
        .unwrap_or(raw)
}
