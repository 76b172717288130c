use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not an upgrade: {0}")]
    NotAnUpgrade(String),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Short machine-readable kind, used by the error metrics dashboard.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyExists(_) => "already_exists",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotAnUpgrade(_) => "not_an_upgrade",
            AppError::QuotaExceeded(_) => "quota_exceeded",
            AppError::RateLimited => "rate_limited",
            AppError::ValidationFailed(_) => "validation_failed",
            AppError::SignatureInvalid(_) => "signature_invalid",
            AppError::Transient(_) => "transient",
            AppError::Database(_) => "database",
            AppError::Pool(_) => "pool",
            AppError::Json(_) => "json",
            AppError::Internal(_) => "internal",
        }
    }
}

/// User-facing messages reused across handlers and pinned by tests.
pub mod msg {
    pub const ADMIN_REQUIRED: &str = "You must be an administrator to access this page";
    pub const LOGIN_REQUIRED: &str = "You do not have permission to access that page";
    pub const EMAIL_ALREADY_REGISTERED: &str = "Email already registered";
    pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
    pub const VERIFY_BEFORE_LOGIN: &str = "Please verify your email before logging in";
    pub const PAYMENT_SUCCESSFUL: &str =
        "Your payment was successful! Thank you for your subscription.";
    pub const PAYMENT_CANCELLED: &str =
        "Your payment was cancelled. If you have any questions, please contact support.";
    pub const GUN_LIMIT_REACHED: &str = "You've reached the limit of 2 guns for the free tier. \
         Please upgrade your subscription to add more guns.";
    pub const NO_RECURRING_SUBSCRIPTION: &str =
        "You don't have an active recurring subscription to cancel.";
    pub const ALREADY_CANCELED: &str = "Your subscription is already scheduled for cancellation.";
    pub const CHECKOUT_FAILED: &str =
        "We couldn't reach the payment processor. Please try again shortly.";
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not found", Some(msg.clone())),
            AppError::AlreadyExists(msg) => {
                (StatusCode::BAD_REQUEST, "Already exists", Some(msg.clone()))
            }
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized", None),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, "Forbidden", Some(msg.clone())),
            AppError::NotAnUpgrade(msg) => {
                (StatusCode::BAD_REQUEST, "Not an upgrade", Some(msg.clone()))
            }
            AppError::QuotaExceeded(msg) => {
                (StatusCode::SEE_OTHER, "Quota exceeded", Some(msg.clone()))
            }
            AppError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "Too many requests", None),
            AppError::ValidationFailed(msg) => {
                (StatusCode::BAD_REQUEST, "Validation failed", Some(msg.clone()))
            }
            AppError::SignatureInvalid(msg) => {
                (StatusCode::BAD_REQUEST, "Invalid signature", Some(msg.clone()))
            }
            AppError::Transient(msg) => {
                tracing::warn!("Transient failure: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Temporary failure", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let kind = ErrorKind(self.kind());
        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(kind);
        response
    }
}

/// Response extension carrying the error kind for the metrics middleware.
#[derive(Debug, Clone, Copy)]
pub struct ErrorKind(pub &'static str);

/// Extension for turning `Option<T>` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, what: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, what: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(what.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
