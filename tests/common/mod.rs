//! Test utilities and fixtures for Armory integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use tower::ServiceExt;

pub use armory::auth;
pub use armory::config::{AppEnv, Config};
pub use armory::db::{create_pool, queries, AppState};
pub use armory::email::MockMailer;
pub use armory::handlers;
pub use armory::metrics::{ErrorMetrics, WebhookStats};
pub use armory::models::*;
pub use armory::rate_limit::RateLimiter;
pub use armory::render::Renderer;
pub use armory::subscription::Tier;

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 8080,
        env: AppEnv::Test,
        base_url: "http://localhost:8080".to_string(),
        database_path: ":memory:".to_string(),
        stripe: None,
        webhook_secret: "whsec_test_secret".to_string(),
        resend_api_key: None,
        email_from: "noreply@armory.local".to_string(),
    }
}

/// In-memory application state with a recording mailer.
pub fn test_state() -> (AppState, Arc<MockMailer>) {
    let pool = create_pool(":memory:").expect("Failed to create in-memory database");
    let mailer = Arc::new(MockMailer::default());
    let state = AppState {
        db: pool,
        config: Arc::new(test_config()),
        mailer: mailer.clone(),
        renderer: Arc::new(Renderer),
        stripe: None,
        webhook_stats: Arc::new(WebhookStats::default()),
        error_metrics: Arc::new(ErrorMetrics::default()),
        login_limiter: Arc::new(RateLimiter::login()),
        recover_limiter: Arc::new(RateLimiter::recover()),
        webhook_limiter: Arc::new(RateLimiter::webhook()),
    };
    (state, mailer)
}

pub fn app(state: AppState) -> Router {
    handlers::router(state)
}

/// Create a confirmed user with a known password ("password123").
pub fn create_test_user(state: &AppState, email: &str) -> User {
    let conn = state.conn().expect("Failed to get connection");
    let hash = auth::hash_password("password123").expect("Failed to hash password");
    let user = queries::create_user(&conn, email, &hash, None, None)
        .expect("Failed to create test user");
    queries::mark_confirmed(&conn, user.id).expect("Failed to confirm test user");
    queries::get_user(&conn, user.id)
        .expect("Failed to reload user")
        .expect("User missing")
}

pub fn make_admin(state: &AppState, user_id: i64) {
    let conn = state.conn().expect("Failed to get connection");
    conn.execute("UPDATE users SET is_admin = 1 WHERE id = ?1", [user_id])
        .expect("Failed to set admin flag");
}

/// Overwrite subscription fields directly, for arranging test states.
pub fn set_subscription(state: &AppState, user_id: i64, tier: Tier, expires_at: i64) {
    let conn = state.conn().expect("Failed to get connection");
    conn.execute(
        "UPDATE users SET subscription_tier = ?2, subscription_expires_at = ?3 WHERE id = ?1",
        rusqlite::params![user_id, tier.as_str(), expires_at],
    )
    .expect("Failed to set subscription");
}

/// Seed one weapon type, caliber, and manufacturer (all id 1).
pub fn seed_minimal_catalogs(state: &AppState) {
    let conn = state.conn().expect("Failed to get connection");
    queries::create_weapon_type(
        &conn,
        &CreateWeaponType {
            type_name: "Handgun".to_string(),
            nickname: "Pistol".to_string(),
            popularity: 100,
        },
    )
    .expect("Failed to seed weapon type");
    queries::create_caliber(
        &conn,
        &CreateCaliber {
            caliber: "9mm Parabellum".to_string(),
            nickname: "9".to_string(),
            popularity: 100,
        },
    )
    .expect("Failed to seed caliber");
    queries::create_manufacturer(
        &conn,
        &CreateManufacturer {
            name: "Glock".to_string(),
            nickname: "Glock".to_string(),
            country: "Austria".to_string(),
            popularity: 0,
        },
    )
    .expect("Failed to seed manufacturer");
}

pub fn create_test_gun(state: &AppState, owner_id: i64, name: &str) -> Gun {
    let conn = state.conn().expect("Failed to get connection");
    queries::create_gun(
        &conn,
        owner_id,
        &CreateGun {
            name: name.to_string(),
            weapon_type_id: 1,
            caliber_id: 1,
            manufacturer_id: 1,
            acquired: None,
            description: String::new(),
        },
    )
    .expect("Failed to create test gun")
}

/// Cookie header for a logged-in session.
pub fn session_cookie(email: &str) -> String {
    format!("is_logged_in=true; user_email={}", email)
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone()
        .oneshot(request)
        .await
        .expect("Request should not fail")
}

pub async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(app, builder.body(Body::empty()).expect("Failed to build request")).await
}

pub async fn post_form(
    app: &Router,
    uri: &str,
    cookie: Option<&str>,
    form: &str,
) -> Response<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    send(
        app,
        builder
            .body(Body::from(form.to_string()))
            .expect("Failed to build request"),
    )
    .await
}

/// POST a webhook event with the test-mode signature and the processor's
/// user agent.
pub async fn post_webhook(app: &Router, body: serde_json::Value) -> Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "Stripe/1.0")
        .header("stripe-signature", "test_signature")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request");
    send(app, request).await
}

pub fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Response should carry a Location header")
        .to_str()
        .expect("Location should be valid UTF-8")
}

pub async fn body_string(response: Response<Body>) -> String {
    use http_body_util::BodyExt;
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("Body should be UTF-8")
}

pub fn assert_redirect(response: &Response<Body>, to: &str) {
    assert_eq!(
        response.status(),
        StatusCode::SEE_OTHER,
        "expected a 303 redirect to {}",
        to
    );
    assert_eq!(location(response), to);
}
