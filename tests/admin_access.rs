//! Admin gate and the operational dashboards behind it.

mod common;

use axum::http::{header, StatusCode};
use common::*;
use serde_json::json;

#[tokio::test]
async fn test_anonymous_visitor_is_sent_to_login() {
    let (state, _) = test_state();
    let app = app(state);

    let response = get(&app, "/admin/dashboard", None).await;
    assert_redirect(&response, "/login");
}

#[tokio::test]
async fn test_regular_user_is_sent_home() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "pleb@example.com");
    let app = app(state);

    let response = get(&app, "/admin/dashboard", Some(&session_cookie(&user.email))).await;
    assert_redirect(&response, "/owner");

    // The gate leaves a flash explaining the refusal.
    let flashed = response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .any(|v| v.to_str().map(|s| s.starts_with("flash_message")).unwrap_or(false));
    assert!(flashed);
}

#[tokio::test]
async fn test_admin_sees_dashboard() {
    let (state, _) = test_state();
    let admin = create_test_user(&state, "admin@example.com");
    make_admin(&state, admin.id);
    let app = app(state);

    let response = get(&app, "/admin/dashboard", Some(&session_cookie(&admin.email))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Admin dashboard"));
}

#[tokio::test]
async fn test_webhook_health_reports_counters() {
    let (state, _) = test_state();
    let admin = create_test_user(&state, "admin@example.com");
    make_admin(&state, admin.id);
    let app = app(state);

    post_webhook(&app, json!({"id": "evt_1", "type": "ping"})).await;

    let response = get(
        &app,
        "/admin/webhook-health",
        Some(&session_cookie(&admin.email)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value =
        serde_json::from_str(&body_string(response).await).expect("valid JSON");
    assert_eq!(body["total_requests"], 1);
    assert_eq!(body["successful_requests"], 1);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_detailed_health_includes_database_check() {
    let (state, _) = test_state();
    let admin = create_test_user(&state, "admin@example.com");
    make_admin(&state, admin.id);
    let app = app(state);

    let response = get(
        &app,
        "/admin/detailed-health",
        Some(&session_cookie(&admin.email)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body: serde_json::Value =
        serde_json::from_str(&body_string(response).await).expect("valid JSON");
    assert_eq!(body["database"], "ok");
    assert_eq!(body["webhook"]["status"], "idle");
}

#[tokio::test]
async fn test_error_metrics_capture_failed_requests() {
    let (state, _) = test_state();
    let admin = create_test_user(&state, "admin@example.com");
    make_admin(&state, admin.id);
    let app = app(state);

    // Trip a 404 so the middleware has something to record.
    let response = get(&app, "/owner/guns/999", Some(&session_cookie(&admin.email))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = get(
        &app,
        "/admin/error-metrics",
        Some(&session_cookie(&admin.email)),
    )
    .await;
    let body: serde_json::Value =
        serde_json::from_str(&body_string(response).await).expect("valid JSON");
    assert!(body["total"].as_u64().unwrap_or(0) >= 1);
}

#[tokio::test]
async fn test_admin_catalog_crud() {
    let (state, _) = test_state();
    let admin = create_test_user(&state, "admin@example.com");
    make_admin(&state, admin.id);
    let cookie = session_cookie(&admin.email);
    let app = app(state.clone());

    let response = post_form(
        &app,
        "/admin/weapon-types",
        Some(&cookie),
        "type=Shotgun&nickname=Scattergun&popularity=40",
    )
    .await;
    assert_redirect(&response, "/admin/weapon-types");

    let id = {
        let conn = state.conn().expect("Failed to get connection");
        queries::list_weapon_types(&conn).expect("list")[0].id
    };

    let response = post_form(
        &app,
        &format!("/admin/weapon-types/{}", id),
        Some(&cookie),
        "type=Shotgun&nickname=Boomstick&popularity=45",
    )
    .await;
    assert_redirect(&response, "/admin/weapon-types");

    let response = get(&app, &format!("/admin/weapon-types/{}", id), Some(&cookie)).await;
    assert!(body_string(response).await.contains("Boomstick"));

    let response = post_form(
        &app,
        &format!("/admin/weapon-types/{}/delete", id),
        Some(&cookie),
        "",
    )
    .await;
    assert_redirect(&response, "/admin/weapon-types");

    let conn = state.conn().expect("Failed to get connection");
    assert!(queries::list_weapon_types(&conn).expect("list").is_empty());
}

#[tokio::test]
async fn test_duplicate_catalog_name_rejected() {
    let (state, _) = test_state();
    let admin = create_test_user(&state, "admin@example.com");
    make_admin(&state, admin.id);
    seed_minimal_catalogs(&state);
    let app = app(state);

    let response = post_form(
        &app,
        "/admin/calibers",
        Some(&session_cookie(&admin.email)),
        "caliber=9mm+Parabellum&nickname=9&popularity=1",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
