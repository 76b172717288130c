//! End-to-end purchase lifecycle: checkout, webhook delivery, the success
//! redirect, and deduplication between the two paths.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

fn reload_user(state: &AppState, id: i64) -> User {
    let conn = state.conn().expect("Failed to get connection");
    queries::get_user(&conn, id)
        .expect("Failed to load user")
        .expect("User missing")
}

fn payments_for(state: &AppState, id: i64) -> Vec<Payment> {
    let conn = state.conn().expect("Failed to get connection");
    queries::list_payments_for_user(&conn, id).expect("Failed to list payments")
}

#[tokio::test]
async fn test_checkout_redirects_to_test_session() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "buyer@example.com");
    let app = app(state);

    let response = post_form(
        &app,
        "/checkout",
        Some(&session_cookie(&user.email)),
        "tier=monthly",
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response),
        &format!(
            "http://localhost:8080/payment/success?session_id=cs_test_{}_monthly",
            user.id
        )
    );
}

#[tokio::test]
async fn test_checkout_rejects_unknown_tier() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "buyer@example.com");
    let app = app(state);

    let response = post_form(
        &app,
        "/checkout",
        Some(&session_cookie(&user.email)),
        "tier=platinum",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_form(
        &app,
        "/checkout",
        Some(&session_cookie(&user.email)),
        "tier=free",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_rejects_downgrade_before_processor() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "lifer@example.com");
    set_subscription(&state, user.id, Tier::Lifetime, queries::now() + 86_400);
    let app = app(state.clone());

    let response = post_form(
        &app,
        "/checkout",
        Some(&session_cookie(&user.email)),
        "tier=monthly",
    )
    .await;

    assert_redirect(&response, "/pricing");
    assert!(payments_for(&state, user.id).is_empty());
    assert_eq!(reload_user(&state, user.id).subscription_tier, Tier::Lifetime);
}

#[tokio::test]
async fn test_success_redirect_applies_purchase() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "buyer@example.com");
    let app = app(state.clone());

    let uri = format!("/payment/success?session_id=cs_test_{}_monthly", user.id);
    let response = get(&app, &uri, Some(&session_cookie(&user.email))).await;
    assert_redirect(&response, "/owner");

    let updated = reload_user(&state, user.id);
    assert_eq!(updated.subscription_tier, Tier::Monthly);
    assert!(updated.subscription_expires_at > queries::now());

    let payments = payments_for(&state, user.id);
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount, 500);
    assert_eq!(payments[0].status, PaymentStatus::Succeeded);
}

#[tokio::test]
async fn test_webhook_and_redirect_apply_once() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "buyer@example.com");
    let app = app(state.clone());

    let session_id = format!("cs_test_{}_yearly", user.id);
    let event = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": session_id,
            "client_reference_id": user.id.to_string(),
            "amount_total": 3000,
            "currency": "usd",
            "metadata": { "subscription_tier": "yearly" }
        }}
    });

    let response = post_webhook(&app, event.clone()).await;
    assert_eq!(response.status(), StatusCode::OK);

    // The browser lands on the success URL after the webhook already ran.
    let uri = format!("/payment/success?session_id={}", session_id);
    let response = get(&app, &uri, Some(&session_cookie(&user.email))).await;
    assert_redirect(&response, "/owner");

    // And the processor redelivers the event.
    let response = post_webhook(&app, event).await;
    assert_eq!(response.status(), StatusCode::OK);

    let payments = payments_for(&state, user.id);
    assert_eq!(payments.len(), 1, "all three deliveries share one dedup key");
    assert_eq!(reload_user(&state, user.id).subscription_tier, Tier::Yearly);
}

#[tokio::test]
async fn test_duplicate_webhook_extends_expiry_once() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "buyer@example.com");
    let app = app(state.clone());

    let event = json!({
        "id": "evt_dup",
        "type": "checkout.session.completed",
        "data": { "object": {
            "id": format!("cs_test_{}_monthly", user.id),
            "client_reference_id": user.id.to_string(),
            "amount_total": 500,
            "currency": "usd",
            "metadata": { "subscription_tier": "monthly" }
        }}
    });

    post_webhook(&app, event.clone()).await;
    let first_expiry = reload_user(&state, user.id).subscription_expires_at;

    post_webhook(&app, event).await;
    let second_expiry = reload_user(&state, user.id).subscription_expires_at;

    assert_eq!(first_expiry, second_expiry);
    assert_eq!(payments_for(&state, user.id).len(), 1);
}

#[tokio::test]
async fn test_mid_cycle_upgrade_keeps_both_payments() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "upgrader@example.com");
    let app = app(state.clone());

    let uri = format!("/payment/success?session_id=cs_test_{}_monthly", user.id);
    get(&app, &uri, Some(&session_cookie(&user.email))).await;

    let uri = format!("/payment/success?session_id=cs_test_{}_yearly", user.id);
    let response = get(&app, &uri, Some(&session_cookie(&user.email))).await;
    assert_redirect(&response, "/owner");

    let updated = reload_user(&state, user.id);
    assert_eq!(updated.subscription_tier, Tier::Yearly);

    let mut amounts: Vec<i64> = payments_for(&state, user.id)
        .iter()
        .map(|p| p.amount)
        .collect();
    amounts.sort();
    assert_eq!(amounts, vec![500, 3000]);
}

#[tokio::test]
async fn test_success_redirect_without_session_goes_home() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "buyer@example.com");
    let app = app(state);

    let response = get(
        &app,
        "/payment/success?session_id=",
        Some(&session_cookie(&user.email)),
    )
    .await;
    assert_redirect(&response, "/owner");
}

#[tokio::test]
async fn test_payment_cancel_redirects_to_pricing() {
    let (state, _) = test_state();
    let app = app(state);

    let response = get(&app, "/payment/cancel", None).await;
    assert_redirect(&response, "/pricing");
}

#[tokio::test]
async fn test_repeat_success_visit_is_not_an_error() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "refresher@example.com");
    let app = app(state.clone());

    let uri = format!("/payment/success?session_id=cs_test_{}_monthly", user.id);
    get(&app, &uri, Some(&session_cookie(&user.email))).await;
    // Refreshing the success page replays the same session id.
    let response = get(&app, &uri, Some(&session_cookie(&user.email))).await;

    assert_redirect(&response, "/owner");
    assert_eq!(payments_for(&state, user.id).len(), 1);
}

#[tokio::test]
async fn test_cancel_outcomes_land_on_payment_history() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "quitter@example.com");
    set_subscription(&state, user.id, Tier::Monthly, queries::now() + 14 * 86_400);
    let cookie = session_cookie(&user.email);
    let app = app(state.clone());

    let response = post_form(&app, "/subscription/cancel", Some(&cookie), "").await;
    assert_redirect(&response, "/owner/payment-history");

    // The success flash names the date access runs out.
    let set_cookies: Vec<String> = response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(String::from))
        .collect();
    assert!(set_cookies
        .iter()
        .any(|c| c.contains("You keep access until")));

    assert!(reload_user(&state, user.id).subscription_canceled);

    // Cancelling again is informational, same destination.
    let response = post_form(&app, "/subscription/cancel", Some(&cookie), "").await;
    assert_redirect(&response, "/owner/payment-history");
    let set_cookies: Vec<String> = response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(String::from))
        .collect();
    assert!(set_cookies.iter().any(|c| c.contains("flash_type=info")));
}

#[tokio::test]
async fn test_cancel_without_recurring_subscription_is_rejected() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "freeloader@example.com");
    let app = app(state.clone());

    let response = post_form(
        &app,
        "/subscription/cancel",
        Some(&session_cookie(&user.email)),
        "",
    )
    .await;
    assert_redirect(&response, "/owner/payment-history");
    assert!(!reload_user(&state, user.id).subscription_canceled);
}
