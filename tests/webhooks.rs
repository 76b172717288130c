//! Webhook endpoint behavior: signature checks, event handling, and the
//! health counters the admin surface reports.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::*;
use serde_json::json;

fn set_stripe_customer(state: &AppState, user_id: i64, customer: &str) {
    let conn = state.conn().expect("Failed to get connection");
    conn.execute(
        "UPDATE users SET stripe_customer_id = ?2 WHERE id = ?1",
        rusqlite::params![user_id, customer],
    )
    .expect("Failed to set customer id");
}

async fn post_signed(app: &axum::Router, body: &str, signature: &str) -> axum::http::Response<Body> {
    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::USER_AGENT, "Stripe/1.0")
        .header("stripe-signature", signature)
        .body(Body::from(body.to_string()))
        .expect("Failed to build request");
    send(app, request).await
}

#[tokio::test]
async fn test_invalid_signature_rejected() {
    let (state, _) = test_state();
    let app = app(state);

    let body = json!({"id": "evt_1", "type": "checkout.session.completed"}).to_string();
    let response = post_signed(&app, &body, "t=123,v1=deadbeef").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = post_signed(&app, &body, "garbage").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_real_signature_accepted() {
    let (state, _) = test_state();
    let app = app(state);

    let body = json!({"id": "evt_real", "type": "ping"}).to_string();
    let signature = armory::payments::sign_payload(
        "whsec_test_secret",
        body.as_bytes(),
        queries::now(),
    );
    let response = post_signed(&app, &body, &signature).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_stale_signature_rejected() {
    let (state, _) = test_state();
    let app = app(state);

    let body = json!({"id": "evt_old", "type": "ping"}).to_string();
    let signature = armory::payments::sign_payload(
        "whsec_test_secret",
        body.as_bytes(),
        queries::now() - 600,
    );
    let response = post_signed(&app, &body, &signature).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_event_acknowledged() {
    let (state, _) = test_state();
    let app = app(state);

    let response = post_webhook(
        &app,
        json!({"id": "evt_x", "type": "charge.refunded", "data": {"object": {}}}),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invoice_paid_renews_subscription() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "renewer@example.com");
    let expires = queries::now() + 7 * 86_400;
    set_subscription(&state, user.id, Tier::Monthly, expires);
    set_stripe_customer(&state, user.id, "cus_123");
    let app = app(state.clone());

    let response = post_webhook(
        &app,
        json!({
            "id": "evt_renewal",
            "type": "invoice.paid",
            "data": { "object": {
                "customer": "cus_123",
                "subscription": "sub_123",
                "amount_paid": 500,
                "currency": "usd",
                "period_start": 1_700_000_000
            }}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let conn = state.conn().expect("Failed to get connection");
    let updated = queries::get_user(&conn, user.id)
        .expect("Failed to load user")
        .expect("User missing");
    assert_eq!(updated.subscription_tier, Tier::Monthly);
    assert!(
        updated.subscription_expires_at > expires,
        "renewal extends the current period"
    );
}

#[tokio::test]
async fn test_initial_invoice_settles_with_its_checkout_session() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "firsttimer@example.com");
    let app = app(state.clone());

    let response = post_webhook(
        &app,
        json!({
            "id": "evt_session",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_live_abc",
                "client_reference_id": user.id.to_string(),
                "customer": "cus_new",
                "subscription": "sub_new",
                "amount_total": 500,
                "currency": "usd",
                "metadata": { "subscription_tier": "monthly" }
            }}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let expires = {
        let conn = state.conn().expect("Failed to get connection");
        queries::get_user(&conn, user.id)
            .expect("Failed to load user")
            .expect("User missing")
            .subscription_expires_at
    };

    // The purchase's own invoice follows moments later under a different
    // event, marked as the subscription's creation.
    let response = post_webhook(
        &app,
        json!({
            "id": "evt_first_invoice",
            "type": "invoice.paid",
            "data": { "object": {
                "customer": "cus_new",
                "subscription": "sub_new",
                "billing_reason": "subscription_create",
                "amount_paid": 500,
                "currency": "usd",
                "period_start": queries::now()
            }}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let conn = state.conn().expect("Failed to get connection");
    let payments =
        queries::list_payments_for_user(&conn, user.id).expect("Failed to list payments");
    assert_eq!(payments.len(), 1, "one purchase, one payment row");

    let updated = queries::get_user(&conn, user.id)
        .expect("Failed to load user")
        .expect("User missing");
    assert_eq!(
        updated.subscription_expires_at, expires,
        "expiry extended exactly once"
    );
}

#[tokio::test]
async fn test_invoice_inside_a_paid_period_does_not_extend() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "firsttimer@example.com");
    let app = app(state.clone());

    let response = post_webhook(
        &app,
        json!({
            "id": "evt_session",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_live_abc",
                "client_reference_id": user.id.to_string(),
                "customer": "cus_new",
                "subscription": "sub_new",
                "amount_total": 500,
                "currency": "usd",
                "metadata": { "subscription_tier": "monthly" }
            }}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let (expires, period_start) = {
        let conn = state.conn().expect("Failed to get connection");
        let u = queries::get_user(&conn, user.id)
            .expect("Failed to load user")
            .expect("User missing");
        let p = queries::list_payments_for_user(&conn, user.id).expect("Failed to list payments");
        (u.subscription_expires_at, p[0].period_start)
    };

    // Some payloads omit the billing reason; the invoice still lands
    // inside the period the session already paid for.
    let response = post_webhook(
        &app,
        json!({
            "id": "evt_first_invoice",
            "type": "invoice.paid",
            "data": { "object": {
                "customer": "cus_new",
                "subscription": "sub_new",
                "amount_paid": 500,
                "currency": "usd",
                "period_start": period_start
            }}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    {
        let conn = state.conn().expect("Failed to get connection");
        assert_eq!(
            queries::list_payments_for_user(&conn, user.id)
                .expect("Failed to list payments")
                .len(),
            1
        );
        let updated = queries::get_user(&conn, user.id)
            .expect("Failed to load user")
            .expect("User missing");
        assert_eq!(updated.subscription_expires_at, expires);
    }

    // The next cycle starts where this period ends and still renews.
    let response = post_webhook(
        &app,
        json!({
            "id": "evt_renewal",
            "type": "invoice.paid",
            "data": { "object": {
                "customer": "cus_new",
                "subscription": "sub_new",
                "billing_reason": "subscription_cycle",
                "amount_paid": 500,
                "currency": "usd",
                "period_start": expires
            }}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let conn = state.conn().expect("Failed to get connection");
    let renewed = queries::get_user(&conn, user.id)
        .expect("Failed to load user")
        .expect("User missing");
    assert!(renewed.subscription_expires_at > expires);
    assert_eq!(
        queries::list_payments_for_user(&conn, user.id)
            .expect("Failed to list payments")
            .len(),
        2
    );
}

#[tokio::test]
async fn test_failed_invoice_records_failure_without_tier_change() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "delinquent@example.com");
    set_subscription(&state, user.id, Tier::Monthly, queries::now() + 86_400);
    set_stripe_customer(&state, user.id, "cus_bad");
    let app = app(state.clone());

    let response = post_webhook(
        &app,
        json!({
            "id": "evt_fail",
            "type": "invoice.payment_failed",
            "data": { "object": {
                "customer": "cus_bad",
                "amount_due": 500,
                "currency": "usd"
            }}
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let conn = state.conn().expect("Failed to get connection");
    let payments =
        queries::list_payments_for_user(&conn, user.id).expect("Failed to list payments");
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].status, PaymentStatus::Failed);
    assert_eq!(payments[0].description, "Failed Invoice Payment");

    let updated = queries::get_user(&conn, user.id)
        .expect("Failed to load user")
        .expect("User missing");
    assert_eq!(updated.subscription_tier, Tier::Monthly, "access keeps until expiry");
}

#[tokio::test]
async fn test_subscription_deleted_downgrades_to_free() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "churned@example.com");
    set_subscription(&state, user.id, Tier::Yearly, queries::now() + 86_400);
    set_stripe_customer(&state, user.id, "cus_gone");
    let app = app(state.clone());

    let response = post_webhook(
        &app,
        json!({
            "id": "evt_del",
            "type": "customer.subscription.deleted",
            "data": { "object": { "customer": "cus_gone" } }
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let conn = state.conn().expect("Failed to get connection");
    let updated = queries::get_user(&conn, user.id)
        .expect("Failed to load user")
        .expect("User missing");
    assert_eq!(updated.subscription_tier, Tier::Free);
    assert!(!updated.has_active_subscription(queries::now()));
}

#[tokio::test]
async fn test_event_for_unknown_customer_is_acknowledged() {
    let (state, _) = test_state();
    let app = app(state.clone());

    // A retry cannot fix an unknown customer, so the event is not failed.
    let response = post_webhook(
        &app,
        json!({
            "id": "evt_stranger",
            "type": "invoice.paid",
            "data": { "object": { "customer": "cus_unknown", "amount_paid": 500 } }
        }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "acknowledged");
}

#[tokio::test]
async fn test_webhook_stats_track_outcomes() {
    let (state, _) = test_state();
    let app = app(state.clone());

    post_webhook(&app, json!({"id": "evt_ok", "type": "ping"})).await;
    let body = json!({"id": "evt_bad", "type": "ping"}).to_string();
    post_signed(&app, &body, "t=1,v1=00").await;

    let snapshot = state.webhook_stats.snapshot();
    assert_eq!(snapshot.total_requests, 2);
    assert_eq!(snapshot.successful_requests, 1);
    assert_eq!(snapshot.failed_requests, 1);
}
