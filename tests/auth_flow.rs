//! Account lifecycle: registration, verification, login, soft deletion,
//! and reactivation.

mod common;

use axum::http::StatusCode;
use common::*;

/// Token from the last URL the mailer sent (".../verify/{token}" or
/// ".../reset-password/{token}").
fn last_mailed_token(mailer: &MockMailer) -> String {
    let sent = mailer.sent.lock().expect("mailer lock");
    let (_, url) = sent.last().expect("an email should have been sent");
    url.rsplit('/').next().expect("url has a path").to_string()
}

#[tokio::test]
async fn test_register_verify_login_round_trip() {
    let (state, mailer) = test_state();
    let app = app(state.clone());

    let response = post_form(
        &app,
        "/register",
        None,
        "email=new%40example.com&password=secret123&confirm_password=secret123",
    )
    .await;
    assert_redirect(&response, "/verification-pending");

    // Unverified accounts cannot log in yet.
    let response = post_form(
        &app,
        "/login",
        None,
        "email=new%40example.com&password=secret123",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response)
        .await
        .contains("verify your email"));

    let token = last_mailed_token(&mailer);
    let response = get(&app, &format!("/verify/{}", token), None).await;
    assert_redirect(&response, "/login?verified=true");

    let response = post_form(
        &app,
        "/login",
        None,
        "email=new%40example.com&password=secret123",
    )
    .await;
    assert_redirect(&response, "/owner");
    let cookies: Vec<_> = response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap_or("").to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("is_logged_in=true")));
    assert!(cookies
        .iter()
        .any(|c| c.starts_with("user_email=new@example.com")));
}

#[tokio::test]
async fn test_register_rejects_mismatched_passwords() {
    let (state, _) = test_state();
    let app = app(state.clone());

    let response = post_form(
        &app,
        "/register",
        None,
        "email=new%40example.com&password=one111111&confirm_password=two222222",
    )
    .await;
    // Inline re-render, not a redirect.
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Passwords do not match"));

    let conn = state.conn().expect("Failed to get connection");
    assert!(queries::get_user_by_email(&conn, "new@example.com")
        .expect("query")
        .is_none());
}

#[tokio::test]
async fn test_register_duplicate_email_is_a_hard_error() {
    let (state, _) = test_state();
    create_test_user(&state, "taken@example.com");
    let app = app(state);

    let response = post_form(
        &app,
        "/register",
        None,
        "email=taken%40example.com&password=secret123&confirm_password=secret123",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_expired_verification_token_does_not_confirm() {
    let (state, mailer) = test_state();
    let app = app(state.clone());

    post_form(
        &app,
        "/register",
        None,
        "email=slow%40example.com&password=secret123&confirm_password=secret123",
    )
    .await;
    let token = last_mailed_token(&mailer);

    {
        let conn = state.conn().expect("Failed to get connection");
        conn.execute(
            "UPDATE users SET confirm_token_expiry = ?1 WHERE email = 'slow@example.com'",
            [queries::now() - 10],
        )
        .expect("Failed to expire token");
    }

    let response = get(&app, &format!("/verify/{}", token), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("invalid or has expired"));

    let conn = state.conn().expect("Failed to get connection");
    let user = queries::get_user_by_email(&conn, "slow@example.com")
        .expect("query")
        .expect("user exists");
    assert!(!user.confirmed);
}

#[tokio::test]
async fn test_wrong_password_rerenders_login() {
    let (state, _) = test_state();
    create_test_user(&state, "user@example.com");
    let app = app(state);

    let response = post_form(
        &app,
        "/login",
        None,
        "email=user%40example.com&password=wrong",
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_string(response).await.contains("Invalid email or password"));
}

#[tokio::test]
async fn test_password_recovery_resets_password() {
    let (state, mailer) = test_state();
    create_test_user(&state, "forgot@example.com");
    let app = app(state.clone());

    let response = post_form(&app, "/recover", None, "email=forgot%40example.com").await;
    assert_redirect(&response, "/login");

    let token = last_mailed_token(&mailer);
    let response = post_form(
        &app,
        &format!("/reset-password/{}", token),
        None,
        "password=newsecret1&confirm_password=newsecret1",
    )
    .await;
    assert_redirect(&response, "/login");

    let response = post_form(
        &app,
        "/login",
        None,
        "email=forgot%40example.com&password=newsecret1",
    )
    .await;
    assert_redirect(&response, "/owner");

    // The token is single-use.
    let response = get(&app, &format!("/reset-password/{}", token), None).await;
    assert!(body_string(response).await.contains("invalid or has expired"));
}

#[tokio::test]
async fn test_recovery_response_is_uniform_for_unknown_email() {
    let (state, mailer) = test_state();
    let app = app(state);

    let response = post_form(&app, "/recover", None, "email=nobody%40example.com").await;
    assert_redirect(&response, "/login");
    assert!(mailer.sent.lock().expect("mailer lock").is_empty());
}

#[tokio::test]
async fn test_delete_then_reactivate_restores_account() {
    let (state, _) = test_state();
    seed_minimal_catalogs(&state);
    let user = create_test_user(&state, "leaver@example.com");
    set_subscription(&state, user.id, Tier::Yearly, queries::now() + 86_400);
    create_test_gun(&state, user.id, "Keeper");
    let app = app(state.clone());

    let response = post_form(
        &app,
        "/owner/profile/delete",
        Some(&session_cookie(&user.email)),
        "password=password123&confirmation=DELETE",
    )
    .await;
    assert_redirect(&response, "/");

    // The session is gone and the account no longer resolves.
    let response = get(&app, "/owner", Some(&session_cookie(&user.email))).await;
    assert_redirect(&response, "/login");

    // Registering the same email points at reactivation instead.
    let response = post_form(
        &app,
        "/register",
        None,
        "email=leaver%40example.com&password=secret123&confirm_password=secret123",
    )
    .await;
    assert_redirect(&response, "/reactivate?email=leaver%40example.com");

    let response = post_form(
        &app,
        "/reactivate",
        None,
        "email=leaver%40example.com&password=password123",
    )
    .await;
    assert_redirect(&response, "/owner");

    let conn = state.conn().expect("Failed to get connection");
    let restored = queries::get_user(&conn, user.id)
        .expect("query")
        .expect("account restored");
    assert_eq!(restored.subscription_tier, Tier::Yearly);
    assert_eq!(
        queries::count_guns_for_owner(&conn, user.id).expect("count"),
        1
    );
}

#[tokio::test]
async fn test_reactivate_redirect_survives_plus_addressing() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "leaver+tag@example.com");
    {
        let conn = state.conn().expect("Failed to get connection");
        queries::soft_delete_user(&conn, user.id).expect("soft delete");
    }
    let app = app(state);

    // The plus sign must not decay into a space across the redirect.
    let response = post_form(
        &app,
        "/register",
        None,
        "email=leaver%2Btag%40example.com&password=secret123&confirm_password=secret123",
    )
    .await;
    assert_redirect(&response, "/reactivate?email=leaver%2Btag%40example.com");

    let response = post_form(
        &app,
        "/reactivate",
        None,
        "email=leaver%2Btag%40example.com&password=password123",
    )
    .await;
    assert_redirect(&response, "/owner");
}

#[tokio::test]
async fn test_delete_requires_exact_confirmation() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "hesitant@example.com");
    let app = app(state.clone());

    let response = post_form(
        &app,
        "/owner/profile/delete",
        Some(&session_cookie(&user.email)),
        "password=password123&confirmation=delete",
    )
    .await;
    assert_redirect(&response, "/owner/profile/delete");

    let conn = state.conn().expect("Failed to get connection");
    assert!(queries::get_user(&conn, user.id).expect("query").is_some());
}

#[tokio::test]
async fn test_reactivate_rejects_wrong_password() {
    let (state, _) = test_state();
    let user = create_test_user(&state, "leaver@example.com");
    {
        let conn = state.conn().expect("Failed to get connection");
        queries::soft_delete_user(&conn, user.id).expect("soft delete");
    }
    let app = app(state);

    let response = post_form(
        &app,
        "/reactivate",
        None,
        "email=leaver%40example.com&password=wrong",
    )
    .await;
    assert_redirect(&response, "/reactivate");
}
