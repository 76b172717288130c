//! HTTP surface: route table, auth gates, and the error-tracking
//! middleware.

pub mod admin;
pub mod auth;
pub mod guns;
pub mod home;
pub mod payment;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::cookie::CookieJar;
use tower_http::trace::TraceLayer;

use crate::db::AppState;
use crate::error::msg;
use crate::flash::{set_flash, FlashKind};
use crate::models::User;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home::index))
        // Authentication
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/recover", get(auth::recover_page).post(auth::recover))
        .route(
            "/reset-password/{token}",
            get(auth::reset_password_page).post(auth::reset_password),
        )
        .route("/verification-pending", get(auth::verification_pending))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/verify/{token}", get(auth::verify))
        .route(
            "/reactivate",
            get(auth::reactivate_page).post(auth::reactivate),
        )
        // Payment
        .route("/pricing", get(payment::pricing))
        .route("/checkout", get(payment::checkout_get).post(payment::checkout_post))
        .route("/webhook", post(payment::webhook))
        .route("/payment/success", get(payment::payment_success))
        .route("/payment/cancel", get(payment::payment_cancel))
        .route("/owner/payment-history", get(payment::payment_history))
        .route(
            "/subscription/cancel/confirm",
            get(payment::cancel_confirm),
        )
        .route("/subscription/cancel", post(payment::cancel_subscription))
        // Owner area
        .route("/owner", get(guns::owner_dashboard))
        .route("/owner/guns", get(guns::list).post(guns::create))
        .route("/owner/guns/new", get(guns::new_form))
        .route("/owner/guns/{id}", get(guns::show).post(guns::update))
        .route("/owner/guns/{id}/edit", get(guns::edit_form))
        .route("/owner/guns/{id}/delete", post(guns::delete))
        .route(
            "/owner/profile/delete",
            get(auth::delete_account_page).post(auth::delete_account),
        )
        // Admin area
        .merge(admin::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_errors,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Record error responses in the admin metrics.
async fn track_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        let kind = response
            .extensions()
            .get::<crate::error::ErrorKind>()
            .map(|k| k.0)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown"));
        state
            .error_metrics
            .record(kind, &path, status.as_u16(), crate::db::queries::now());
    }
    response
}

pub(crate) fn see_other(to: &str) -> Response {
    Redirect::to(to).into_response()
}

pub(crate) fn flash_redirect(
    jar: CookieJar,
    message: &str,
    kind: FlashKind,
    to: &str,
) -> Response {
    (set_flash(jar, message, kind), Redirect::to(to)).into_response()
}

/// Resolve the logged-in user or produce the login redirect.
pub(crate) fn require_user(
    state: &AppState,
    jar: &CookieJar,
) -> std::result::Result<User, Response> {
    let conn = match state.conn() {
        Ok(conn) => conn,
        Err(e) => return Err(e.into_response()),
    };
    match crate::auth::current_user(&conn, jar) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(flash_redirect(
            jar.clone(),
            msg::LOGIN_REQUIRED,
            FlashKind::Error,
            "/login",
        )),
        Err(e) => Err(e.into_response()),
    }
}

/// Like `require_user`, but the user must carry the admin flag.
/// Logged-in non-admins are sent back to their own area.
pub(crate) fn require_admin(
    state: &AppState,
    jar: &CookieJar,
) -> std::result::Result<User, Response> {
    let user = require_user(state, jar)?;
    if !user.is_admin {
        return Err(flash_redirect(
            jar.clone(),
            msg::ADMIN_REQUIRED,
            FlashKind::Error,
            "/owner",
        ));
    }
    Ok(user)
}

/// Render a page inside the site shell, committing any cookie changes
/// (consumed flashes) alongside it.
pub(crate) fn response_page(
    state: &AppState,
    jar: CookieJar,
    title: &str,
    flash: Option<&crate::flash::Flash>,
    body: &str,
) -> Response {
    (jar, state.renderer.page(title, flash, body)).into_response()
}

/// 429 with a minimal body, bypassing the HTML error pages.
pub(crate) fn too_many_requests() -> Response {
    (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response()
}
