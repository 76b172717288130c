//! Account lifecycle: registration, confirmation, login, recovery,
//! soft deletion, reactivation.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::auth::{
    self, generate_token, hash_password, verify_password, CONFIRM_TOKEN_TTL_SECS,
    RECOVER_TOKEN_TTL_SECS,
};
use crate::db::{queries, AppState};
use crate::error::{msg, AppError, Result};
use crate::extractors::{Form, Query};
use crate::flash::{take_flash, FlashKind};
use crate::models::{validate_email_format, CreateUser};
use crate::rate_limit::client_identifier;
use crate::render::escape;

use super::{flash_redirect, require_user, response_page, see_other, too_many_requests};

fn register_form(email: &str, error: Option<&str>) -> String {
    let banner = error
        .map(|e| format!(r#"<p class="field-error">{}</p>"#, escape(e)))
        .unwrap_or_default();
    format!(
        r#"<h1>Register</h1>
{banner}
<form method="post" action="/register">
<label>Email <input type="email" name="email" value="{email}"></label>
<label>Password <input type="password" name="password"></label>
<label>Confirm password <input type="password" name="confirm_password"></label>
<button type="submit">Create account</button>
</form>"#,
        banner = banner,
        email = escape(email),
    )
}

pub async fn register_page(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    let (flash, jar) = take_flash(jar);
    Ok(response_page(
        &state,
        jar,
        "Register",
        flash.as_ref(),
        &register_form("", None),
    ))
}

#[derive(Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    let create = CreateUser {
        email: form.email.trim().to_string(),
        password: form.password.clone(),
    };
    // Empty or malformed fields are a hard 400.
    create.validate()?;

    // Mismatched passwords re-render inline so the email survives.
    if form.password != form.confirm_password {
        return Ok(response_page(
            &state,
            jar,
            "Register",
            None,
            &register_form(&create.email, Some("Passwords do not match")),
        ));
    }

    let conn = state.conn()?;
    if let Some(existing) = queries::get_user_by_email_any(&conn, &create.email)? {
        if existing.deleted_at.is_some() {
            // The account can be reactivated instead.
            return Ok(see_other(&format!(
                "/reactivate?email={}",
                urlencoding::encode(&create.email)
            )));
        }
        return Ok((
            StatusCode::BAD_REQUEST,
            state.renderer.page(
                "Register",
                None,
                &register_form(&create.email, Some(msg::EMAIL_ALREADY_REGISTERED)),
            ),
        )
            .into_response());
    }

    let token = generate_token();
    let expiry = queries::now() + CONFIRM_TOKEN_TTL_SECS;
    let password_hash = hash_password(&create.password)?;
    let user = queries::create_user(
        &conn,
        &create.email,
        &password_hash,
        Some(&token),
        Some(expiry),
    )?;

    let verify_url = format!("{}/verify/{}", state.config.base_url, token);
    if let Err(e) = state.mailer.send_verification(&user.email, &verify_url) {
        tracing::warn!(error = %e, "verification email not sent");
    }
    tracing::info!(user_id = user.id, "user registered");
    Ok(see_other("/verification-pending"))
}

pub async fn verify(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
) -> Result<Response> {
    let conn = state.conn()?;
    let user = queries::get_user_by_confirm_token(&conn, &token)?;
    let valid = user
        .as_ref()
        .and_then(|u| u.confirm_token_expiry)
        .map(|expiry| queries::now() <= expiry)
        .unwrap_or(false);

    match user {
        Some(user) if valid => {
            queries::mark_confirmed(&conn, user.id)?;
            Ok(see_other("/login?verified=true"))
        }
        // Expired or unknown tokens render an error without mutating.
        _ => Ok(response_page(
            &state,
            jar,
            "Verification failed",
            None,
            r#"<h1>Verification failed</h1>
<p>This verification link is invalid or has expired.</p>
<p><a href="/verification-pending">Request a new link</a></p>"#,
        )),
    }
}

fn login_form(verified: bool, error: Option<&str>) -> String {
    let banner = if let Some(e) = error {
        format!(r#"<p class="field-error">{}</p>"#, escape(e))
    } else if verified {
        r#"<p>Your email is verified. You can log in now.</p>"#.to_string()
    } else {
        String::new()
    };
    format!(
        r#"<h1>Log in</h1>
{banner}
<form method="post" action="/login">
<label>Email <input type="email" name="email"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">Log in</button>
</form>
<p><a href="/recover">Forgot your password?</a></p>"#,
        banner = banner,
    )
}

#[derive(Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    pub verified: Option<String>,
}

pub async fn login_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Result<Response> {
    let (flash, jar) = take_flash(jar);
    let verified = query.verified.as_deref() == Some("true");
    Ok(response_page(
        &state,
        jar,
        "Log in",
        flash.as_ref(),
        &login_form(verified, None),
    ))
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    if state
        .login_limiter
        .check(&client_identifier(&headers), queries::now())
        .is_err()
    {
        return Ok(too_many_requests());
    }

    let conn = state.conn()?;
    let user = queries::get_user_by_email(&conn, form.email.trim())?;

    let fail = |state: &AppState, jar: CookieJar, message: &str| {
        response_page(state, jar, "Log in", None, &login_form(false, Some(message)))
    };

    let Some(user) = user else {
        return Ok(fail(&state, jar, msg::INVALID_CREDENTIALS));
    };

    if !verify_password(&form.password, &user.password_hash) {
        queries::record_failed_login(&conn, user.id)?;
        return Ok(fail(&state, jar, msg::INVALID_CREDENTIALS));
    }
    if !user.confirmed {
        queries::record_failed_login(&conn, user.id)?;
        return Ok(fail(&state, jar, msg::VERIFY_BEFORE_LOGIN));
    }

    queries::reset_login_attempts(&conn, user.id)?;
    let jar = auth::login(jar, &user.email);
    tracing::info!(user_id = user.id, "login");
    Ok((jar, see_other("/owner")).into_response())
}

pub async fn logout(jar: CookieJar) -> Response {
    let jar = auth::logout(jar);
    (jar, see_other("/")).into_response()
}

pub async fn recover_page(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    let (flash, jar) = take_flash(jar);
    Ok(response_page(
        &state,
        jar,
        "Recover password",
        flash.as_ref(),
        r#"<h1>Recover password</h1>
<form method="post" action="/recover">
<label>Email <input type="email" name="email"></label>
<button type="submit">Send reset link</button>
</form>"#,
    ))
}

#[derive(Deserialize)]
pub struct RecoverForm {
    #[serde(default)]
    pub email: String,
}

pub async fn recover(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Form(form): Form<RecoverForm>,
) -> Result<Response> {
    if state
        .recover_limiter
        .check(&client_identifier(&headers), queries::now())
        .is_err()
    {
        return Ok(too_many_requests());
    }

    let conn = state.conn()?;
    // Same response whether or not the account exists.
    if let Some(user) = queries::get_user_by_email(&conn, form.email.trim())? {
        let token = generate_token();
        queries::set_recover_token(&conn, user.id, &token, queries::now() + RECOVER_TOKEN_TTL_SECS)?;
        let reset_url = format!("{}/reset-password/{}", state.config.base_url, token);
        if let Err(e) = state.mailer.send_recovery(&user.email, &reset_url) {
            tracing::warn!(error = %e, "recovery email not sent");
        }
    }
    Ok(flash_redirect(
        jar,
        "If that email is registered, a reset link is on its way.",
        FlashKind::Info,
        "/login",
    ))
}

fn reset_form(token: &str, error: Option<&str>) -> String {
    let banner = error
        .map(|e| format!(r#"<p class="field-error">{}</p>"#, escape(e)))
        .unwrap_or_default();
    format!(
        r#"<h1>Reset password</h1>
{banner}
<form method="post" action="/reset-password/{token}">
<label>New password <input type="password" name="password"></label>
<label>Confirm password <input type="password" name="confirm_password"></label>
<button type="submit">Reset password</button>
</form>"#,
        banner = banner,
        token = escape(token),
    )
}

fn recover_token_valid(user: &crate::models::User) -> bool {
    user.recover_token_expiry
        .map(|expiry| queries::now() <= expiry)
        .unwrap_or(false)
}

pub async fn reset_password_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
) -> Result<Response> {
    let conn = state.conn()?;
    match queries::get_user_by_recover_token(&conn, &token)? {
        Some(user) if recover_token_valid(&user) => Ok(response_page(
            &state,
            jar,
            "Reset password",
            None,
            &reset_form(&token, None),
        )),
        _ => Ok(response_page(
            &state,
            jar,
            "Reset failed",
            None,
            r#"<h1>Reset failed</h1><p>This reset link is invalid or has expired.</p>"#,
        )),
    }
}

#[derive(Deserialize)]
pub struct ResetForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Form(form): Form<ResetForm>,
) -> Result<Response> {
    let conn = state.conn()?;
    let user = queries::get_user_by_recover_token(&conn, &token)?;
    let Some(user) = user.filter(recover_token_valid) else {
        return Ok(response_page(
            &state,
            jar,
            "Reset failed",
            None,
            r#"<h1>Reset failed</h1><p>This reset link is invalid or has expired.</p>"#,
        ));
    };

    if form.password.is_empty() {
        return Err(AppError::ValidationFailed("Password is required".into()));
    }
    if form.password != form.confirm_password {
        return Ok(response_page(
            &state,
            jar,
            "Reset password",
            None,
            &reset_form(&token, Some("Passwords do not match")),
        ));
    }

    let password_hash = hash_password(&form.password)?;
    queries::update_password(&conn, user.id, &password_hash)?;
    Ok(flash_redirect(
        jar,
        "Your password has been reset. Please log in.",
        FlashKind::Success,
        "/login",
    ))
}

pub async fn verification_pending(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response> {
    let (flash, jar) = take_flash(jar);
    Ok(response_page(
        &state,
        jar,
        "Verify your email",
        flash.as_ref(),
        r#"<h1>Check your inbox</h1>
<p>We sent you a verification link. It expires in 24 hours.</p>
<form method="post" action="/resend-verification">
<label>Email <input type="email" name="email"></label>
<button type="submit">Resend verification email</button>
</form>"#,
    ))
}

#[derive(Deserialize)]
pub struct ResendForm {
    #[serde(default)]
    pub email: String,
}

pub async fn resend_verification(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ResendForm>,
) -> Result<Response> {
    validate_email_format(&form.email)?;
    let conn = state.conn()?;
    if let Some(user) = queries::get_user_by_email(&conn, form.email.trim())? {
        if !user.confirmed {
            let token = generate_token();
            queries::set_confirm_token(
                &conn,
                user.id,
                &token,
                queries::now() + CONFIRM_TOKEN_TTL_SECS,
            )?;
            let verify_url = format!("{}/verify/{}", state.config.base_url, token);
            if let Err(e) = state.mailer.send_verification(&user.email, &verify_url) {
                tracing::warn!(error = %e, "verification email not sent");
            }
        }
    }
    Ok(flash_redirect(
        jar,
        "If that email needs verification, a new link is on its way.",
        FlashKind::Info,
        "/verification-pending",
    ))
}

#[derive(Deserialize)]
pub struct ReactivateQuery {
    #[serde(default)]
    pub email: Option<String>,
}

pub async fn reactivate_page(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<ReactivateQuery>,
) -> Result<Response> {
    let (flash, jar) = take_flash(jar);
    let email = query.email.as_deref().unwrap_or("");
    let body = format!(
        r#"<h1>Reactivate your account</h1>
<p>This email belongs to a deleted account. Log in with your old password to restore it, along with its guns and subscription.</p>
<form method="post" action="/reactivate">
<label>Email <input type="email" name="email" value="{email}"></label>
<label>Password <input type="password" name="password"></label>
<button type="submit">Reactivate</button>
</form>"#,
        email = escape(email),
    );
    Ok(response_page(&state, jar, "Reactivate", flash.as_ref(), &body))
}

#[derive(Deserialize)]
pub struct ReactivateForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub async fn reactivate(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<ReactivateForm>,
) -> Result<Response> {
    let conn = state.conn()?;
    let user = queries::get_user_by_email_any(&conn, form.email.trim())?
        .filter(|u| u.deleted_at.is_some())
        .filter(|u| verify_password(&form.password, &u.password_hash));

    let Some(user) = user else {
        return Ok(flash_redirect(
            jar,
            msg::INVALID_CREDENTIALS,
            FlashKind::Error,
            "/reactivate",
        ));
    };

    queries::reactivate_user(&conn, user.id)?;
    tracing::info!(user_id = user.id, "account reactivated");
    let jar = auth::login(jar, &user.email);
    let jar = crate::flash::set_flash(
        jar,
        "Welcome back! Your account has been restored.",
        FlashKind::Success,
    );
    Ok((jar, see_other("/owner")).into_response())
}

pub async fn delete_account_page(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response> {
    if let Err(resp) = require_user(&state, &jar) {
        return Ok(resp);
    }
    let (flash, jar) = take_flash(jar);
    Ok(response_page(
        &state,
        jar,
        "Delete account",
        flash.as_ref(),
        r#"<h1>Delete your account</h1>
<p>Your guns and payment history are kept and restored if you ever reactivate.</p>
<form method="post" action="/owner/profile/delete">
<label>Password <input type="password" name="password"></label>
<label>Type DELETE to confirm <input type="text" name="confirmation"></label>
<button type="submit">Delete my account</button>
</form>"#,
    ))
}

#[derive(Deserialize)]
pub struct DeleteAccountForm {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirmation: String,
}

pub async fn delete_account(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<DeleteAccountForm>,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };

    if form.confirmation != "DELETE" {
        return Ok(flash_redirect(
            jar,
            "Please type DELETE to confirm.",
            FlashKind::Error,
            "/owner/profile/delete",
        ));
    }
    if !verify_password(&form.password, &user.password_hash) {
        return Ok(flash_redirect(
            jar,
            msg::INVALID_CREDENTIALS,
            FlashKind::Error,
            "/owner/profile/delete",
        ));
    }

    let conn = state.conn()?;
    queries::soft_delete_user(&conn, user.id)?;
    tracing::info!(user_id = user.id, "account soft-deleted");
    let jar = auth::logout(jar);
    let jar = crate::flash::set_flash(
        jar,
        "Your account has been deleted. We're sorry to see you go.",
        FlashKind::Info,
    );
    Ok((jar, see_other("/")).into_response())
}
