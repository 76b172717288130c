//! Checkout, the webhook endpoint, and the success-redirect finalizer.
//!
//! Both purchase delivery paths converge on the subscription mutator with
//! the same deduplication key; neither path is suppressed.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use crate::db::{queries, AppState};
use crate::error::{msg, AppError, Result};
use crate::extractors::{Form, Query};
use crate::flash::{set_flash, take_flash, FlashKind};
use crate::models::{CreatePayment, PaymentStatus, User};
use crate::payments::verify_signature;
use crate::rate_limit::{client_identifier, is_processor_user_agent};
use crate::subscription::{
    apply_purchase, dedup::DedupKey, mutator, mutator::Purchase, plan_upgrade, PurchaseOutcome,
    Tier,
};

use super::{flash_redirect, require_user, response_page, see_other, too_many_requests};

// ---- Pricing ----

pub async fn pricing(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    let (flash, jar) = take_flash(jar);
    let mut rows = String::new();
    for tier in [
        Tier::Monthly,
        Tier::Yearly,
        Tier::Lifetime,
        Tier::PremiumLifetime,
    ] {
        rows.push_str(&format!(
            r#"<li>{name} - ${price:.2}
<form method="post" action="/checkout"><input type="hidden" name="tier" value="{tier}"><button type="submit">Subscribe</button></form></li>
"#,
            name = tier.plan_name(),
            price = tier.price_cents() as f64 / 100.0,
            tier = tier.as_str(),
        ));
    }
    let body = format!(
        r#"<h1>Pricing</h1>
<p>The free tier includes up to 2 guns. Paid plans are unlimited.</p>
<ul>{}</ul>"#,
        rows
    );
    Ok(response_page(&state, jar, "Pricing", flash.as_ref(), &body))
}

// ---- Checkout coordinator ----

#[derive(Deserialize)]
pub struct CheckoutParams {
    #[serde(default)]
    pub tier: String,
}

pub async fn checkout_get(
    state: State<AppState>,
    jar: CookieJar,
    Query(params): Query<CheckoutParams>,
) -> Result<Response> {
    start_checkout(state, jar, &params.tier).await
}

pub async fn checkout_post(
    state: State<AppState>,
    jar: CookieJar,
    Form(params): Form<CheckoutParams>,
) -> Result<Response> {
    start_checkout(state, jar, &params.tier).await
}

async fn start_checkout(
    State(state): State<AppState>,
    jar: CookieJar,
    tier: &str,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };

    let target: Tier = tier
        .parse()
        .map_err(|_| AppError::ValidationFailed(format!("unknown tier {:?}", tier)))?;
    if target == Tier::Free {
        return Err(AppError::ValidationFailed("cannot check out the free tier".into()));
    }

    // Policy first: a rejected transition never reaches the processor.
    if let Err(e) = plan_upgrade(
        user.subscription_tier,
        user.subscription_expires_at,
        target,
        queries::now(),
    ) {
        tracing::info!(user_id = user.id, %target, "checkout rejected: {}", e);
        return Ok(flash_redirect(
            jar,
            "That plan is not an upgrade from your current subscription.",
            FlashKind::Error,
            "/pricing",
        ));
    }

    if state.config.test_mode() {
        return Ok(see_other(&format!(
            "{}/payment/success?session_id=cs_test_{}_{}",
            state.config.base_url,
            user.id,
            target.as_str()
        )));
    }

    let stripe = state
        .stripe
        .as_ref()
        .ok_or_else(|| AppError::Internal("stripe client missing outside test mode".into()))?;
    let success_url = format!(
        "{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}",
        state.config.base_url
    );
    let cancel_url = format!("{}/payment/cancel", state.config.base_url);

    match stripe
        .create_checkout_session(user.id, target, &success_url, &cancel_url)
        .await
    {
        Ok(session) => Ok(see_other(&session.url)),
        Err(e) => {
            tracing::error!(user_id = user.id, error = %e, "checkout session creation failed");
            let jar = set_flash(jar, msg::CHECKOUT_FAILED, FlashKind::Error);
            Ok((
                StatusCode::BAD_GATEWAY,
                jar,
                state.renderer.page(
                    "Checkout failed",
                    None,
                    r#"<h1>Checkout failed</h1><p>We couldn't reach the payment processor. Please try again shortly.</p>"#,
                ),
            )
                .into_response())
        }
    }
}

// ---- Webhook ingestor ----

#[derive(Deserialize)]
struct WebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: EventData,
}

#[derive(Default, Deserialize)]
struct EventData {
    #[serde(default)]
    object: EventObject,
}

#[derive(Default, Deserialize)]
struct EventObject {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    amount_paid: Option<i64>,
    #[serde(default)]
    amount_due: Option<i64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    customer: Option<String>,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    period_start: Option<i64>,
    #[serde(default)]
    billing_reason: Option<String>,
    #[serde(default)]
    metadata: EventMetadata,
}

#[derive(Default, Deserialize)]
struct EventMetadata {
    #[serde(default)]
    subscription_tier: Option<String>,
}

const SIGNATURE_TOLERANCE_SECS: i64 = 300;

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let now = queries::now();
    state.webhook_stats.record_request(now);

    // Processor-originated requests bypass the limiter.
    if !is_processor_user_agent(&headers) {
        if state
            .webhook_limiter
            .check(&client_identifier(&headers), now)
            .is_err()
        {
            state.webhook_stats.record_failure(now, "rate limited");
            return too_many_requests();
        }
    }

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let verified = if state.config.test_mode() && signature == "test_signature" {
        true
    } else {
        match verify_signature(
            &state.config.webhook_secret,
            &body,
            signature,
            now,
            SIGNATURE_TOLERANCE_SECS,
        ) {
            Ok(ok) => ok,
            Err(e) => {
                state.webhook_stats.record_failure(now, &e.to_string());
                return e.into_response();
            }
        }
    };
    if !verified {
        state.webhook_stats.record_failure(now, "signature mismatch");
        return AppError::SignatureInvalid("signature mismatch".into()).into_response();
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            state.webhook_stats.record_failure(now, "unparseable payload");
            return AppError::ValidationFailed(format!("bad webhook payload: {}", e))
                .into_response();
        }
    };

    match process_event(&state, &event, now) {
        Ok(outcome) => {
            tracing::info!(event = %event.event_type, outcome, "webhook processed");
            state.webhook_stats.record_success();
            (StatusCode::OK, "ok").into_response()
        }
        // Storage faults return 500 so the processor retries the event.
        Err(e @ (AppError::Database(_) | AppError::Pool(_) | AppError::Transient(_))) => {
            state.webhook_stats.record_failure(now, &e.to_string());
            e.into_response()
        }
        // Anything else is acknowledged; a retry would not change it.
        Err(e) => {
            tracing::warn!(event = %event.event_type, error = %e, "webhook event not applied");
            state.webhook_stats.record_failure(now, &e.to_string());
            (StatusCode::OK, "acknowledged").into_response()
        }
    }
}

fn process_event(state: &AppState, event: &WebhookEvent, now: i64) -> Result<&'static str> {
    let object = &event.data.object;
    match event.event_type.as_str() {
        "checkout.session.completed" => {
            let user_id = object
                .client_reference_id
                .as_deref()
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| {
                    AppError::ValidationFailed("missing client_reference_id".into())
                })?;
            let tier = checkout_tier(object, state.config.test_mode())?;
            let key = DedupKey::derive(
                object.id.as_deref(),
                object.subscription.as_deref(),
                object.period_start,
                &event.id,
            );
            let purchase = Purchase {
                target: tier,
                amount: object.amount_total.unwrap_or_else(|| tier.price_cents()),
                currency: object.currency.clone().unwrap_or_else(|| "usd".into()),
                stripe_customer_id: object.customer.clone(),
                stripe_subscription_id: object.subscription.clone(),
            };
            let mut conn = state.conn()?;
            match apply_purchase(&mut conn, user_id, &purchase, &key, now)? {
                PurchaseOutcome::Applied(_) => Ok("applied"),
                PurchaseOutcome::Duplicate => Ok("duplicate"),
            }
        }
        "invoice.paid" => {
            let mut conn = state.conn()?;
            let user = resolve_by_customer(&conn, object)?;
            // The initial invoice settles the same purchase as its checkout
            // session; applying it here would extend the period a second
            // time under a different key. Only later billing cycles renew.
            if object.billing_reason.as_deref() == Some("subscription_create") {
                tracing::info!(user_id = user.id, "initial invoice settled by its checkout session");
                return Ok("initial invoice");
            }
            if let Some(start) = object.period_start {
                if queries::has_succeeded_payment_covering(&conn, user.id, start)? {
                    tracing::info!(user_id = user.id, period_start = start, "invoice period already paid");
                    return Ok("period already paid");
                }
            }
            let amount = object.amount_paid.unwrap_or(0);
            let tier = Tier::from_amount(amount);
            let key = DedupKey::derive(
                None,
                object.subscription.as_deref(),
                object.period_start,
                &event.id,
            );
            let purchase = Purchase {
                target: tier,
                amount,
                currency: object.currency.clone().unwrap_or_else(|| "usd".into()),
                stripe_customer_id: object.customer.clone(),
                stripe_subscription_id: object.subscription.clone(),
            };
            match apply_purchase(&mut conn, user.id, &purchase, &key, now)? {
                PurchaseOutcome::Applied(_) => Ok("applied"),
                PurchaseOutcome::Duplicate => Ok("duplicate"),
            }
        }
        "invoice.payment_failed" => {
            let conn = state.conn()?;
            let user = resolve_by_customer(&conn, object)?;
            // Event id keys the failure so a later successful retry for the
            // same period still records its own payment.
            let key = DedupKey::derive(None, None, None, &event.id);
            let payment = CreatePayment {
                amount: object.amount_due.or(object.amount_paid).unwrap_or(0),
                currency: object.currency.clone().unwrap_or_else(|| "usd".into()),
                status: PaymentStatus::Failed,
                description: "Failed Invoice Payment".into(),
                tier: None,
                period_start: object.period_start.unwrap_or(0),
                period_end: 0,
            };
            queries::try_record_payment(&conn, user.id, &key, &payment)?;
            tracing::warn!(user_id = user.id, "invoice payment failed");
            Ok("payment failure recorded")
        }
        "customer.subscription.deleted" => {
            let conn = state.conn()?;
            let user = resolve_by_customer(&conn, object)?;
            queries::downgrade_to_free(&conn, user.id)?;
            tracing::info!(user_id = user.id, "subscription deleted, downgraded to free");
            Ok("downgraded")
        }
        _ => Ok("ignored"),
    }
}

fn resolve_by_customer(conn: &rusqlite::Connection, object: &EventObject) -> Result<User> {
    let customer = object
        .customer
        .as_deref()
        .ok_or_else(|| AppError::ValidationFailed("missing customer".into()))?;
    queries::get_user_by_stripe_customer(conn, customer)?
        .ok_or_else(|| AppError::NotFound(format!("customer {}", customer)))
}

/// Tier for a completed checkout session: metadata is authoritative; the
/// test-mode session suffix and the amount are fallbacks.
fn checkout_tier(object: &EventObject, test_mode: bool) -> Result<Tier> {
    if let Some(tier) = object
        .metadata
        .subscription_tier
        .as_deref()
        .and_then(|t| t.parse().ok())
    {
        return Ok(tier);
    }
    if test_mode {
        if let Some((_, tier)) = object
            .id
            .as_deref()
            .and_then(|id| id.strip_prefix("cs_test_"))
            .and_then(|rest| rest.split_once('_'))
        {
            if let Ok(tier) = tier.parse() {
                return Ok(tier);
            }
        }
    }
    object
        .amount_total
        .map(Tier::from_amount)
        .ok_or_else(|| AppError::ValidationFailed("no tier information on session".into()))
}

// ---- Success-redirect finalizer ----

#[derive(Deserialize)]
pub struct SuccessQuery {
    #[serde(default)]
    pub session_id: String,
}

/// Parse a synthetic `cs_test_{user_id}[_{tier}]` session id.
fn parse_test_session(session_id: &str) -> Option<(i64, Tier)> {
    let rest = session_id.strip_prefix("cs_test_")?;
    match rest.split_once('_') {
        Some((uid, tier)) => Some((uid.parse().ok()?, tier.parse().ok()?)),
        None => Some((rest.parse().ok()?, Tier::Monthly)),
    }
}

pub async fn payment_success(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<SuccessQuery>,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    if query.session_id.is_empty() {
        return Ok(flash_redirect(
            jar,
            "Missing checkout session.",
            FlashKind::Error,
            "/owner",
        ));
    }

    let purchase = if state.config.test_mode() && query.session_id.starts_with("cs_test_") {
        let Some((_, tier)) = parse_test_session(&query.session_id) else {
            return Ok(flash_redirect(
                jar,
                "Invalid checkout session.",
                FlashKind::Error,
                "/owner",
            ));
        };
        Purchase {
            target: tier,
            amount: tier.price_cents(),
            currency: "usd".into(),
            stripe_customer_id: None,
            stripe_subscription_id: None,
        }
    } else {
        let stripe = state
            .stripe
            .as_ref()
            .ok_or_else(|| AppError::Internal("stripe client missing outside test mode".into()))?;
        match stripe.retrieve_checkout_session(&query.session_id).await {
            Ok(session) => {
                let Some(tier) = session.tier() else {
                    return Ok(flash_redirect(
                        jar,
                        "Invalid checkout session.",
                        FlashKind::Error,
                        "/owner",
                    ));
                };
                Purchase {
                    target: tier,
                    amount: session.amount_total.unwrap_or_else(|| tier.price_cents()),
                    currency: session.currency.unwrap_or_else(|| "usd".into()),
                    stripe_customer_id: session.customer,
                    stripe_subscription_id: session.subscription,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "session retrieval failed");
                return Ok(flash_redirect(
                    jar,
                    msg::CHECKOUT_FAILED,
                    FlashKind::Error,
                    "/pricing",
                ));
            }
        }
    };

    // The same key the webhook will derive for this session.
    let key = DedupKey::from_session(&query.session_id);
    let mut conn = state.conn()?;
    match apply_purchase(&mut conn, user.id, &purchase, &key, queries::now()) {
        // Duplicate means the webhook beat us here; that is success.
        Ok(PurchaseOutcome::Applied(_)) | Ok(PurchaseOutcome::Duplicate) => Ok(flash_redirect(
            jar,
            msg::PAYMENT_SUCCESSFUL,
            FlashKind::Success,
            "/owner",
        )),
        Err(AppError::NotAnUpgrade(_)) => Ok(flash_redirect(
            jar,
            "Your subscription is already up to date.",
            FlashKind::Info,
            "/owner",
        )),
        Err(e @ (AppError::Transient(_) | AppError::Database(_) | AppError::Pool(_))) => {
            tracing::error!(user_id = user.id, error = %e, "purchase finalization failed");
            Ok(flash_redirect(
                jar,
                msg::CHECKOUT_FAILED,
                FlashKind::Error,
                "/pricing",
            ))
        }
        Err(e) => Err(e),
    }
}

pub async fn payment_cancel(jar: CookieJar) -> Response {
    flash_redirect(jar, msg::PAYMENT_CANCELLED, FlashKind::Info, "/pricing")
}

// ---- Payment history ----

pub async fn payment_history(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let conn = state.conn()?;
    let payments = queries::list_payments_for_user(&conn, user.id)?;

    let mut rows = String::new();
    for p in &payments {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            p.created_at,
            crate::render::escape(&p.description),
            p.format_amount(),
            p.status.as_str(),
        ));
    }
    let body = format!(
        r#"<h1>Payment history</h1>
<table>
<tr><th>Date</th><th>Description</th><th>Amount</th><th>Status</th></tr>
{}</table>"#,
        rows
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(
        &state,
        jar,
        "Payment history",
        flash.as_ref(),
        &body,
    ))
}

// ---- Cancellation ----

pub async fn cancel_confirm(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let (flash, jar) = take_flash(jar);
    let body = format!(
        r#"<h1>Cancel subscription</h1>
<p>Your {} plan stays active until the end of the paid period; it just won't renew.</p>
<form method="post" action="/subscription/cancel">
<button type="submit">Cancel my subscription</button>
</form>
<p><a href="/owner">Keep my subscription</a></p>"#,
        user.subscription_tier.plan_name(),
    );
    Ok(response_page(
        &state,
        jar,
        "Cancel subscription",
        flash.as_ref(),
        &body,
    ))
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };

    let conn = state.conn()?;
    match mutator::cancel(&conn, user.id, queries::now()) {
        Ok(()) => {}
        Err(AppError::ValidationFailed(message)) => {
            // A repeat cancel is informational, not an error.
            let kind = if message == msg::ALREADY_CANCELED {
                FlashKind::Info
            } else {
                FlashKind::Error
            };
            return Ok(flash_redirect(jar, &message, kind, "/owner/payment-history"));
        }
        Err(e) => return Err(e),
    }

    // Tell the processor to stop renewing. The local flag is already set;
    // a processor failure is logged and the renewal webhook would still be
    // applied if it arrives.
    if !state.config.test_mode() && !user.stripe_subscription_id.is_empty() {
        if let Some(stripe) = state.stripe.as_ref() {
            if let Err(e) = stripe.cancel_at_period_end(&user.stripe_subscription_id).await {
                tracing::error!(user_id = user.id, error = %e, "processor cancellation failed");
            }
        }
    }

    let until = chrono::DateTime::from_timestamp(user.subscription_expires_at, 0)
        .map(|d| d.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|| user.subscription_expires_at.to_string());
    Ok(flash_redirect(
        jar,
        &format!(
            "Your subscription will not renew. You keep access until {}.",
            until
        ),
        FlashKind::Success,
        "/owner/payment-history",
    ))
}
