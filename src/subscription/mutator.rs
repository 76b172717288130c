//! The subscription mutator: the single writer of subscription state.
//!
//! Both delivery paths (the checkout-success redirect and the webhook)
//! converge here. Everything runs inside one immediate transaction in the
//! mandatory order: lock the user row, consult the tier policy, insert the
//! payment through the idempotency guard, then update the user row. Two
//! concurrent deliveries of the same purchase extend expiry exactly once;
//! the loser of the insert race observes `Duplicate`.

use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries::{self, RecordOutcome};
use crate::error::{AppError, Result};
use crate::models::{CreatePayment, PaymentStatus};
use crate::subscription::dedup::DedupKey;
use crate::subscription::tier::{plan_renewal, plan_upgrade, Tier, TierChange};

/// A purchase to apply, as extracted from either delivery path.
#[derive(Debug, Clone)]
pub struct Purchase {
    pub target: Tier,
    /// Charged amount in minor units.
    pub amount: i64,
    pub currency: String,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// The payment was recorded and the user row updated.
    Applied(TierChange),
    /// This purchase was already recorded; the user row was left alone.
    /// Callers treat this as success.
    Duplicate,
}

pub fn apply_purchase(
    conn: &mut Connection,
    user_id: i64,
    purchase: &Purchase,
    key: &DedupKey,
    now: i64,
) -> Result<PurchaseOutcome> {
    // Immediate mode takes the write lock up front, which is the SQLite
    // equivalent of select-for-update on the user row.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let user = queries::get_user(&tx, user_id)?
        .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;

    // Same-tier recurring purchases are renewals; everything else must be
    // a strict upgrade.
    let change = if purchase.target == user.subscription_tier
        && matches!(purchase.target, Tier::Monthly | Tier::Yearly)
    {
        plan_renewal(user.subscription_tier, user.subscription_expires_at, now)?
    } else {
        plan_upgrade(
            user.subscription_tier,
            user.subscription_expires_at,
            purchase.target,
            now,
        )?
    };

    let payment = CreatePayment {
        amount: purchase.amount,
        currency: purchase.currency.clone(),
        status: PaymentStatus::Succeeded,
        description: format!("{} Subscription", purchase.target.title()),
        tier: Some(purchase.target),
        period_start: change.period_start,
        period_end: change.period_end,
    };

    match queries::try_record_payment(&tx, user_id, key, &payment)? {
        RecordOutcome::Duplicate => {
            tx.commit()?;
            tracing::info!(user_id, key = %key, "purchase already recorded, skipping");
            return Ok(PurchaseOutcome::Duplicate);
        }
        RecordOutcome::Inserted(_) => {}
    }

    queries::update_subscription(
        &tx,
        user_id,
        &change,
        purchase.stripe_customer_id.as_deref(),
        purchase.stripe_subscription_id.as_deref(),
    )?;
    tx.commit()?;

    tracing::info!(
        user_id,
        tier = %change.new_tier,
        expires_at = change.new_expires_at,
        "subscription updated"
    );
    Ok(PurchaseOutcome::Applied(change))
}

/// Mark a recurring subscription as non-renewing.
///
/// Tier and expiry are untouched; the user keeps access until the period
/// ends. Calling it without a recurring subscription, or twice, is an
/// error the handlers translate into a flash message.
pub fn cancel(conn: &Connection, user_id: i64, now: i64) -> Result<()> {
    let user = queries::get_user(conn, user_id)?
        .ok_or_else(|| AppError::NotFound(format!("user {}", user_id)))?;

    let recurring = matches!(user.subscription_tier, Tier::Monthly | Tier::Yearly)
        && user.has_active_subscription(now);
    if !recurring {
        return Err(AppError::ValidationFailed(
            crate::error::msg::NO_RECURRING_SUBSCRIPTION.into(),
        ));
    }
    if user.subscription_canceled {
        return Err(AppError::ValidationFailed(
            crate::error::msg::ALREADY_CANCELED.into(),
        ));
    }

    queries::set_subscription_canceled(conn, user_id)?;
    tracing::info!(user_id, "subscription marked canceled");
    Ok(())
}
