//! Pure subscription tier policy: which transitions are permitted, what the
//! new expiry is, and what each tier costs.

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Subscription tiers, ordered by strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Monthly,
    Yearly,
    Lifetime,
    PremiumLifetime,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Monthly => "monthly",
            Tier::Yearly => "yearly",
            Tier::Lifetime => "lifetime",
            Tier::PremiumLifetime => "premium_lifetime",
        }
    }

    pub fn is_lifetime(&self) -> bool {
        matches!(self, Tier::Lifetime | Tier::PremiumLifetime)
    }

    /// Canonical price in minor units (USD cents). Zero for free.
    pub fn price_cents(&self) -> i64 {
        match self {
            Tier::Free => 0,
            Tier::Monthly => 500,
            Tier::Yearly => 3000,
            Tier::Lifetime => 15000,
            Tier::PremiumLifetime => 30000,
        }
    }

    /// Marketing plan name shown on the pricing page.
    pub fn plan_name(&self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Monthly => "Liking It Plan",
            Tier::Yearly => "Loving It Plan",
            Tier::Lifetime => "Supporter Plan",
            Tier::PremiumLifetime => "Big Baller Plan",
        }
    }

    /// Title-cased tier used in payment descriptions ("Monthly Subscription").
    pub fn title(&self) -> &'static str {
        match self {
            Tier::Free => "Free",
            Tier::Monthly => "Monthly",
            Tier::Yearly => "Yearly",
            Tier::Lifetime => "Lifetime",
            Tier::PremiumLifetime => "Premium Lifetime",
        }
    }

    /// Map a charged amount back to the tier it purchased.
    ///
    /// Used for `invoice.paid` events, which carry no tier metadata; the
    /// thresholds accept any amount at or above the canonical price so that
    /// tax-inclusive charges still resolve.
    pub fn from_amount(amount_cents: i64) -> Tier {
        if amount_cents >= Tier::PremiumLifetime.price_cents() {
            Tier::PremiumLifetime
        } else if amount_cents >= Tier::Lifetime.price_cents() {
            Tier::Lifetime
        } else if amount_cents >= Tier::Yearly.price_cents() {
            Tier::Yearly
        } else {
            Tier::Monthly
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "free" => Ok(Tier::Free),
            "monthly" => Ok(Tier::Monthly),
            "yearly" => Ok(Tier::Yearly),
            "lifetime" => Ok(Tier::Lifetime),
            "premium_lifetime" => Ok(Tier::PremiumLifetime),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An accepted tier transition: the tier to write and the new expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierChange {
    pub new_tier: Tier,
    pub new_expires_at: i64,
    /// Billing period covered by the purchase; zero for lifetime tiers.
    pub period_start: i64,
    pub period_end: i64,
}

/// The active-subscription predicate.
///
/// A subscription is active when the tier is paid and either lifetime or
/// not yet past its expiry. A canceled subscription stays active until
/// `expires_at` - cancellation only stops renewal.
pub fn has_active_subscription(tier: Tier, expires_at: i64, now: i64) -> bool {
    if tier == Tier::Free {
        return false;
    }
    tier.is_lifetime() || now < expires_at
}

/// Sentinel expiry for lifetime tiers: 100 years from `now`.
pub fn lifetime_expiry(now: i64) -> i64 {
    add_months(now, 1200)
}

fn add_months(ts: i64, months: u32) -> i64 {
    let dt = DateTime::<Utc>::from_timestamp(ts, 0).unwrap_or_else(Utc::now);
    dt.checked_add_months(Months::new(months))
        .map(|d| d.timestamp())
        // Out-of-range dates can't occur for sane inputs; saturate rather
        // than wrap if they somehow do.
        .unwrap_or(ts)
}

/// Extend a recurring subscription by one billing period.
///
/// Renewal invoices arrive with the tier the user already holds; the
/// upgrade matrix rejects same-tier transitions, so renewals take this
/// path instead. The expiry formula matches the upgrade one.
pub fn plan_renewal(current_tier: Tier, current_expires_at: i64, now: i64) -> Result<TierChange> {
    let months = match current_tier {
        Tier::Monthly => 1,
        Tier::Yearly => 12,
        other => {
            return Err(AppError::NotAnUpgrade(format!(
                "{} does not renew",
                other
            )))
        }
    };
    let base = now.max(current_expires_at);
    Ok(TierChange {
        new_tier: current_tier,
        new_expires_at: add_months(base, months),
        period_start: base,
        period_end: add_months(base, months),
    })
}

/// Decide whether moving from the user's current subscription to `target`
/// is permitted, and compute the new expiry.
///
/// The transition matrix only allows strict upgrades: same-tier purchases
/// and downgrades are rejected with `NotAnUpgrade`. Expiry arithmetic uses
/// calendar months/years so month-end dates clamp forward, never backward.
pub fn plan_upgrade(
    current_tier: Tier,
    current_expires_at: i64,
    target: Tier,
    now: i64,
) -> Result<TierChange> {
    if target == Tier::Free || target <= current_tier {
        return Err(AppError::NotAnUpgrade(format!(
            "cannot move from {} to {}",
            current_tier, target
        )));
    }

    let change = match target {
        Tier::Monthly | Tier::Yearly => {
            // Remaining paid time carries over: extend from whichever is
            // later, the current expiry or now.
            let base = now.max(current_expires_at);
            let months = if target == Tier::Monthly { 1 } else { 12 };
            TierChange {
                new_tier: target,
                new_expires_at: add_months(base, months),
                period_start: base,
                period_end: add_months(base, months),
            }
        }
        Tier::Lifetime | Tier::PremiumLifetime => {
            // Upgrading lifetime -> premium_lifetime keeps the expiry the
            // prior lifetime purchase established.
            let expires = if current_tier == Tier::Lifetime {
                current_expires_at
            } else {
                lifetime_expiry(now)
            };
            TierChange {
                new_tier: target,
                new_expires_at: expires,
                period_start: 0,
                period_end: 0,
            }
        }
        Tier::Free => unreachable!("rejected above"),
    };

    Ok(change)
}
