//! Tier-dependent quota enforcement for the gun collection.
//!
//! Free-tier users (including paid users whose subscription has lapsed)
//! may hold at most two guns and see only their first two, oldest first.
//! Nothing is deleted on expiry; the rest of the collection reappears as
//! soon as a subscription is active again.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::{GunWithRefs, User};

pub const FREE_TIER_GUN_LIMIT: i64 = 2;

/// Write-side gate: may `user` create another gun right now?
pub fn check_gun_creation(conn: &Connection, user: &User, now: i64) -> Result<()> {
    if user.has_active_subscription(now) {
        return Ok(());
    }
    let count = queries::count_guns_for_owner(conn, user.id)?;
    if count >= FREE_TIER_GUN_LIMIT {
        return Err(AppError::QuotaExceeded(
            crate::error::msg::GUN_LIMIT_REACHED.into(),
        ));
    }
    Ok(())
}

/// A possibly-truncated view of a user's gun collection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GunListing {
    pub guns: Vec<GunWithRefs>,
    /// Total rows the user owns, including any hidden by the quota.
    pub total_count: i64,
    /// True when the free-tier view is hiding rows.
    pub has_more: bool,
}

/// Read-side gate: the user's guns, truncated to the free-tier window
/// when no subscription is active.
pub fn limit_gun_listing(conn: &Connection, user: &User, now: i64) -> Result<GunListing> {
    let guns = queries::list_guns_for_owner(conn, user.id)?;
    let total_count = guns.len() as i64;

    if user.has_active_subscription(now) || total_count <= FREE_TIER_GUN_LIMIT {
        return Ok(GunListing {
            guns,
            total_count,
            has_more: false,
        });
    }

    let visible: Vec<GunWithRefs> = guns.into_iter().take(FREE_TIER_GUN_LIMIT as usize).collect();
    Ok(GunListing {
        guns: visible,
        total_count,
        has_more: true,
    })
}
