//! Row mapping trait and helpers for reducing boilerplate in queries.
//!
//! Models implement `FromRow` to define how they are constructed from
//! database rows; `query_one` / `query_all` wrap the common lookup shapes.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;
use crate::subscription::Tier;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on corrupt values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const USER_COLS: &str = "id, email, password_hash, is_admin, confirmed, confirm_token, \
     confirm_token_expiry, recover_token, recover_token_expiry, attempt_count, last_attempt, \
     subscription_tier, subscription_expires_at, subscription_canceled, stripe_customer_id, \
     stripe_subscription_id, created_at, updated_at, deleted_at";

pub const PAYMENT_COLS: &str = "id, user_id, amount, currency, status, description, stripe_id, \
     tier, period_start, period_end, created_at";

pub const GUN_COLS: &str = "id, owner_id, weapon_type_id, caliber_id, manufacturer_id, name, \
     acquired, description, created_at, updated_at";

pub const WEAPON_TYPE_COLS: &str = "id, type, nickname, popularity, created_at, updated_at";

pub const CALIBER_COLS: &str = "id, caliber, nickname, popularity, created_at, updated_at";

pub const MANUFACTURER_COLS: &str =
    "id, name, nickname, country, popularity, created_at, updated_at";

// ============ FromRow Implementations ============

impl FromRow for User {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(User {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            is_admin: row.get(3)?,
            confirmed: row.get(4)?,
            confirm_token: row.get(5)?,
            confirm_token_expiry: row.get(6)?,
            recover_token: row.get(7)?,
            recover_token_expiry: row.get(8)?,
            attempt_count: row.get(9)?,
            last_attempt: row.get(10)?,
            subscription_tier: parse_enum(row, 11, "subscription_tier")?,
            subscription_expires_at: row.get(12)?,
            subscription_canceled: row.get(13)?,
            stripe_customer_id: row.get(14)?,
            stripe_subscription_id: row.get(15)?,
            created_at: row.get(16)?,
            updated_at: row.get(17)?,
            deleted_at: row.get(18)?,
        })
    }
}

impl FromRow for Payment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        // tier may be empty for rows that never purchased one (failed invoices)
        let tier: Option<Tier> = row
            .get::<_, String>(7)?
            .parse::<Tier>()
            .ok();
        Ok(Payment {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            currency: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            description: row.get(5)?,
            stripe_id: row.get(6)?,
            tier,
            period_start: row.get(8)?,
            period_end: row.get(9)?,
            created_at: row.get(10)?,
        })
    }
}

impl FromRow for Gun {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Gun {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            weapon_type_id: row.get(2)?,
            caliber_id: row.get(3)?,
            manufacturer_id: row.get(4)?,
            name: row.get(5)?,
            acquired: row.get(6)?,
            description: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }
}

impl FromRow for GunWithRefs {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(GunWithRefs {
            gun: Gun::from_row(row)?,
            weapon_type: row.get(10)?,
            caliber: row.get(11)?,
            manufacturer: row.get(12)?,
        })
    }
}

impl FromRow for WeaponType {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WeaponType {
            id: row.get(0)?,
            type_name: row.get(1)?,
            nickname: row.get(2)?,
            popularity: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl FromRow for Caliber {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Caliber {
            id: row.get(0)?,
            caliber: row.get(1)?,
            nickname: row.get(2)?,
            popularity: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

impl FromRow for Manufacturer {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Manufacturer {
            id: row.get(0)?,
            name: row.get(1)?,
            nickname: row.get(2)?,
            country: row.get(3)?,
            popularity: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }
}
