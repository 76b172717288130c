//! Database queries as free functions over a borrowed connection.
//!
//! Handlers pull a connection from the pool and pass it down; multi-step
//! writes that must be atomic (the subscription mutator) open their own
//! transaction and call these with the transaction's connection.

use rusqlite::{params, Connection, ErrorCode};

use crate::db::from_row::*;
use crate::error::{AppError, Result};
use crate::models::*;
use crate::subscription::{DedupKey, TierChange};

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// ============ Users ============

pub fn create_user(
    conn: &Connection,
    email: &str,
    password_hash: &str,
    confirm_token: Option<&str>,
    confirm_token_expiry: Option<i64>,
) -> Result<User> {
    let ts = now();
    let result = conn.execute(
        "INSERT INTO users (email, password_hash, confirm_token, confirm_token_expiry, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![email, password_hash, confirm_token, confirm_token_expiry, ts],
    );
    match result {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            return Err(AppError::AlreadyExists(format!("user {}", email)));
        }
        Err(e) => return Err(e.into()),
    }
    let id = conn.last_insert_rowid();
    get_user(conn, id)?.ok_or_else(|| AppError::Internal("user vanished after insert".into()))
}

pub fn get_user(conn: &Connection, id: i64) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {USER_COLS} FROM users WHERE id = ?1 AND deleted_at IS NULL"),
        &[&id],
    )
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {USER_COLS} FROM users WHERE email = ?1 AND deleted_at IS NULL"),
        &[&email],
    )
}

/// Lookup by email including soft-deleted rows, for registration collision
/// handling and account reactivation.
pub fn get_user_by_email_any(conn: &Connection, email: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!("SELECT {USER_COLS} FROM users WHERE email = ?1"),
        &[&email],
    )
}

pub fn get_user_by_confirm_token(conn: &Connection, token: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!(
            "SELECT {USER_COLS} FROM users
             WHERE confirm_token = ?1 AND deleted_at IS NULL"
        ),
        &[&token],
    )
}

pub fn get_user_by_recover_token(conn: &Connection, token: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!(
            "SELECT {USER_COLS} FROM users
             WHERE recover_token = ?1 AND deleted_at IS NULL"
        ),
        &[&token],
    )
}

pub fn get_user_by_stripe_customer(conn: &Connection, customer_id: &str) -> Result<Option<User>> {
    query_one(
        conn,
        &format!(
            "SELECT {USER_COLS} FROM users
             WHERE stripe_customer_id = ?1 AND stripe_customer_id != '' AND deleted_at IS NULL"
        ),
        &[&customer_id],
    )
}

pub fn mark_confirmed(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET confirmed = 1, confirm_token = NULL, confirm_token_expiry = NULL,
         updated_at = ?2 WHERE id = ?1",
        params![user_id, now()],
    )?;
    Ok(())
}

pub fn set_confirm_token(
    conn: &Connection,
    user_id: i64,
    token: &str,
    expiry: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE users SET confirm_token = ?2, confirm_token_expiry = ?3, updated_at = ?4
         WHERE id = ?1",
        params![user_id, token, expiry, now()],
    )?;
    Ok(())
}

pub fn set_recover_token(
    conn: &Connection,
    user_id: i64,
    token: &str,
    expiry: i64,
) -> Result<()> {
    conn.execute(
        "UPDATE users SET recover_token = ?2, recover_token_expiry = ?3, updated_at = ?4
         WHERE id = ?1",
        params![user_id, token, expiry, now()],
    )?;
    Ok(())
}

pub fn update_password(conn: &Connection, user_id: i64, password_hash: &str) -> Result<()> {
    conn.execute(
        "UPDATE users SET password_hash = ?2, recover_token = NULL, recover_token_expiry = NULL,
         updated_at = ?3 WHERE id = ?1",
        params![user_id, password_hash, now()],
    )?;
    Ok(())
}

pub fn record_failed_login(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET attempt_count = attempt_count + 1, last_attempt = ?2, updated_at = ?2
         WHERE id = ?1",
        params![user_id, now()],
    )?;
    Ok(())
}

pub fn reset_login_attempts(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET attempt_count = 0, last_attempt = NULL, updated_at = ?2 WHERE id = ?1",
        params![user_id, now()],
    )?;
    Ok(())
}

pub fn soft_delete_user(conn: &Connection, user_id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
        params![user_id, now()],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("user {}", user_id)));
    }
    Ok(())
}

/// Clear the soft-delete marker. Subscription state and guns survive
/// deletion, so reactivation restores the account as it was.
pub fn reactivate_user(conn: &Connection, user_id: i64) -> Result<()> {
    let changed = conn.execute(
        "UPDATE users SET deleted_at = NULL, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NOT NULL",
        params![user_id, now()],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("deleted user {}", user_id)));
    }
    Ok(())
}

/// Apply an accepted tier change to the user row. Only ever called from the
/// subscription mutator, inside its transaction.
pub fn update_subscription(
    conn: &Connection,
    user_id: i64,
    change: &TierChange,
    stripe_customer_id: Option<&str>,
    stripe_subscription_id: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE users SET
             subscription_tier = ?2,
             subscription_expires_at = ?3,
             subscription_canceled = 0,
             stripe_customer_id = COALESCE(?4, stripe_customer_id),
             stripe_subscription_id = COALESCE(?5, stripe_subscription_id),
             updated_at = ?6
         WHERE id = ?1",
        params![
            user_id,
            change.new_tier.as_str(),
            change.new_expires_at,
            stripe_customer_id,
            stripe_subscription_id,
            now(),
        ],
    )?;
    Ok(())
}

/// Mark a recurring subscription as canceled. The tier and expiry are left
/// untouched; access continues until the period ends.
pub fn set_subscription_canceled(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET subscription_canceled = 1, updated_at = ?2 WHERE id = ?1",
        params![user_id, now()],
    )?;
    Ok(())
}

/// Drop a user to the free tier with immediate expiry. Applied when the
/// processor reports the subscription deleted.
pub fn downgrade_to_free(conn: &Connection, user_id: i64) -> Result<()> {
    conn.execute(
        "UPDATE users SET subscription_tier = 'free', subscription_expires_at = ?2,
             subscription_canceled = 0, stripe_subscription_id = '', updated_at = ?2
         WHERE id = ?1",
        params![user_id, now()],
    )?;
    Ok(())
}

pub fn count_users(conn: &Connection) -> Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE deleted_at IS NULL",
        [],
        |row| row.get(0),
    )?;
    Ok(n)
}

// ============ Payments ============

/// Outcome of a payment insert through the idempotency guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Inserted(i64),
    Duplicate,
}

/// Insert a payment row keyed by `(user_id, dedup_key)`.
///
/// The unique index turns the second insert for the same logical purchase
/// into `Duplicate` instead of an error, which is how the checkout-success
/// redirect and the webhook race without double-crediting.
pub fn try_record_payment(
    conn: &Connection,
    user_id: i64,
    key: &DedupKey,
    payment: &CreatePayment,
) -> Result<RecordOutcome> {
    let tier = payment.tier.map(|t| t.as_str()).unwrap_or("");
    let result = conn.execute(
        "INSERT INTO payments (user_id, amount, currency, status, description, stripe_id,
                               tier, period_start, period_end, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            user_id,
            payment.amount,
            payment.currency,
            payment.status.as_str(),
            payment.description,
            key.as_str(),
            tier,
            payment.period_start,
            payment.period_end,
            now(),
        ],
    );
    match result {
        Ok(_) => Ok(RecordOutcome::Inserted(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(RecordOutcome::Duplicate),
        Err(e) => Err(e.into()),
    }
}

pub fn list_payments_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Payment>> {
    query_all(
        conn,
        &format!(
            "SELECT {PAYMENT_COLS} FROM payments WHERE user_id = ?1 ORDER BY created_at DESC, id DESC"
        ),
        &[&user_id],
    )
}

/// Whether a succeeded payment already covers the instant `ts` for this
/// user. A purchase's initial invoice lands inside the period its checkout
/// session recorded; a renewal invoice starts where the last period ended,
/// so it is never covered.
pub fn has_succeeded_payment_covering(conn: &Connection, user_id: i64, ts: i64) -> Result<bool> {
    let covered: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM payments
             WHERE user_id = ?1 AND status = 'succeeded'
               AND period_start <= ?2 AND period_end > ?2)",
        params![user_id, ts],
        |row| row.get(0),
    )?;
    Ok(covered)
}

pub fn count_payments(conn: &Connection) -> Result<i64> {
    let n = conn.query_row("SELECT COUNT(*) FROM payments", [], |row| row.get(0))?;
    Ok(n)
}

pub fn sum_succeeded_payments(conn: &Connection) -> Result<i64> {
    let n = conn.query_row(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE status = 'succeeded'",
        [],
        |row| row.get(0),
    )?;
    Ok(n)
}

// ============ Guns ============

const GUN_JOIN_COLS: &str = "g.id, g.owner_id, g.weapon_type_id, g.caliber_id, g.manufacturer_id, \
     g.name, g.acquired, g.description, g.created_at, g.updated_at, \
     wt.type, c.caliber, m.name";

const GUN_JOINS: &str = "FROM guns g
     JOIN weapon_types wt ON wt.id = g.weapon_type_id
     JOIN calibers c ON c.id = g.caliber_id
     JOIN manufacturers m ON m.id = g.manufacturer_id";

pub fn create_gun(conn: &Connection, owner_id: i64, gun: &CreateGun) -> Result<Gun> {
    let ts = now();
    conn.execute(
        "INSERT INTO guns (owner_id, weapon_type_id, caliber_id, manufacturer_id, name,
                           acquired, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
        params![
            owner_id,
            gun.weapon_type_id,
            gun.caliber_id,
            gun.manufacturer_id,
            gun.name,
            gun.acquired,
            gun.description,
            ts,
        ],
    )?;
    let id = conn.last_insert_rowid();
    let created = query_one(
        conn,
        &format!("SELECT {GUN_COLS} FROM guns WHERE id = ?1"),
        &[&id],
    )?;
    created.ok_or_else(|| AppError::Internal("gun vanished after insert".into()))
}

/// Fetch a gun only if it belongs to `owner_id`. Cross-owner ids read as
/// missing rather than forbidden.
pub fn get_gun_for_owner(conn: &Connection, owner_id: i64, gun_id: i64) -> Result<Option<Gun>> {
    query_one(
        conn,
        &format!("SELECT {GUN_COLS} FROM guns WHERE id = ?1 AND owner_id = ?2"),
        &[&gun_id, &owner_id],
    )
}

pub fn update_gun(conn: &Connection, owner_id: i64, gun_id: i64, gun: &CreateGun) -> Result<()> {
    let changed = conn.execute(
        "UPDATE guns SET weapon_type_id = ?3, caliber_id = ?4, manufacturer_id = ?5,
             name = ?6, acquired = ?7, description = ?8, updated_at = ?9
         WHERE id = ?1 AND owner_id = ?2",
        params![
            gun_id,
            owner_id,
            gun.weapon_type_id,
            gun.caliber_id,
            gun.manufacturer_id,
            gun.name,
            gun.acquired,
            gun.description,
            now(),
        ],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("gun {}", gun_id)));
    }
    Ok(())
}

pub fn delete_gun(conn: &Connection, owner_id: i64, gun_id: i64) -> Result<()> {
    let changed = conn.execute(
        "DELETE FROM guns WHERE id = ?1 AND owner_id = ?2",
        params![gun_id, owner_id],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("gun {}", gun_id)));
    }
    Ok(())
}

pub fn count_guns_for_owner(conn: &Connection, owner_id: i64) -> Result<i64> {
    let n = conn.query_row(
        "SELECT COUNT(*) FROM guns WHERE owner_id = ?1",
        params![owner_id],
        |row| row.get(0),
    )?;
    Ok(n)
}

/// Guns for an owner, oldest first, joined with catalog display names.
pub fn list_guns_for_owner(conn: &Connection, owner_id: i64) -> Result<Vec<GunWithRefs>> {
    query_all(
        conn,
        &format!(
            "SELECT {GUN_JOIN_COLS} {GUN_JOINS}
             WHERE g.owner_id = ?1 ORDER BY g.created_at ASC, g.id ASC"
        ),
        &[&owner_id],
    )
}

pub fn count_guns(conn: &Connection) -> Result<i64> {
    let n = conn.query_row("SELECT COUNT(*) FROM guns", [], |row| row.get(0))?;
    Ok(n)
}

// ============ Catalogs ============

pub fn create_weapon_type(conn: &Connection, item: &CreateWeaponType) -> Result<i64> {
    let ts = now();
    let result = conn.execute(
        "INSERT INTO weapon_types (type, nickname, popularity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![item.type_name, item.nickname, item.popularity, ts],
    );
    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(AppError::AlreadyExists(format!(
            "weapon type {}",
            item.type_name
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn get_weapon_type(conn: &Connection, id: i64) -> Result<Option<WeaponType>> {
    query_one(
        conn,
        &format!("SELECT {WEAPON_TYPE_COLS} FROM weapon_types WHERE id = ?1"),
        &[&id],
    )
}

pub fn list_weapon_types(conn: &Connection) -> Result<Vec<WeaponType>> {
    query_all(
        conn,
        &format!(
            "SELECT {WEAPON_TYPE_COLS} FROM weapon_types ORDER BY popularity DESC, type ASC"
        ),
        &[],
    )
}

pub fn update_weapon_type(conn: &Connection, id: i64, item: &CreateWeaponType) -> Result<()> {
    let changed = conn.execute(
        "UPDATE weapon_types SET type = ?2, nickname = ?3, popularity = ?4, updated_at = ?5
         WHERE id = ?1",
        params![id, item.type_name, item.nickname, item.popularity, now()],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("weapon type {}", id)));
    }
    Ok(())
}

pub fn delete_weapon_type(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM weapon_types WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("weapon type {}", id)));
    }
    Ok(())
}

pub fn create_caliber(conn: &Connection, item: &CreateCaliber) -> Result<i64> {
    let ts = now();
    let result = conn.execute(
        "INSERT INTO calibers (caliber, nickname, popularity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![item.caliber, item.nickname, item.popularity, ts],
    );
    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => {
            Err(AppError::AlreadyExists(format!("caliber {}", item.caliber)))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn get_caliber(conn: &Connection, id: i64) -> Result<Option<Caliber>> {
    query_one(
        conn,
        &format!("SELECT {CALIBER_COLS} FROM calibers WHERE id = ?1"),
        &[&id],
    )
}

pub fn list_calibers(conn: &Connection) -> Result<Vec<Caliber>> {
    query_all(
        conn,
        &format!("SELECT {CALIBER_COLS} FROM calibers ORDER BY popularity DESC, caliber ASC"),
        &[],
    )
}

pub fn update_caliber(conn: &Connection, id: i64, item: &CreateCaliber) -> Result<()> {
    let changed = conn.execute(
        "UPDATE calibers SET caliber = ?2, nickname = ?3, popularity = ?4, updated_at = ?5
         WHERE id = ?1",
        params![id, item.caliber, item.nickname, item.popularity, now()],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("caliber {}", id)));
    }
    Ok(())
}

pub fn delete_caliber(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM calibers WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("caliber {}", id)));
    }
    Ok(())
}

pub fn create_manufacturer(conn: &Connection, item: &CreateManufacturer) -> Result<i64> {
    let ts = now();
    let result = conn.execute(
        "INSERT INTO manufacturers (name, nickname, country, popularity, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        params![item.name, item.nickname, item.country, item.popularity, ts],
    );
    match result {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_unique_violation(&e) => Err(AppError::AlreadyExists(format!(
            "manufacturer {}",
            item.name
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn get_manufacturer(conn: &Connection, id: i64) -> Result<Option<Manufacturer>> {
    query_one(
        conn,
        &format!("SELECT {MANUFACTURER_COLS} FROM manufacturers WHERE id = ?1"),
        &[&id],
    )
}

pub fn list_manufacturers(conn: &Connection) -> Result<Vec<Manufacturer>> {
    query_all(
        conn,
        &format!(
            "SELECT {MANUFACTURER_COLS} FROM manufacturers ORDER BY popularity DESC, name ASC"
        ),
        &[],
    )
}

pub fn update_manufacturer(conn: &Connection, id: i64, item: &CreateManufacturer) -> Result<()> {
    let changed = conn.execute(
        "UPDATE manufacturers SET name = ?2, nickname = ?3, country = ?4, popularity = ?5,
             updated_at = ?6 WHERE id = ?1",
        params![id, item.name, item.nickname, item.country, item.popularity, now()],
    )?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("manufacturer {}", id)));
    }
    Ok(())
}

pub fn delete_manufacturer(conn: &Connection, id: i64) -> Result<()> {
    let changed = conn.execute("DELETE FROM manufacturers WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(AppError::NotFound(format!("manufacturer {}", id)));
    }
    Ok(())
}
