//! Password hashing, token generation, and the cookie session scheme.
//!
//! Sessions are two cookies: `is_logged_in=true` and `user_email={email}`.
//! The current user is resolved by looking the email up on every request;
//! a stale cookie for a deleted account simply resolves to no user.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use rand::RngCore;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::{AppError, Result};
use crate::models::User;

pub const LOGGED_IN_COOKIE: &str = "is_logged_in";
pub const USER_EMAIL_COOKIE: &str = "user_email";

const SESSION_DAYS: i64 = 7;
/// Confirmation links are valid for 24 hours.
pub const CONFIRM_TOKEN_TTL_SECS: i64 = 24 * 3600;
/// Password recovery links are valid for 1 hour.
pub const RECOVER_TOKEN_TTL_SECS: i64 = 3600;

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("bcrypt hash failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// 32 random bytes, hex-encoded. Used for confirm and recover tokens.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn session_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(SESSION_DAYS))
        .build()
}

/// Establish a session for `email`.
pub fn login(jar: CookieJar, email: &str) -> CookieJar {
    jar.add(session_cookie(LOGGED_IN_COOKIE, "true".to_string()))
        .add(session_cookie(USER_EMAIL_COOKIE, email.to_string()))
}

/// Remove the session cookies.
pub fn logout(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(LOGGED_IN_COOKIE).path("/").build())
        .remove(Cookie::build(USER_EMAIL_COOKIE).path("/").build())
}

/// Resolve the logged-in user from the session cookies, if any.
pub fn current_user(conn: &Connection, jar: &CookieJar) -> Result<Option<User>> {
    let logged_in = jar
        .get(LOGGED_IN_COOKIE)
        .map(|c| c.value() == "true")
        .unwrap_or(false);
    if !logged_in {
        return Ok(None);
    }
    let Some(email) = jar.get(USER_EMAIL_COOKIE).map(|c| c.value().to_string()) else {
        return Ok(None);
    };
    queries::get_user_by_email(conn, &email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-hash"));
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn session_cookies_roundtrip() {
        let jar = login(CookieJar::new(), "user@example.com");
        assert_eq!(jar.get(LOGGED_IN_COOKIE).unwrap().value(), "true");
        assert_eq!(jar.get(USER_EMAIL_COOKIE).unwrap().value(), "user@example.com");
    }
}
