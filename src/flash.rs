//! One-shot flash messages carried across redirects in a pair of
//! short-lived cookies (`flash_message` / `flash_type`).

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;

pub const FLASH_MESSAGE_COOKIE: &str = "flash_message";
pub const FLASH_TYPE_COOKIE: &str = "flash_type";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashKind {
    Success,
    Error,
    Warning,
    Info,
}

impl FlashKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Error => "error",
            FlashKind::Warning => "warning",
            FlashKind::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Flash {
    pub message: String,
    pub kind: FlashKind,
}

fn flash_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(5))
        .build()
}

/// Set a flash to be shown on the next page load.
pub fn set_flash(jar: CookieJar, message: &str, kind: FlashKind) -> CookieJar {
    jar.add(flash_cookie(FLASH_MESSAGE_COOKIE, message.to_string()))
        .add(flash_cookie(FLASH_TYPE_COOKIE, kind.as_str().to_string()))
}

/// Read and consume the pending flash, if any.
pub fn take_flash(jar: CookieJar) -> (Option<Flash>, CookieJar) {
    let message = jar
        .get(FLASH_MESSAGE_COOKIE)
        .map(|c| c.value().to_string());
    let kind = jar
        .get(FLASH_TYPE_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default();

    let Some(message) = message else {
        return (None, jar);
    };

    let kind = match kind.as_str() {
        "error" => FlashKind::Error,
        "warning" => FlashKind::Warning,
        "info" => FlashKind::Info,
        _ => FlashKind::Success,
    };
    let jar = jar
        .remove(Cookie::build(FLASH_MESSAGE_COOKIE).path("/").build())
        .remove(Cookie::build(FLASH_TYPE_COOKIE).path("/").build());
    (Some(Flash { message, kind }), jar)
}
