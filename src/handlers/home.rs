use axum::{extract::State, response::Response};
use axum_extra::extract::cookie::CookieJar;

use crate::db::AppState;
use crate::error::Result;
use crate::flash::take_flash;

use super::response_page;

pub async fn index(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    let (flash, jar) = take_flash(jar);
    let body = r#"<h1>The Virtual Armory</h1>
<p>Track your firearm collection.</p>
<p><a href="/register">Register</a> | <a href="/login">Log in</a> | <a href="/pricing">Pricing</a></p>"#;
    Ok(response_page(&state, jar, "Home", flash.as_ref(), body))
}
