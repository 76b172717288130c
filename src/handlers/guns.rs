//! Owner dashboard and gun CRUD, gated by the quota enforcer.

use axum::{
    extract::{Path, State},
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::db::{queries, AppState};
use crate::error::{AppError, OptionExt, Result};
use crate::extractors::Form;
use crate::flash::{take_flash, FlashKind};
use crate::models::{CreateGun, GunWithRefs};
use crate::render::escape;
use crate::subscription::{check_gun_creation, limit_gun_listing};

use super::{flash_redirect, require_user, response_page};

fn gun_row(gun: &GunWithRefs) -> String {
    format!(
        r#"<tr><td><a href="/owner/guns/{id}">{name}</a></td><td>{wt}</td><td>{cal}</td><td>{mfr}</td></tr>
"#,
        id = gun.gun.id,
        name = escape(&gun.gun.name),
        wt = escape(&gun.weapon_type),
        cal = escape(&gun.caliber),
        mfr = escape(&gun.manufacturer),
    )
}

pub async fn owner_dashboard(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let conn = state.conn()?;
    let now = queries::now();
    let listing = limit_gun_listing(&conn, &user, now)?;

    let subscription = if user.has_active_subscription(now) {
        let renewal = if user.subscription_tier.is_lifetime() {
            String::from("never expires")
        } else if user.subscription_canceled {
            format!("ends {} (will not renew)", user.subscription_expires_at)
        } else {
            format!("renews {}", user.subscription_expires_at)
        };
        format!(
            "<p>Plan: {} ({})</p><p><a href=\"/subscription/cancel/confirm\">Cancel subscription</a></p>",
            user.subscription_tier.plan_name(),
            renewal
        )
    } else {
        String::from(
            "<p>Plan: Free (2 gun limit). <a href=\"/pricing\">Upgrade</a></p>",
        )
    };

    let body = format!(
        r#"<h1>My Armory</h1>
<p>{email}</p>
{subscription}
<p>{count} gun(s) in your collection. <a href="/owner/guns">View all</a> | <a href="/owner/guns/new">Add a gun</a></p>
<p><a href="/owner/payment-history">Payment history</a> | <a href="/owner/profile/delete">Delete account</a> | <a href="/logout">Log out</a></p>"#,
        email = escape(&user.email),
        subscription = subscription,
        count = listing.total_count,
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(&state, jar, "My Armory", flash.as_ref(), &body))
}

pub async fn list(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let conn = state.conn()?;
    let listing = limit_gun_listing(&conn, &user, queries::now())?;

    let mut rows = String::new();
    for gun in &listing.guns {
        rows.push_str(&gun_row(gun));
    }
    let more = if listing.has_more {
        format!(
            r#"<p>{} more hidden. <a href="/pricing">Re-subscribe</a> to see your whole collection.</p>"#,
            listing.total_count - listing.guns.len() as i64
        )
    } else {
        String::new()
    };
    let body = format!(
        r#"<h1>My guns</h1>
<table>
<tr><th>Name</th><th>Type</th><th>Caliber</th><th>Manufacturer</th></tr>
{rows}</table>
{more}
<p><a href="/owner/guns/new">Add a gun</a></p>"#,
        rows = rows,
        more = more,
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(&state, jar, "My guns", flash.as_ref(), &body))
}

fn gun_form(action: &str, gun: Option<&CreateGun>, catalogs: &CatalogOptions) -> String {
    let name = gun.map(|g| g.name.as_str()).unwrap_or("");
    let acquired = gun.and_then(|g| g.acquired.as_deref()).unwrap_or("");
    let description = gun.map(|g| g.description.as_str()).unwrap_or("");
    format!(
        r#"<form method="post" action="{action}">
<label>Name <input type="text" name="name" value="{name}"></label>
<label>Type <select name="weapon_type_id">{types}</select></label>
<label>Caliber <select name="caliber_id">{calibers}</select></label>
<label>Manufacturer <select name="manufacturer_id">{manufacturers}</select></label>
<label>Acquired <input type="date" name="acquired" value="{acquired}"></label>
<label>Description <textarea name="description">{description}</textarea></label>
<button type="submit">Save</button>
</form>"#,
        action = action,
        name = escape(name),
        types = catalogs.weapon_types,
        calibers = catalogs.calibers,
        manufacturers = catalogs.manufacturers,
        acquired = escape(acquired),
        description = escape(description),
    )
}

struct CatalogOptions {
    weapon_types: String,
    calibers: String,
    manufacturers: String,
}

fn catalog_options(conn: &rusqlite::Connection) -> Result<CatalogOptions> {
    let weapon_types = queries::list_weapon_types(conn)?
        .iter()
        .map(|t| format!(r#"<option value="{}">{}</option>"#, t.id, escape(&t.type_name)))
        .collect();
    let calibers = queries::list_calibers(conn)?
        .iter()
        .map(|c| format!(r#"<option value="{}">{}</option>"#, c.id, escape(&c.caliber)))
        .collect();
    let manufacturers = queries::list_manufacturers(conn)?
        .iter()
        .map(|m| format!(r#"<option value="{}">{}</option>"#, m.id, escape(&m.name)))
        .collect();
    Ok(CatalogOptions {
        weapon_types,
        calibers,
        manufacturers,
    })
}

pub async fn new_form(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    if let Err(resp) = require_user(&state, &jar) {
        return Ok(resp);
    }
    let conn = state.conn()?;
    let catalogs = catalog_options(&conn)?;
    let body = format!(
        "<h1>Add a gun</h1>\n{}",
        gun_form("/owner/guns", None, &catalogs)
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(&state, jar, "Add a gun", flash.as_ref(), &body))
}

pub async fn create(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CreateGun>,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    form.validate()?;

    let conn = state.conn()?;
    // Quota gate before any write.
    match check_gun_creation(&conn, &user, queries::now()) {
        Ok(()) => {}
        Err(AppError::QuotaExceeded(message)) => {
            return Ok(flash_redirect(jar, &message, FlashKind::Error, "/pricing"));
        }
        Err(e) => return Err(e),
    }

    let gun = queries::create_gun(&conn, user.id, &form)?;
    tracing::info!(user_id = user.id, gun_id = gun.id, "gun created");
    Ok(flash_redirect(
        jar,
        "Gun added to your armory.",
        FlashKind::Success,
        "/owner/guns",
    ))
}

pub async fn show(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let conn = state.conn()?;
    // Per-item reads are never hidden by the quota.
    let gun = queries::get_gun_for_owner(&conn, user.id, id)?.or_not_found("gun")?;

    let body = format!(
        r#"<h1>{name}</h1>
<p>Acquired: {acquired}</p>
<p>{description}</p>
<p><a href="/owner/guns/{id}/edit">Edit</a></p>
<form method="post" action="/owner/guns/{id}/delete"><button type="submit">Delete</button></form>
<p><a href="/owner/guns">Back to my guns</a></p>"#,
        name = escape(&gun.name),
        acquired = escape(gun.acquired.as_deref().unwrap_or("unknown")),
        description = escape(&gun.description),
        id = gun.id,
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(&state, jar, &gun.name, flash.as_ref(), &body))
}

pub async fn edit_form(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let conn = state.conn()?;
    let gun = queries::get_gun_for_owner(&conn, user.id, id)?.or_not_found("gun")?;
    let catalogs = catalog_options(&conn)?;
    let current = CreateGun {
        name: gun.name.clone(),
        weapon_type_id: gun.weapon_type_id,
        caliber_id: gun.caliber_id,
        manufacturer_id: gun.manufacturer_id,
        acquired: gun.acquired.clone(),
        description: gun.description.clone(),
    };
    let body = format!(
        "<h1>Edit {}</h1>\n{}",
        escape(&gun.name),
        gun_form(&format!("/owner/guns/{}", gun.id), Some(&current), &catalogs)
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(&state, jar, "Edit gun", flash.as_ref(), &body))
}

pub async fn update(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
    Form(form): Form<CreateGun>,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    form.validate()?;
    let conn = state.conn()?;
    queries::update_gun(&conn, user.id, id, &form)?;
    Ok(flash_redirect(
        jar,
        "Gun updated.",
        FlashKind::Success,
        "/owner/guns",
    ))
}

pub async fn delete(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    let user = match require_user(&state, &jar) {
        Ok(user) => user,
        Err(resp) => return Ok(resp),
    };
    let conn = state.conn()?;
    queries::delete_gun(&conn, user.id, id)?;
    tracing::info!(user_id = user.id, gun_id = id, "gun deleted");
    Ok(flash_redirect(
        jar,
        "Gun removed from your armory.",
        FlashKind::Success,
        "/owner/guns",
    ))
}
