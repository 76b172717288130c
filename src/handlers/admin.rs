//! Admin area: reference catalog CRUD and operational dashboards.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use serde::Serialize;

use crate::db::{queries, AppState};
use crate::error::{OptionExt, Result};
use crate::extractors::Form;
use crate::flash::{take_flash, FlashKind};
use crate::models::{CreateCaliber, CreateManufacturer, CreateWeaponType};
use crate::render::escape;

use super::{flash_redirect, require_admin, response_page};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/dashboard", get(dashboard))
        .route("/admin/error-metrics", get(error_metrics))
        .route("/admin/detailed-health", get(detailed_health))
        .route("/admin/webhook-health", get(webhook_health))
        .route(
            "/admin/weapon-types",
            get(weapon_types_list).post(weapon_types_create),
        )
        .route("/admin/weapon-types/new", get(weapon_types_new))
        .route(
            "/admin/weapon-types/{id}",
            get(weapon_types_show).post(weapon_types_update),
        )
        .route("/admin/weapon-types/{id}/edit", get(weapon_types_edit))
        .route("/admin/weapon-types/{id}/delete", post(weapon_types_delete))
        .route("/admin/calibers", get(calibers_list).post(calibers_create))
        .route("/admin/calibers/new", get(calibers_new))
        .route(
            "/admin/calibers/{id}",
            get(calibers_show).post(calibers_update),
        )
        .route("/admin/calibers/{id}/edit", get(calibers_edit))
        .route("/admin/calibers/{id}/delete", post(calibers_delete))
        .route(
            "/admin/manufacturers",
            get(manufacturers_list).post(manufacturers_create),
        )
        .route("/admin/manufacturers/new", get(manufacturers_new))
        .route(
            "/admin/manufacturers/{id}",
            get(manufacturers_show).post(manufacturers_update),
        )
        .route("/admin/manufacturers/{id}/edit", get(manufacturers_edit))
        .route("/admin/manufacturers/{id}/delete", post(manufacturers_delete))
}

macro_rules! admin_gate {
    ($state:expr, $jar:expr) => {
        match require_admin(&$state, &$jar) {
            Ok(user) => user,
            Err(resp) => return Ok(resp),
        }
    };
}

// ---- Dashboards ----

pub async fn dashboard(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let users = queries::count_users(&conn)?;
    let guns = queries::count_guns(&conn)?;
    let payments = queries::count_payments(&conn)?;
    let revenue = queries::sum_succeeded_payments(&conn)?;

    let body = format!(
        r#"<h1>Admin dashboard</h1>
<ul>
<li>Users: {users}</li>
<li>Guns: {guns}</li>
<li>Payments: {payments}</li>
<li>Revenue: ${revenue:.2}</li>
</ul>
<p>
<a href="/admin/weapon-types">Weapon types</a> |
<a href="/admin/calibers">Calibers</a> |
<a href="/admin/manufacturers">Manufacturers</a> |
<a href="/admin/error-metrics">Error metrics</a> |
<a href="/admin/detailed-health">Health</a>
</p>"#,
        users = users,
        guns = guns,
        payments = payments,
        revenue = revenue as f64 / 100.0,
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(&state, jar, "Admin", flash.as_ref(), &body))
}

pub async fn error_metrics(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    Ok(Json(state.error_metrics.snapshot()).into_response())
}

pub async fn webhook_health(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    Ok(Json(state.webhook_stats.snapshot()).into_response())
}

#[derive(Serialize)]
struct DetailedHealth {
    database: &'static str,
    webhook: crate::metrics::WebhookStatsSnapshot,
    errors_total: u64,
}

pub async fn detailed_health(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    let database = match state.conn().and_then(|conn| {
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .map_err(Into::into)
    }) {
        Ok(_) => "ok",
        Err(_) => "unreachable",
    };
    Ok(Json(DetailedHealth {
        database,
        webhook: state.webhook_stats.snapshot(),
        errors_total: state.error_metrics.snapshot().total,
    })
    .into_response())
}

// ---- Weapon types ----

fn weapon_type_form(action: &str, current: Option<&CreateWeaponType>) -> String {
    let type_name = current.map(|c| c.type_name.as_str()).unwrap_or("");
    let nickname = current.map(|c| c.nickname.as_str()).unwrap_or("");
    let popularity = current.map(|c| c.popularity).unwrap_or(0);
    format!(
        r#"<form method="post" action="{action}">
<label>Type <input type="text" name="type" value="{type_name}"></label>
<label>Nickname <input type="text" name="nickname" value="{nickname}"></label>
<label>Popularity <input type="number" name="popularity" value="{popularity}"></label>
<button type="submit">Save</button>
</form>"#,
        action = action,
        type_name = escape(type_name),
        nickname = escape(nickname),
        popularity = popularity,
    )
}

pub async fn weapon_types_list(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let mut rows = String::new();
    for item in queries::list_weapon_types(&conn)? {
        rows.push_str(&format!(
            r#"<tr><td><a href="/admin/weapon-types/{id}">{name}</a></td><td>{nick}</td><td>{pop}</td><td><a href="/admin/weapon-types/{id}/edit">Edit</a></td></tr>
"#,
            id = item.id,
            name = escape(&item.type_name),
            nick = escape(&item.nickname),
            pop = item.popularity,
        ));
    }
    let body = format!(
        r#"<h1>Weapon types</h1>
<table><tr><th>Type</th><th>Nickname</th><th>Popularity</th><th></th></tr>
{rows}</table>
<p><a href="/admin/weapon-types/new">New weapon type</a></p>"#,
        rows = rows
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(&state, jar, "Weapon types", flash.as_ref(), &body))
}

pub async fn weapon_types_new(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    let body = format!(
        "<h1>New weapon type</h1>\n{}",
        weapon_type_form("/admin/weapon-types", None)
    );
    Ok(response_page(&state, jar, "New weapon type", None, &body))
}

pub async fn weapon_types_create(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CreateWeaponType>,
) -> Result<Response> {
    admin_gate!(state, jar);
    form.validate()?;
    let conn = state.conn()?;
    queries::create_weapon_type(&conn, &form)?;
    Ok(flash_redirect(
        jar,
        "Weapon type created.",
        FlashKind::Success,
        "/admin/weapon-types",
    ))
}

pub async fn weapon_types_show(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let item = queries::get_weapon_type(&conn, id)?.or_not_found("weapon type")?;
    let body = format!(
        r#"<h1>{name}</h1>
<p>Nickname: {nick}</p><p>Popularity: {pop}</p>
<p><a href="/admin/weapon-types/{id}/edit">Edit</a></p>
<form method="post" action="/admin/weapon-types/{id}/delete"><button type="submit">Delete</button></form>"#,
        name = escape(&item.type_name),
        nick = escape(&item.nickname),
        pop = item.popularity,
        id = item.id,
    );
    Ok(response_page(&state, jar, &item.type_name, None, &body))
}

pub async fn weapon_types_edit(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let item = queries::get_weapon_type(&conn, id)?.or_not_found("weapon type")?;
    let current = CreateWeaponType {
        type_name: item.type_name.clone(),
        nickname: item.nickname.clone(),
        popularity: item.popularity,
    };
    let body = format!(
        "<h1>Edit weapon type</h1>\n{}",
        weapon_type_form(&format!("/admin/weapon-types/{}", item.id), Some(&current))
    );
    Ok(response_page(&state, jar, "Edit weapon type", None, &body))
}

pub async fn weapon_types_update(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
    Form(form): Form<CreateWeaponType>,
) -> Result<Response> {
    admin_gate!(state, jar);
    form.validate()?;
    let conn = state.conn()?;
    queries::update_weapon_type(&conn, id, &form)?;
    Ok(flash_redirect(
        jar,
        "Weapon type updated.",
        FlashKind::Success,
        "/admin/weapon-types",
    ))
}

pub async fn weapon_types_delete(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    queries::delete_weapon_type(&conn, id)?;
    Ok(flash_redirect(
        jar,
        "Weapon type deleted.",
        FlashKind::Success,
        "/admin/weapon-types",
    ))
}

// ---- Calibers ----

fn caliber_form(action: &str, current: Option<&CreateCaliber>) -> String {
    let caliber = current.map(|c| c.caliber.as_str()).unwrap_or("");
    let nickname = current.map(|c| c.nickname.as_str()).unwrap_or("");
    let popularity = current.map(|c| c.popularity).unwrap_or(0);
    format!(
        r#"<form method="post" action="{action}">
<label>Caliber <input type="text" name="caliber" value="{caliber}"></label>
<label>Nickname <input type="text" name="nickname" value="{nickname}"></label>
<label>Popularity <input type="number" name="popularity" value="{popularity}"></label>
<button type="submit">Save</button>
</form>"#,
        action = action,
        caliber = escape(caliber),
        nickname = escape(nickname),
        popularity = popularity,
    )
}

pub async fn calibers_list(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let mut rows = String::new();
    for item in queries::list_calibers(&conn)? {
        rows.push_str(&format!(
            r#"<tr><td><a href="/admin/calibers/{id}">{name}</a></td><td>{nick}</td><td>{pop}</td><td><a href="/admin/calibers/{id}/edit">Edit</a></td></tr>
"#,
            id = item.id,
            name = escape(&item.caliber),
            nick = escape(&item.nickname),
            pop = item.popularity,
        ));
    }
    let body = format!(
        r#"<h1>Calibers</h1>
<table><tr><th>Caliber</th><th>Nickname</th><th>Popularity</th><th></th></tr>
{rows}</table>
<p><a href="/admin/calibers/new">New caliber</a></p>"#,
        rows = rows
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(&state, jar, "Calibers", flash.as_ref(), &body))
}

pub async fn calibers_new(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    let body = format!(
        "<h1>New caliber</h1>\n{}",
        caliber_form("/admin/calibers", None)
    );
    Ok(response_page(&state, jar, "New caliber", None, &body))
}

pub async fn calibers_create(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CreateCaliber>,
) -> Result<Response> {
    admin_gate!(state, jar);
    form.validate()?;
    let conn = state.conn()?;
    queries::create_caliber(&conn, &form)?;
    Ok(flash_redirect(
        jar,
        "Caliber created.",
        FlashKind::Success,
        "/admin/calibers",
    ))
}

pub async fn calibers_show(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let item = queries::get_caliber(&conn, id)?.or_not_found("caliber")?;
    let body = format!(
        r#"<h1>{name}</h1>
<p>Nickname: {nick}</p><p>Popularity: {pop}</p>
<p><a href="/admin/calibers/{id}/edit">Edit</a></p>
<form method="post" action="/admin/calibers/{id}/delete"><button type="submit">Delete</button></form>"#,
        name = escape(&item.caliber),
        nick = escape(&item.nickname),
        pop = item.popularity,
        id = item.id,
    );
    Ok(response_page(&state, jar, &item.caliber, None, &body))
}

pub async fn calibers_edit(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let item = queries::get_caliber(&conn, id)?.or_not_found("caliber")?;
    let current = CreateCaliber {
        caliber: item.caliber.clone(),
        nickname: item.nickname.clone(),
        popularity: item.popularity,
    };
    let body = format!(
        "<h1>Edit caliber</h1>\n{}",
        caliber_form(&format!("/admin/calibers/{}", item.id), Some(&current))
    );
    Ok(response_page(&state, jar, "Edit caliber", None, &body))
}

pub async fn calibers_update(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
    Form(form): Form<CreateCaliber>,
) -> Result<Response> {
    admin_gate!(state, jar);
    form.validate()?;
    let conn = state.conn()?;
    queries::update_caliber(&conn, id, &form)?;
    Ok(flash_redirect(
        jar,
        "Caliber updated.",
        FlashKind::Success,
        "/admin/calibers",
    ))
}

pub async fn calibers_delete(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    queries::delete_caliber(&conn, id)?;
    Ok(flash_redirect(
        jar,
        "Caliber deleted.",
        FlashKind::Success,
        "/admin/calibers",
    ))
}

// ---- Manufacturers ----

fn manufacturer_form(action: &str, current: Option<&CreateManufacturer>) -> String {
    let name = current.map(|c| c.name.as_str()).unwrap_or("");
    let nickname = current.map(|c| c.nickname.as_str()).unwrap_or("");
    let country = current.map(|c| c.country.as_str()).unwrap_or("");
    let popularity = current.map(|c| c.popularity).unwrap_or(0);
    format!(
        r#"<form method="post" action="{action}">
<label>Name <input type="text" name="name" value="{name}"></label>
<label>Nickname <input type="text" name="nickname" value="{nickname}"></label>
<label>Country <input type="text" name="country" value="{country}"></label>
<label>Popularity <input type="number" name="popularity" value="{popularity}"></label>
<button type="submit">Save</button>
</form>"#,
        action = action,
        name = escape(name),
        nickname = escape(nickname),
        country = escape(country),
        popularity = popularity,
    )
}

pub async fn manufacturers_list(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let mut rows = String::new();
    for item in queries::list_manufacturers(&conn)? {
        rows.push_str(&format!(
            r#"<tr><td><a href="/admin/manufacturers/{id}">{name}</a></td><td>{nick}</td><td>{country}</td><td><a href="/admin/manufacturers/{id}/edit">Edit</a></td></tr>
"#,
            id = item.id,
            name = escape(&item.name),
            nick = escape(&item.nickname),
            country = escape(&item.country),
        ));
    }
    let body = format!(
        r#"<h1>Manufacturers</h1>
<table><tr><th>Name</th><th>Nickname</th><th>Country</th><th></th></tr>
{rows}</table>
<p><a href="/admin/manufacturers/new">New manufacturer</a></p>"#,
        rows = rows
    );
    let (flash, jar) = take_flash(jar);
    Ok(response_page(&state, jar, "Manufacturers", flash.as_ref(), &body))
}

pub async fn manufacturers_new(State(state): State<AppState>, jar: CookieJar) -> Result<Response> {
    admin_gate!(state, jar);
    let body = format!(
        "<h1>New manufacturer</h1>\n{}",
        manufacturer_form("/admin/manufacturers", None)
    );
    Ok(response_page(&state, jar, "New manufacturer", None, &body))
}

pub async fn manufacturers_create(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<CreateManufacturer>,
) -> Result<Response> {
    admin_gate!(state, jar);
    form.validate()?;
    let conn = state.conn()?;
    queries::create_manufacturer(&conn, &form)?;
    Ok(flash_redirect(
        jar,
        "Manufacturer created.",
        FlashKind::Success,
        "/admin/manufacturers",
    ))
}

pub async fn manufacturers_show(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let item = queries::get_manufacturer(&conn, id)?.or_not_found("manufacturer")?;
    let body = format!(
        r#"<h1>{name}</h1>
<p>Nickname: {nick}</p><p>Country: {country}</p>
<p><a href="/admin/manufacturers/{id}/edit">Edit</a></p>
<form method="post" action="/admin/manufacturers/{id}/delete"><button type="submit">Delete</button></form>"#,
        name = escape(&item.name),
        nick = escape(&item.nickname),
        country = escape(&item.country),
        id = item.id,
    );
    Ok(response_page(&state, jar, &item.name, None, &body))
}

pub async fn manufacturers_edit(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    let item = queries::get_manufacturer(&conn, id)?.or_not_found("manufacturer")?;
    let current = CreateManufacturer {
        name: item.name.clone(),
        nickname: item.nickname.clone(),
        country: item.country.clone(),
        popularity: item.popularity,
    };
    let body = format!(
        "<h1>Edit manufacturer</h1>\n{}",
        manufacturer_form(&format!("/admin/manufacturers/{}", item.id), Some(&current))
    );
    Ok(response_page(&state, jar, "Edit manufacturer", None, &body))
}

pub async fn manufacturers_update(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
    Form(form): Form<CreateManufacturer>,
) -> Result<Response> {
    admin_gate!(state, jar);
    form.validate()?;
    let conn = state.conn()?;
    queries::update_manufacturer(&conn, id, &form)?;
    Ok(flash_redirect(
        jar,
        "Manufacturer updated.",
        FlashKind::Success,
        "/admin/manufacturers",
    ))
}

pub async fn manufacturers_delete(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(id): Path<i64>,
) -> Result<Response> {
    admin_gate!(state, jar);
    let conn = state.conn()?;
    queries::delete_manufacturer(&conn, id)?;
    Ok(flash_redirect(
        jar,
        "Manufacturer deleted.",
        FlashKind::Success,
        "/admin/manufacturers",
    ))
}
