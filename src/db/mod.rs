//! Database pool, schema, row mapping, and query layer.

pub mod from_row;
pub mod queries;
pub mod schema;
pub mod seed;

use std::sync::Arc;

use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::email::Mailer;
use crate::error::Result;
use crate::metrics::{ErrorMetrics, WebhookStats};
use crate::payments::StripeClient;
use crate::rate_limit::RateLimiter;
use crate::render::Renderer;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Open a pooled connection to the given path (":memory:" for tests) and
/// apply the schema.
pub fn create_pool(database_path: &str) -> Result<DbPool> {
    let manager = if database_path == ":memory:" {
        SqliteConnectionManager::memory()
    } else {
        SqliteConnectionManager::file(database_path)
    };
    let manager = manager.with_init(|conn| {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
    });
    let pool = r2d2::Pool::builder()
        // In-memory databases are per-connection; a single connection keeps
        // test fixtures coherent.
        .max_size(if database_path == ":memory:" { 1 } else { 8 })
        .build(manager)?;
    let conn = pool.get()?;
    schema::init_db(&conn)?;
    drop(conn);
    Ok(pool)
}

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<Config>,
    pub mailer: Arc<dyn Mailer>,
    pub renderer: Arc<Renderer>,
    pub stripe: Option<Arc<StripeClient>>,
    pub webhook_stats: Arc<WebhookStats>,
    pub error_metrics: Arc<ErrorMetrics>,
    pub login_limiter: Arc<RateLimiter>,
    pub recover_limiter: Arc<RateLimiter>,
    pub webhook_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn conn(&self) -> Result<DbConnection> {
        Ok(self.db.get()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_applies_schema_on_creation() {
        let pool = create_pool(":memory:").unwrap();
        let conn = pool.get().unwrap();
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 0);
    }
}
