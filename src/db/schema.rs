use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Users (identity + subscription state)
        -- Soft delete: deleted_at = timestamp when deleted, NULL = active
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0,
            confirmed INTEGER NOT NULL DEFAULT 0,
            confirm_token TEXT,
            confirm_token_expiry INTEGER,
            recover_token TEXT,
            recover_token_expiry INTEGER,
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_attempt INTEGER,
            subscription_tier TEXT NOT NULL DEFAULT 'free'
                CHECK (subscription_tier IN ('free', 'monthly', 'yearly', 'lifetime', 'premium_lifetime')),
            subscription_expires_at INTEGER NOT NULL DEFAULT 0,
            subscription_canceled INTEGER NOT NULL DEFAULT 0,
            stripe_customer_id TEXT NOT NULL DEFAULT '',
            stripe_subscription_id TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            deleted_at INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        CREATE INDEX IF NOT EXISTS idx_users_stripe_customer ON users(stripe_customer_id);
        CREATE INDEX IF NOT EXISTS idx_users_active ON users(id) WHERE deleted_at IS NULL;

        -- Payments (immutable after insert)
        -- The unique index on (user_id, stripe_id) is the deduplication key:
        -- the checkout-success redirect and the webhook both try to insert the
        -- same logical purchase, and only one insert can win.
        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            amount INTEGER NOT NULL,
            currency TEXT NOT NULL DEFAULT 'usd',
            status TEXT NOT NULL CHECK (status IN ('pending', 'succeeded', 'failed', 'refunded')),
            description TEXT NOT NULL DEFAULT '',
            stripe_id TEXT NOT NULL,
            tier TEXT NOT NULL DEFAULT '',
            period_start INTEGER NOT NULL DEFAULT 0,
            period_end INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_payments_dedup ON payments(user_id, stripe_id);
        CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id);

        -- Reference catalogs (small, admin-editable, seeded at startup)
        CREATE TABLE IF NOT EXISTS weapon_types (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            type TEXT NOT NULL UNIQUE,
            nickname TEXT NOT NULL DEFAULT '',
            popularity INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS calibers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            caliber TEXT NOT NULL UNIQUE,
            nickname TEXT NOT NULL DEFAULT '',
            popularity INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS manufacturers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            nickname TEXT NOT NULL DEFAULT '',
            country TEXT NOT NULL DEFAULT '',
            popularity INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Guns (owned by a user, reference the catalogs by id)
        CREATE TABLE IF NOT EXISTS guns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            owner_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            weapon_type_id INTEGER NOT NULL REFERENCES weapon_types(id),
            caliber_id INTEGER NOT NULL REFERENCES calibers(id),
            manufacturer_id INTEGER NOT NULL REFERENCES manufacturers(id),
            name TEXT NOT NULL,
            acquired TEXT,
            description TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_guns_owner ON guns(owner_id, created_at);
        "#,
    )
}
