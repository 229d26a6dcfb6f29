//! Database schema migrations for questlog.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: progress snapshot and the append-only reward logs.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_progress (
            user_id             TEXT PRIMARY KEY,
            total_xp            INTEGER NOT NULL DEFAULT 0 CHECK (total_xp >= 0),
            level               INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
            gold_balance        INTEGER NOT NULL DEFAULT 0 CHECK (gold_balance >= 0),
            current_streak      INTEGER NOT NULL DEFAULT 0,
            longest_streak      INTEGER NOT NULL DEFAULT 0,
            last_activity_date  TEXT,
            tasks_completed     INTEGER NOT NULL DEFAULT 0,
            version             INTEGER NOT NULL DEFAULT 0,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gold_transactions (
            seq               INTEGER PRIMARY KEY AUTOINCREMENT,
            id                TEXT NOT NULL UNIQUE,
            user_id           TEXT NOT NULL,
            amount            INTEGER NOT NULL CHECK (amount != 0),
            balance_after     INTEGER NOT NULL CHECK (balance_after >= 0),
            transaction_type  TEXT NOT NULL,
            description       TEXT NOT NULL DEFAULT '',
            event_id          TEXT NOT NULL,
            created_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS level_history (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id              TEXT NOT NULL,
            previous_level       INTEGER NOT NULL,
            new_level            INTEGER NOT NULL CHECK (new_level = previous_level + 1),
            total_xp_at_levelup  INTEGER NOT NULL,
            event_id             TEXT NOT NULL,
            created_at           TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_achievements (
            user_id         TEXT NOT NULL,
            achievement_id  TEXT NOT NULL,
            progress        INTEGER NOT NULL DEFAULT 0,
            is_unlocked     INTEGER NOT NULL DEFAULT 0,
            unlocked_at     TEXT,
            PRIMARY KEY (user_id, achievement_id)
        );

        CREATE TABLE IF NOT EXISTS active_powerups (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       TEXT NOT NULL,
            item_id       TEXT NOT NULL,
            effect_type   TEXT NOT NULL,
            effect_value  REAL NOT NULL,
            quantity      INTEGER NOT NULL DEFAULT 1 CHECK (quantity >= 1),
            activated_at  TEXT NOT NULL,
            expires_at    TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_gold_transactions_user ON gold_transactions(user_id, seq);
        CREATE INDEX IF NOT EXISTS idx_gold_transactions_event ON gold_transactions(event_id);
        CREATE INDEX IF NOT EXISTS idx_level_history_user ON level_history(user_id, id);
        CREATE INDEX IF NOT EXISTS idx_active_powerups_user ON active_powerups(user_id, expires_at);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: daily bonus tracking and the shop inventory.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "ALTER TABLE user_progress ADD COLUMN last_daily_bonus TEXT;

        CREATE TABLE IF NOT EXISTS inventory (
            user_id   TEXT NOT NULL,
            item_id   TEXT NOT NULL,
            quantity  INTEGER NOT NULL CHECK (quantity >= 0),
            PRIMARY KEY (user_id, item_id)
        );",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}
