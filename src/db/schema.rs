// Database schema - table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version` table
// tracks which migrations have run, and each migration is a function that
// executes SQL statements.
//
// Timestamps are stored as RFC 3339 text with microsecond precision and a
// trailing `Z`, so lexicographic comparison matches chronological order.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent - safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Submitted indicators. The digest is the identity.
        CREATE TABLE IF NOT EXISTS indicators (
            hashed TEXT PRIMARY KEY,
            kind TEXT NOT NULL CHECK (kind IN ('email', 'domain')),
            original TEXT NOT NULL DEFAULT '',
            tags TEXT NOT NULL DEFAULT '[]',   -- JSON array, sorted and de-duplicated
            owner TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL CHECK (status IN ('pending', 'enabled', 'disabled')),
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Registered accounts
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,        -- always lower-cased before insert
            api_key TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL CHECK (role IN ('user', 'submitter', 'admin')),
            activated INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        -- Requests to re-examine an indicator
        CREATE TABLE IF NOT EXISTS reviews (
            id TEXT PRIMARY KEY,
            indicator TEXT NOT NULL,
            requested_by TEXT,
            created_at TEXT NOT NULL
        );

        -- Feed windows filter on updated_at
        CREATE INDEX IF NOT EXISTS idx_indicators_updated
            ON indicators(updated_at);

        CREATE INDEX IF NOT EXISTS idx_indicators_status_kind
            ON indicators(status, kind);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: index reviews by indicator for `list_reviews_for`.
    run_migration(conn, 2, |c| {
        c.execute_batch("CREATE INDEX IF NOT EXISTS idx_reviews_indicator ON reviews(indicator);")
    })?;

    // Migration v3: client alerts
    run_migration(conn, 3, |c| {
        c.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                matched TEXT NOT NULL,
                indicator TEXT NOT NULL,
                user_id TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_alerts_created ON alerts(created_at);
            ",
        )
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
