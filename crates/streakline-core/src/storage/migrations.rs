//! Database schema migrations for streakline.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const CURRENT_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn)?;

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
pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    match conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    }) {
        Ok(v) => Ok(v),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
        Err(e) => Err(e),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: habits, daily logs and the progression row.
///
/// `habit_logs` is keyed by (habit_id, date) so a day can only ever hold one
/// record per habit; deleting a habit cascades to its logs.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS habits (
            id               TEXT PRIMARY KEY,
            name             TEXT NOT NULL,
            frequency        TEXT NOT NULL DEFAULT 'daily',
            goal_per_day     REAL NOT NULL DEFAULT 1.0,
            linked_attribute TEXT,
            is_active        INTEGER NOT NULL DEFAULT 1,
            created_at       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS habit_logs (
            habit_id     TEXT NOT NULL REFERENCES habits(id) ON DELETE CASCADE,
            date         TEXT NOT NULL,
            status       TEXT NOT NULL,
            completed_at TEXT,
            value        REAL,
            PRIMARY KEY (habit_id, date)
        );

        CREATE TABLE IF NOT EXISTS user_progress (
            id               INTEGER PRIMARY KEY CHECK (id = 1),
            level            INTEGER NOT NULL,
            current_xp       INTEGER NOT NULL,
            xp_to_next_level INTEGER NOT NULL,
            strength         INTEGER NOT NULL DEFAULT 1,
            intelligence     INTEGER NOT NULL DEFAULT 1,
            wisdom           INTEGER NOT NULL DEFAULT 1,
            discipline       INTEGER NOT NULL DEFAULT 1,
            charisma         INTEGER NOT NULL DEFAULT 1
        );",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: dispatch idempotency records and a date index for the
/// trend/heat-map range scans.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS dispatch_records (
            kind       TEXT NOT NULL,
            scope      TEXT NOT NULL,
            date       TEXT NOT NULL,
            state      TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (kind, scope, date)
        );

        CREATE INDEX IF NOT EXISTS idx_habit_logs_date ON habit_logs(date);
        CREATE INDEX IF NOT EXISTS idx_dispatch_records_date ON dispatch_records(date);",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}
