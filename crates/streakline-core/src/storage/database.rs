//! SQLite-backed habit, progress and dispatch storage.
//!
//! Provides persistent storage for:
//! - Habits and their one-per-day logs
//! - The single user progression row
//! - Dispatch idempotency records

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{data_dir, migrations, CompletionStore, LogStore, ProgressStore};
use crate::dispatch::{DispatchKey, DispatchLedger, DispatchState};
use crate::error::{ComputationError, Result, StorageError};
use crate::habit::{Attribute, Frequency, Habit, HabitLog, LogStatus};
use crate::leveling::{Attributes, UserProgress};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Raw `habits` row before enum/date parsing.
struct HabitRow {
    id: String,
    name: String,
    frequency: String,
    goal_per_day: f64,
    linked_attribute: Option<String>,
    is_active: bool,
    created_at: String,
}

impl HabitRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            frequency: row.get(2)?,
            goal_per_day: row.get(3)?,
            linked_attribute: row.get(4)?,
            is_active: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_habit(self) -> Result<Habit, ComputationError> {
        let created_at = parse_timestamp(&self.id, "created_at", &self.created_at)?;
        Ok(Habit {
            frequency: Frequency::parse(&self.frequency)?,
            linked_attribute: self
                .linked_attribute
                .as_deref()
                .map(Attribute::parse)
                .transpose()?,
            id: self.id,
            name: self.name,
            goal_per_day: self.goal_per_day,
            is_active: self.is_active,
            created_at,
        })
    }
}

/// Raw `habit_logs` row.
struct LogRow {
    habit_id: String,
    date: String,
    status: String,
    completed_at: Option<String>,
    value: Option<f64>,
}

impl LogRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            habit_id: row.get(0)?,
            date: row.get(1)?,
            status: row.get(2)?,
            completed_at: row.get(3)?,
            value: row.get(4)?,
        })
    }

    fn into_log(self) -> Result<HabitLog, ComputationError> {
        let date = NaiveDate::parse_from_str(&self.date, DATE_FORMAT).map_err(|_| {
            ComputationError::MalformedDate {
                habit_id: self.habit_id.clone(),
                field: "date",
                value: self.date.clone(),
            }
        })?;
        let completed_at = self
            .completed_at
            .as_deref()
            .map(|raw| parse_timestamp(&self.habit_id, "completed_at", raw))
            .transpose()?;
        Ok(HabitLog {
            status: LogStatus::parse(&self.status)?,
            habit_id: self.habit_id,
            date,
            completed_at,
            value: self.value,
        })
    }
}

fn parse_timestamp(
    habit_id: &str,
    field: &'static str,
    raw: &str,
) -> Result<NaiveDateTime, ComputationError> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|_| ComputationError::MalformedDate {
        habit_id: habit_id.to_string(),
        field,
        value: raw.to_string(),
    })
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn format_timestamp(at: NaiveDateTime) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// SQLite database for habit storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/streakline/streakline.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(data_dir()?.join("streakline.db"))
    }

    /// Open (or create) the database at an explicit path.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StorageError::from)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(StorageError::from)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))
            .map_err(StorageError::from)?;
        migrations::migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Habits that are not soft-deactivated.
    pub fn active_habits(&self) -> Result<Vec<Habit>> {
        Ok(self
            .get_habits()?
            .into_iter()
            .filter(|h| h.is_active)
            .collect())
    }

    /// Soft-deactivate a habit, keeping its history.
    pub fn set_active(&self, habit_id: &str, active: bool) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE habits SET is_active = ?2 WHERE id = ?1",
                params![habit_id, active],
            )
            .map_err(StorageError::from)?;
        if changed == 0 {
            return Err(StorageError::HabitNotFound(habit_id.to_string()).into());
        }
        Ok(())
    }

    fn write_log(conn: &Connection, log: &HabitLog) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO habit_logs (habit_id, date, status, completed_at, value)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(habit_id, date) DO UPDATE SET
                status = excluded.status,
                completed_at = excluded.completed_at,
                value = excluded.value",
            params![
                log.habit_id,
                format_date(log.date),
                log.status.as_str(),
                log.completed_at.map(format_timestamp),
                log.value,
            ],
        )?;
        Ok(())
    }

    fn write_progress(conn: &Connection, progress: &UserProgress) -> rusqlite::Result<()> {
        let a = &progress.attributes;
        conn.execute(
            "INSERT OR REPLACE INTO user_progress
                (id, level, current_xp, xp_to_next_level,
                 strength, intelligence, wisdom, discipline, charisma)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                progress.level,
                progress.current_xp,
                progress.xp_to_next_level,
                a.strength,
                a.intelligence,
                a.wisdom,
                a.discipline,
                a.charisma,
            ],
        )?;
        Ok(())
    }
}

impl LogStore for Database {
    fn get_habits(&self) -> Result<Vec<Habit>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, name, frequency, goal_per_day, linked_attribute, is_active, created_at
                 FROM habits ORDER BY created_at, name",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map([], HabitRow::from_row)
            .map_err(StorageError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StorageError::from)?;
        rows.into_iter()
            .map(|row| row.into_habit().map_err(Into::into))
            .collect()
    }

    fn get_habit(&self, habit_id: &str) -> Result<Option<Habit>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, frequency, goal_per_day, linked_attribute, is_active, created_at
                 FROM habits WHERE id = ?1",
                params![habit_id],
                HabitRow::from_row,
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(HabitRow::into_habit).transpose()?)
    }

    fn save_habit(&self, habit: &Habit) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO habits (id, name, frequency, goal_per_day, linked_attribute, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    frequency = excluded.frequency,
                    goal_per_day = excluded.goal_per_day,
                    linked_attribute = excluded.linked_attribute,
                    is_active = excluded.is_active",
                params![
                    habit.id,
                    habit.name,
                    habit.frequency.as_str(),
                    habit.goal_per_day,
                    habit.linked_attribute.map(|a| a.as_str()),
                    habit.is_active,
                    format_timestamp(habit.created_at),
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn delete_habit(&self, habit_id: &str) -> Result<bool> {
        let tx = self.conn.unchecked_transaction().map_err(StorageError::from)?;
        tx.execute("DELETE FROM habit_logs WHERE habit_id = ?1", params![habit_id])
            .map_err(StorageError::from)?;
        let removed = tx
            .execute("DELETE FROM habits WHERE id = ?1", params![habit_id])
            .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(removed > 0)
    }

    fn get_logs(&self, habit_id: &str) -> Result<Vec<HabitLog>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT habit_id, date, status, completed_at, value
                 FROM habit_logs WHERE habit_id = ?1 ORDER BY date",
            )
            .map_err(StorageError::from)?;
        let rows = stmt
            .query_map(params![habit_id], LogRow::from_row)
            .map_err(StorageError::from)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(StorageError::from)?;
        rows.into_iter()
            .map(|row| row.into_log().map_err(Into::into))
            .collect()
    }

    fn get_log(&self, habit_id: &str, date: NaiveDate) -> Result<Option<HabitLog>> {
        let row = self
            .conn
            .query_row(
                "SELECT habit_id, date, status, completed_at, value
                 FROM habit_logs WHERE habit_id = ?1 AND date = ?2",
                params![habit_id, format_date(date)],
                LogRow::from_row,
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(LogRow::into_log).transpose()?)
    }

    fn upsert_log(&self, log: &HabitLog) -> Result<()> {
        Self::write_log(&self.conn, log).map_err(StorageError::from)?;
        Ok(())
    }
}

impl ProgressStore for Database {
    fn get_progress(&self) -> Result<Option<UserProgress>> {
        let progress = self
            .conn
            .query_row(
                "SELECT level, current_xp, xp_to_next_level,
                        strength, intelligence, wisdom, discipline, charisma
                 FROM user_progress WHERE id = 1",
                [],
                |row| {
                    Ok(UserProgress {
                        level: row.get(0)?,
                        current_xp: row.get(1)?,
                        xp_to_next_level: row.get(2)?,
                        attributes: Attributes {
                            strength: row.get(3)?,
                            intelligence: row.get(4)?,
                            wisdom: row.get(5)?,
                            discipline: row.get(6)?,
                            charisma: row.get(7)?,
                        },
                    })
                },
            )
            .optional()
            .map_err(StorageError::from)?;
        Ok(progress)
    }

    fn save_progress(&self, progress: &UserProgress) -> Result<()> {
        Self::write_progress(&self.conn, progress).map_err(StorageError::from)?;
        Ok(())
    }
}

impl CompletionStore for Database {
    fn atomically<T, F>(&self, unit: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
    {
        // IMMEDIATE takes the write lock up front so a concurrent writer
        // cannot read the same pre-state.
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(StorageError::from)?;
        match unit(self) {
            Ok(value) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(StorageError::from(e).into());
                }
                Ok(value)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}

/// Fixed-width UTC stamp so `updated_at` compares correctly as text.
fn ledger_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl DispatchLedger for Database {
    fn reserve(&self, key: &DispatchKey, stale_before: DateTime<Utc>) -> Result<bool> {
        // A conflicting row is only updated, and so only counted, when it is
        // a stale reservation.
        let claimed = self
            .conn
            .execute(
                "INSERT INTO dispatch_records (kind, scope, date, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(kind, scope, date) DO UPDATE SET
                    updated_at = excluded.updated_at
                 WHERE dispatch_records.state = ?4 AND dispatch_records.updated_at <= ?6",
                params![
                    key.kind.as_str(),
                    key.scope,
                    format_date(key.date),
                    DispatchState::Pending.as_str(),
                    ledger_timestamp(Utc::now()),
                    ledger_timestamp(stale_before),
                ],
            )
            .map_err(StorageError::from)?;
        Ok(claimed == 1)
    }

    fn commit(&self, key: &DispatchKey) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO dispatch_records (kind, scope, date, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(kind, scope, date) DO UPDATE SET
                    state = excluded.state,
                    updated_at = excluded.updated_at",
                params![
                    key.kind.as_str(),
                    key.scope,
                    format_date(key.date),
                    DispatchState::Sent.as_str(),
                    ledger_timestamp(Utc::now()),
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn release(&self, key: &DispatchKey) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM dispatch_records
                 WHERE kind = ?1 AND scope = ?2 AND date = ?3 AND state = ?4",
                params![
                    key.kind.as_str(),
                    key.scope,
                    format_date(key.date),
                    DispatchState::Pending.as_str(),
                ],
            )
            .map_err(StorageError::from)?;
        Ok(())
    }

    fn state(&self, key: &DispatchKey) -> Result<Option<DispatchState>> {
        let state: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM dispatch_records WHERE kind = ?1 AND scope = ?2 AND date = ?3",
                params![key.kind.as_str(), key.scope, format_date(key.date)],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::from)?;
        match state.as_deref() {
            None => Ok(None),
            Some("pending") => Ok(Some(DispatchState::Pending)),
            Some("sent") => Ok(Some(DispatchState::Sent)),
            Some(other) => Err(ComputationError::UnknownVariant {
                field: "dispatch state",
                value: other.to_string(),
            }
            .into()),
        }
    }

    fn prune_before(&self, date: NaiveDate) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM dispatch_records WHERE date < ?1",
                params![format_date(date)],
            )
            .map_err(StorageError::from)?;
        Ok(removed)
    }
}
