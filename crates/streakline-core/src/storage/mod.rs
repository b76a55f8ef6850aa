mod config;
pub mod database;
pub mod migrations;

pub use config::{Config, WakeConfig};
pub use database::Database;

use std::path::PathBuf;

use chrono::NaiveDate;

use crate::error::{Result, StorageError};
use crate::habit::{Habit, HabitLog};
use crate::leveling::UserProgress;

/// Returns `~/.config/streakline[-dev]/` based on STREAKLINE_ENV.
///
/// Set STREAKLINE_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STREAKLINE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("streakline-dev")
    } else {
        base_dir.join("streakline")
    };

    std::fs::create_dir_all(&dir).map_err(|e| StorageError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Habits and their daily logs.
///
/// Implementations enforce at most one log per (habit, date); writing a
/// second log for the same day replaces the first.
pub trait LogStore {
    fn get_habits(&self) -> Result<Vec<Habit>>;

    fn get_habit(&self, habit_id: &str) -> Result<Option<Habit>>;

    fn save_habit(&self, habit: &Habit) -> Result<()>;

    /// Hard-delete a habit and every log it owns. Returns `false` if it did
    /// not exist.
    fn delete_habit(&self, habit_id: &str) -> Result<bool>;

    fn get_logs(&self, habit_id: &str) -> Result<Vec<HabitLog>>;

    fn get_log(&self, habit_id: &str, date: NaiveDate) -> Result<Option<HabitLog>>;

    fn upsert_log(&self, log: &HabitLog) -> Result<()>;
}

/// The single user progression row.
pub trait ProgressStore {
    fn get_progress(&self) -> Result<Option<UserProgress>>;

    fn save_progress(&self, progress: &UserProgress) -> Result<()>;
}

/// Store able to run a read-modify-write as one unit.
pub trait CompletionStore: LogStore + ProgressStore {
    /// Run `unit` as a single atomic write. Every store call it makes lands
    /// together or not at all, and no other writer interleaves with it, so
    /// state read inside `unit` is still current when it writes.
    fn atomically<T, F>(&self, unit: F) -> Result<T>
    where
        F: FnOnce(&Self) -> Result<T>,
        Self: Sized;
}
