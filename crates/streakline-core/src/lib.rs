//! # Streakline Core Library
//!
//! This library provides the core logic of Streakline, a habit streak and
//! engagement engine. Like its CLI, it is driven from outside: nothing here
//! runs on its own timer, and every computation is a function of the stored
//! logs and the instant it is asked about.
//!
//! ## Architecture
//!
//! - **Streaks and stats**: Pure calculators over a habit's log history
//!   (current/longest streak, consistency score, daily trend, heat map)
//! - **Leveling**: XP and attribute progression driven by completions
//! - **Scheduler**: Learns a reminder hour per habit, classifies how close an
//!   open streak is to lapsing, and proposes nudges
//! - **Dispatch**: Guarantees each nudge kind goes out at most once per habit
//!   per day, even across overlapping wake-ups
//! - **Storage**: SQLite-backed habits, logs, progress and dispatch records,
//!   plus TOML configuration
//!
//! ## Key Components
//!
//! - [`Engine`]: Runs a wake-up cycle against a store
//! - [`CompletionService`]: Logs a day and awards XP exactly once
//! - [`Database`]: Persistence
//! - [`Config`]: Application configuration management
//! - [`Delivery`]: Trait for whatever actually shows a notification

pub mod completion;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod events;
pub mod habit;
pub mod leveling;
pub mod scheduler;
pub mod stats;
pub mod storage;
pub mod streak;

pub use completion::{CompletionOutcome, CompletionService, LogAction};
pub use dispatch::{Delivery, DispatchCoordinator, DispatchLedger, DispatchOutcome, MemoryLedger};
pub use engine::{CycleReport, Engine, HabitFailure};
pub use error::{
    ComputationError, ConfigError, CoreError, DeliveryError, Result, StorageError,
    ValidationError,
};
pub use events::Event;
pub use habit::{Attribute, Frequency, Habit, HabitLog, LogStatus};
pub use leveling::{AwardOutcome, LevelingEngine, UserProgress};
pub use scheduler::{AdaptiveScheduler, DangerLevel, Milestone, Nudge, NudgeKind, Scope};
pub use stats::{ConsistencyAnalyzer, ConsistencyLevel, ConsistencyScore, HeatMap, TrendPoint};
pub use storage::{CompletionStore, Config, Database, LogStore, ProgressStore};
pub use streak::{StreakCalculator, StreakState};
