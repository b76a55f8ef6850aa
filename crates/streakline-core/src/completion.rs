//! Logging a day's result for a habit, and awarding XP for it.
//!
//! "Upsert the log, then award" is one logical unit keyed by (habit, date).
//! XP is only granted on a genuine transition into `Complete`; re-logging an
//! already-complete day, or retrying after a failed write, never awards twice.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StorageError};
use crate::events::Event;
use crate::habit::{HabitLog, LogStatus};
use crate::leveling::{AwardOutcome, LevelingEngine};
use crate::storage::CompletionStore;
use crate::streak::{StreakCalculator, StreakState};

/// What the user did for a habit on a day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LogAction {
    /// Mark the whole goal done.
    Complete { at: NaiveDateTime },
    /// Record an amount toward the goal; reaching it completes the day.
    Progress { value: f64, at: NaiveDateTime },
    Skip,
    /// Undo back to an open day.
    Reopen,
}

/// Result of [`CompletionService::log`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub log: HabitLog,
    /// Set only when this call moved the day into `Complete`.
    pub award: Option<AwardOutcome>,
    pub streak: StreakState,
    pub events: Vec<Event>,
}

pub struct CompletionService<'a, S> {
    store: &'a S,
    leveling: LevelingEngine,
    streaks: StreakCalculator,
}

impl<'a, S: CompletionStore> CompletionService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self::with_leveling(store, LevelingEngine::new())
    }

    pub fn with_leveling(store: &'a S, leveling: LevelingEngine) -> Self {
        Self {
            store,
            leveling,
            streaks: StreakCalculator::new(),
        }
    }

    /// Record `action` for `habit_id` on `date`.
    ///
    /// # Errors
    /// Every read and write, including the streak recomputation, happens in
    /// one unit. When this fails, neither the log nor the award was persisted
    /// and the call can simply be retried.
    pub fn log(&self, habit_id: &str, date: NaiveDate, action: LogAction) -> Result<CompletionOutcome> {
        let (log, award, streak) = self.store.atomically(|store| {
            let habit = store
                .get_habit(habit_id)?
                .ok_or_else(|| StorageError::HabitNotFound(habit_id.to_string()))?;
            habit.check_goal()?;

            let was_complete = store
                .get_log(habit_id, date)?
                .is_some_and(|previous| previous.is_complete());

            let log = build_log(habit_id, date, action, habit.goal_per_day);

            let award = if log.is_complete() && !was_complete {
                let mut progress = store
                    .get_progress()?
                    .unwrap_or_else(|| self.leveling.reset());
                let award = self
                    .leveling
                    .award_completion(&mut progress, habit.linked_attribute);
                store.upsert_log(&log)?;
                store.save_progress(&progress)?;
                Some(award)
            } else {
                store.upsert_log(&log)?;
                None
            };

            let streak = self.streaks.streak_state(&store.get_logs(habit_id)?, date);
            Ok((log, award, streak))
        })?;

        let mut events = vec![Event::DayLogged {
            habit_id: habit_id.to_string(),
            date,
            status: log.status,
        }];
        if let Some(award) = &award {
            tracing::info!(habit = habit_id, %date, xp = award.current_xp, "completion awarded");
            events.push(Event::XpAwarded {
                habit_id: habit_id.to_string(),
                xp_gained: award.xp_gained,
                current_xp: award.current_xp,
            });
            if award.leveled_up {
                events.push(Event::LeveledUp {
                    new_level: award.new_level,
                });
            }
        }

        Ok(CompletionOutcome {
            log,
            award,
            streak,
            events,
        })
    }
}

fn build_log(habit_id: &str, date: NaiveDate, action: LogAction, goal: f64) -> HabitLog {
    match action {
        LogAction::Complete { at } => HabitLog {
            habit_id: habit_id.to_string(),
            date,
            status: LogStatus::Complete,
            completed_at: Some(at),
            value: None,
        },
        LogAction::Progress { value, at } if value >= goal => HabitLog {
            habit_id: habit_id.to_string(),
            date,
            status: LogStatus::Complete,
            completed_at: Some(at),
            value: Some(value),
        },
        LogAction::Progress { value, .. } => HabitLog::pending(habit_id, date).with_value(value.max(0.0)),
        LogAction::Skip => HabitLog::skipped(habit_id, date),
        LogAction::Reopen => HabitLog::pending(habit_id, date),
    }
}
