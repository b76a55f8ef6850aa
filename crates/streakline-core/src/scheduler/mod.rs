//! Adaptive nudge scheduler.
//!
//! This module decides when and what to nudge the user about:
//! - Learns a preferred reminder hour from past completion timestamps
//! - Classifies how close an open streak is to lapsing at day's end
//! - Detects streak milestones worth celebrating
//! - Turns a per-habit snapshot into zero or more [`Nudge`] proposals
//!
//! Everything here is a pure function of its inputs; deduplication of what
//! actually gets sent lives in [`crate::dispatch`].

mod copy;
mod nudge;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ComputationError;
use crate::habit::{Habit, HabitLog};
use crate::stats::{ConsistencyAnalyzer, ConsistencyScore};
use crate::streak::{StreakCalculator, StreakState};

pub use nudge::{Nudge, NudgeKind, NudgeReason, Scope};

/// Urgency of an open streak, by time left in the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DangerLevel {
    Safe,
    Moderate,
    High,
    Critical,
}

/// Streak lengths worth celebrating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Milestone {
    StartingStrong,
    WeekWarrior,
    TwoWeeks,
    MonthMaster,
    Centurion,
    /// Any other positive multiple of 50 days
    BigMilestone { days: u32 },
}

impl Milestone {
    pub fn days(&self) -> u32 {
        match self {
            Milestone::StartingStrong => 3,
            Milestone::WeekWarrior => 7,
            Milestone::TwoWeeks => 14,
            Milestone::MonthMaster => 30,
            Milestone::Centurion => 100,
            Milestone::BigMilestone { days } => *days,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Milestone::StartingStrong => "Starting Strong",
            Milestone::WeekWarrior => "Week Warrior",
            Milestone::TwoWeeks => "Two Weeks Strong",
            Milestone::MonthMaster => "Month Master",
            Milestone::Centurion => "Centurion",
            Milestone::BigMilestone { .. } => "Big Milestone",
        }
    }

    pub fn cheer(&self) -> &'static str {
        match self {
            Milestone::StartingStrong => "The hardest part is behind you.",
            Milestone::WeekWarrior => "A full week without a miss.",
            Milestone::TwoWeeks => "This is becoming who you are.",
            Milestone::MonthMaster => "A whole month of showing up.",
            Milestone::Centurion => "Triple digits. Legendary.",
            Milestone::BigMilestone { .. } => "Another big marker passed.",
        }
    }
}

/// Scheduler tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Reminder hour when no completion history exists
    #[serde(default = "default_hour")]
    pub default_hour: u8,
    /// How many hours before the typical completion time to nudge
    #[serde(default = "default_lead_hours")]
    pub lead_hours: u8,
    /// Never suggest a reminder earlier than this hour
    #[serde(default = "default_earliest_hour")]
    pub earliest_hour: u8,
    #[serde(default = "default_moderate_hour")]
    pub moderate_from_hour: u8,
    #[serde(default = "default_high_hour")]
    pub high_from_hour: u8,
    #[serde(default = "default_critical_hour")]
    pub critical_from_hour: u8,
    /// Lowest danger level that produces a streak-danger nudge
    #[serde(default = "default_danger_nudge_level")]
    pub danger_nudge_min_level: DangerLevel,
    #[serde(default = "default_true")]
    pub reminders_enabled: bool,
    #[serde(default = "default_true")]
    pub milestones_enabled: bool,
}

fn default_hour() -> u8 {
    9
}
fn default_lead_hours() -> u8 {
    2
}
fn default_earliest_hour() -> u8 {
    7
}
fn default_moderate_hour() -> u8 {
    17
}
fn default_high_hour() -> u8 {
    20
}
fn default_critical_hour() -> u8 {
    23
}
fn default_danger_nudge_level() -> DangerLevel {
    DangerLevel::High
}
fn default_true() -> bool {
    true
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_hour: default_hour(),
            lead_hours: default_lead_hours(),
            earliest_hour: default_earliest_hour(),
            moderate_from_hour: default_moderate_hour(),
            high_from_hour: default_high_hour(),
            critical_from_hour: default_critical_hour(),
            danger_nudge_min_level: default_danger_nudge_level(),
            reminders_enabled: true,
            milestones_enabled: true,
        }
    }
}

/// Everything the scheduler needs to know about one habit at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HabitSnapshot {
    pub habit: Habit,
    pub today: NaiveDate,
    pub streak: StreakState,
    pub consistency: ConsistencyScore,
    pub optimal_hour: u8,
    pub today_goal_met: bool,
    pub danger: DangerLevel,
}

/// Stateless adaptive scheduler.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveScheduler {
    config: SchedulerConfig,
    streaks: StreakCalculator,
    consistency: ConsistencyAnalyzer,
}

impl AdaptiveScheduler {
    /// Create a new scheduler with default config
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with custom config
    pub fn with_config(config: SchedulerConfig, consistency: ConsistencyAnalyzer) -> Self {
        Self {
            config,
            streaks: StreakCalculator::new(),
            consistency,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Preferred reminder hour for `habit`.
    ///
    /// Averages the hour of every goal-met completion, then nudges
    /// `lead_hours` earlier, never before `earliest_hour`.
    pub fn optimal_hour(&self, habit: &Habit, logs: &[HabitLog]) -> u8 {
        let hours: Vec<u32> = logs
            .iter()
            .filter(|log| log.goal_met(habit.goal_per_day))
            .filter_map(|log| log.completed_at)
            .map(|at| at.hour())
            .collect();

        if hours.is_empty() {
            return self.config.default_hour;
        }

        let average = hours.iter().sum::<u32>() / hours.len() as u32;
        let shifted = average.saturating_sub(u32::from(self.config.lead_hours));
        shifted.max(u32::from(self.config.earliest_hour)).min(23) as u8
    }

    /// Milestone reached by a streak of `current_length` days, if any.
    ///
    /// Exact lengths win over the every-50-days rule.
    pub fn check_milestone(&self, current_length: u32) -> Option<Milestone> {
        match current_length {
            3 => Some(Milestone::StartingStrong),
            7 => Some(Milestone::WeekWarrior),
            14 => Some(Milestone::TwoWeeks),
            30 => Some(Milestone::MonthMaster),
            100 => Some(Milestone::Centurion),
            n if n > 0 && n % 50 == 0 => Some(Milestone::BigMilestone { days: n }),
            _ => None,
        }
    }

    /// How urgent an uncompleted day is at `now`.
    pub fn danger_level(&self, today_goal_met: bool, now: NaiveDateTime) -> DangerLevel {
        if today_goal_met {
            return DangerLevel::Safe;
        }
        let hour = now.hour() as u8;
        if hour >= self.config.critical_from_hour {
            DangerLevel::Critical
        } else if hour >= self.config.high_from_hour {
            DangerLevel::High
        } else if hour >= self.config.moderate_from_hour {
            DangerLevel::Moderate
        } else {
            DangerLevel::Safe
        }
    }

    /// Derive the scheduling snapshot for one habit.
    ///
    /// # Errors
    /// Fails closed with a [`ComputationError`] when the habit's goal cannot
    /// produce completion fractions, or a log belongs to another habit.
    pub fn snapshot(
        &self,
        habit: &Habit,
        logs: &[HabitLog],
        now: NaiveDateTime,
    ) -> Result<HabitSnapshot, ComputationError> {
        habit.check_goal()?;
        if let Some(stray) = logs.iter().find(|log| log.habit_id != habit.id) {
            return Err(ComputationError::ForeignLog {
                habit_id: habit.id.clone(),
                log_habit_id: stray.habit_id.clone(),
            });
        }

        let today = now.date();
        let today_goal_met = logs
            .iter()
            .any(|log| log.date == today && log.goal_met(habit.goal_per_day));

        let snapshot = HabitSnapshot {
            habit: habit.clone(),
            today,
            streak: self.streaks.streak_state(logs, today),
            consistency: self.consistency.consistency_score(habit, logs),
            optimal_hour: self.optimal_hour(habit, logs),
            today_goal_met,
            danger: self.danger_level(today_goal_met, now),
        };
        tracing::debug!(
            habit = %habit.id,
            streak = snapshot.streak.current_length,
            optimal_hour = snapshot.optimal_hour,
            danger = ?snapshot.danger,
            "computed habit snapshot"
        );
        Ok(snapshot)
    }

    /// Propose nudges for one habit at `now`.
    pub fn plan(&self, snapshot: &HabitSnapshot, now: NaiveDateTime) -> Vec<Nudge> {
        let mut nudges = Vec::new();
        if !snapshot.habit.is_active {
            return nudges;
        }

        let habit = &snapshot.habit;
        let scope = Scope::Habit(habit.id.clone());
        let streak = snapshot.streak.current_length;

        if snapshot.today_goal_met {
            if self.config.milestones_enabled {
                if let Some(milestone) = self.check_milestone(streak) {
                    let (title, body) = copy::milestone(&habit.name, milestone);
                    nudges.push(Nudge {
                        kind: NudgeKind::Milestone,
                        scope,
                        date: snapshot.today,
                        title,
                        body,
                        reason: NudgeReason::Milestone { milestone },
                    });
                }
            }
            return nudges;
        }

        if self.config.reminders_enabled && now.hour() as u8 >= snapshot.optimal_hour {
            let (title, body) = copy::reminder(&habit.name, streak);
            nudges.push(Nudge {
                kind: NudgeKind::DailyReminder,
                scope: scope.clone(),
                date: snapshot.today,
                title,
                body,
                reason: NudgeReason::OptimalHour {
                    hour: snapshot.optimal_hour,
                },
            });
        }

        if streak > 0
            && snapshot.danger != DangerLevel::Safe
            && snapshot.danger >= self.config.danger_nudge_min_level
        {
            let (title, body) = copy::danger(&habit.name, streak, snapshot.danger);
            nudges.push(Nudge {
                kind: NudgeKind::StreakDanger,
                scope,
                date: snapshot.today,
                title,
                body,
                reason: NudgeReason::Danger {
                    level: snapshot.danger,
                    streak,
                },
            });
        }

        nudges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, 15, 0)
            .unwrap()
    }

    fn habit() -> Habit {
        Habit::new("Stretch", at(1, 0))
    }

    #[test]
    fn optimal_hour_defaults_to_nine() {
        assert_eq!(AdaptiveScheduler::new().optimal_hour(&habit(), &[]), 9);
    }

    #[test]
    fn optimal_hour_is_two_hours_before_average() {
        let h = habit();
        let logs = vec![
            HabitLog::complete(&h.id, at(1, 18)),
            HabitLog::complete(&h.id, at(2, 19)),
            HabitLog::complete(&h.id, at(3, 21)),
        ];
        // mean 58 / 3 = 19
        assert_eq!(AdaptiveScheduler::new().optimal_hour(&h, &logs), 17);
    }

    #[test]
    fn optimal_hour_never_before_seven() {
        let h = habit();
        let logs = vec![HabitLog::complete(&h.id, at(1, 5)), HabitLog::complete(&h.id, at(2, 6))];
        assert_eq!(AdaptiveScheduler::new().optimal_hour(&h, &logs), 7);
    }

    #[test]
    fn optimal_hour_ignores_unmet_goals() {
        let h = habit().with_goal(3.0);
        let logs = vec![
            HabitLog::complete(&h.id, at(1, 22)).with_value(1.0),
            HabitLog::complete(&h.id, at(2, 12)).with_value(3.0),
        ];
        assert_eq!(AdaptiveScheduler::new().optimal_hour(&h, &logs), 10);
    }

    #[test]
    fn milestones_prefer_exact_matches() {
        let s = AdaptiveScheduler::new();
        assert_eq!(s.check_milestone(3), Some(Milestone::StartingStrong));
        assert_eq!(s.check_milestone(7), Some(Milestone::WeekWarrior));
        assert_eq!(s.check_milestone(14), Some(Milestone::TwoWeeks));
        assert_eq!(s.check_milestone(30), Some(Milestone::MonthMaster));
        assert_eq!(s.check_milestone(100), Some(Milestone::Centurion));
        assert_eq!(s.check_milestone(50), Some(Milestone::BigMilestone { days: 50 }));
        assert_eq!(s.check_milestone(150), Some(Milestone::BigMilestone { days: 150 }));
        assert_eq!(s.check_milestone(0), None);
        assert_eq!(s.check_milestone(8), None);
    }

    #[test]
    fn danger_by_hour() {
        let s = AdaptiveScheduler::new();
        assert_eq!(s.danger_level(false, at(5, 16)), DangerLevel::Safe);
        assert_eq!(s.danger_level(false, at(5, 17)), DangerLevel::Moderate);
        assert_eq!(s.danger_level(false, at(5, 20)), DangerLevel::High);
        assert_eq!(s.danger_level(false, at(5, 23)), DangerLevel::Critical);
    }

    #[test]
    fn danger_is_safe_once_goal_met() {
        let s = AdaptiveScheduler::new();
        for hour in 0..24 {
            assert_eq!(s.danger_level(true, at(5, hour)), DangerLevel::Safe);
        }
    }

    #[test]
    fn evening_with_open_streak_plans_reminder_and_danger() {
        let s = AdaptiveScheduler::new();
        let h = habit();
        let logs: Vec<_> = (1..=4).map(|d| HabitLog::complete(&h.id, at(d, 8))).collect();
        let now = at(5, 21);
        let snap = s.snapshot(&h, &logs, now).unwrap();
        assert_eq!(snap.streak.current_length, 4);
        assert_eq!(snap.danger, DangerLevel::High);

        let kinds: Vec<_> = s.plan(&snap, now).into_iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NudgeKind::DailyReminder, NudgeKind::StreakDanger]);
    }

    #[test]
    fn moderate_danger_does_not_nudge_by_default() {
        let s = AdaptiveScheduler::new();
        let h = habit();
        let logs = vec![HabitLog::complete(&h.id, at(4, 8))];
        let now = at(5, 18);
        let snap = s.snapshot(&h, &logs, now).unwrap();
        let kinds: Vec<_> = s.plan(&snap, now).into_iter().map(|n| n.kind).collect();
        assert_eq!(kinds, vec![NudgeKind::DailyReminder]);
    }

    #[test]
    fn no_reminder_before_optimal_hour() {
        let s = AdaptiveScheduler::new();
        let h = habit();
        let now = at(5, 8);
        let snap = s.snapshot(&h, &[], now).unwrap();
        assert!(s.plan(&snap, now).is_empty());
    }

    #[test]
    fn completed_milestone_day_celebrates() {
        let s = AdaptiveScheduler::new();
        let h = habit();
        let logs: Vec<_> = (0..7)
            .map(|i| HabitLog::complete(&h.id, at(1, 8) + Duration::days(i)))
            .collect();
        let now = at(7, 22);
        let snap = s.snapshot(&h, &logs, now).unwrap();
        let nudges = s.plan(&snap, now);
        assert_eq!(nudges.len(), 1);
        assert_eq!(nudges[0].kind, NudgeKind::Milestone);
        assert_eq!(
            nudges[0].reason,
            NudgeReason::Milestone {
                milestone: Milestone::WeekWarrior
            }
        );
    }

    #[test]
    fn inactive_habits_are_never_nudged() {
        let s = AdaptiveScheduler::new();
        let mut h = habit();
        h.is_active = false;
        let now = at(5, 23);
        let logs = vec![HabitLog::complete(&h.id, at(4, 8))];
        let snap = s.snapshot(&h, &logs, now).unwrap();
        assert!(s.plan(&snap, now).is_empty());
    }

    #[test]
    fn bad_goal_fails_closed() {
        let s = AdaptiveScheduler::new();
        let h = habit().with_goal(-1.0);
        assert!(s.snapshot(&h, &[], at(5, 10)).is_err());
    }

    #[test]
    fn logs_of_another_habit_are_rejected() {
        let s = AdaptiveScheduler::new();
        let h = habit();
        let other = habit();
        let logs = vec![HabitLog::complete(&other.id, at(4, 8))];
        let err = s.snapshot(&h, &logs, at(5, 10)).unwrap_err();
        assert!(matches!(
            err,
            ComputationError::ForeignLog { ref log_habit_id, .. } if *log_habit_id == other.id
        ));
    }
}
