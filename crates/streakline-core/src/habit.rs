//! Habit and daily log types.
//!
//! A [`HabitLog`] is the only raw fact the engine reads: one record per
//! (habit, calendar day). Everything else (streaks, scores, nudges) is
//! derived from the log set on demand.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ComputationError;

/// How often a habit is meant to be performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Custom,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ComputationError> {
        match s {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "custom" => Ok(Frequency::Custom),
            other => Err(ComputationError::UnknownVariant {
                field: "frequency",
                value: other.to_string(),
            }),
        }
    }
}

/// Progression stat a habit can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Strength,
    Intelligence,
    Wisdom,
    Discipline,
    Charisma,
}

impl Attribute {
    pub const ALL: [Attribute; 5] = [
        Attribute::Strength,
        Attribute::Intelligence,
        Attribute::Wisdom,
        Attribute::Discipline,
        Attribute::Charisma,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::Strength => "strength",
            Attribute::Intelligence => "intelligence",
            Attribute::Wisdom => "wisdom",
            Attribute::Discipline => "discipline",
            Attribute::Charisma => "charisma",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ComputationError> {
        Attribute::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| ComputationError::UnknownVariant {
                field: "attribute",
                value: s.to_string(),
            })
    }
}

/// Status of a single day's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogStatus {
    #[default]
    Pending,
    Complete,
    Skipped,
}

impl LogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogStatus::Pending => "pending",
            LogStatus::Complete => "complete",
            LogStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ComputationError> {
        match s {
            "pending" => Ok(LogStatus::Pending),
            "complete" => Ok(LogStatus::Complete),
            "skipped" => Ok(LogStatus::Skipped),
            other => Err(ComputationError::UnknownVariant {
                field: "status",
                value: other.to_string(),
            }),
        }
    }
}

/// A user-defined recurring action (a "protocol").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub name: String,
    pub frequency: Frequency,
    /// Numeric daily target; a log meets the goal when its value reaches it.
    pub goal_per_day: f64,
    pub linked_attribute: Option<Attribute>,
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

impl Habit {
    /// Create an active daily habit with a fresh id and a goal of 1.
    pub fn new(name: impl Into<String>, created_at: NaiveDateTime) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            frequency: Frequency::Daily,
            goal_per_day: 1.0,
            linked_attribute: None,
            is_active: true,
            created_at,
        }
    }

    pub fn with_goal(mut self, goal_per_day: f64) -> Self {
        self.goal_per_day = goal_per_day;
        self
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.linked_attribute = Some(attribute);
        self
    }

    /// Reject goals that cannot produce a completion fraction.
    pub fn check_goal(&self) -> Result<(), ComputationError> {
        if self.goal_per_day.is_finite() && self.goal_per_day > 0.0 {
            Ok(())
        } else {
            Err(ComputationError::InvalidGoal {
                habit_id: self.id.clone(),
                goal: self.goal_per_day,
            })
        }
    }
}

/// One record per (habit, calendar day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitLog {
    pub habit_id: String,
    pub date: NaiveDate,
    pub status: LogStatus,
    /// Present only when `status` is `Complete`.
    pub completed_at: Option<NaiveDateTime>,
    /// Partial amount recorded toward the habit's goal.
    pub value: Option<f64>,
}

impl HabitLog {
    pub fn complete(habit_id: impl Into<String>, completed_at: NaiveDateTime) -> Self {
        Self {
            habit_id: habit_id.into(),
            date: completed_at.date(),
            status: LogStatus::Complete,
            completed_at: Some(completed_at),
            value: None,
        }
    }

    pub fn pending(habit_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            habit_id: habit_id.into(),
            date,
            status: LogStatus::Pending,
            completed_at: None,
            value: None,
        }
    }

    pub fn skipped(habit_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            status: LogStatus::Skipped,
            ..Self::pending(habit_id, date)
        }
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn is_complete(&self) -> bool {
        self.status == LogStatus::Complete
    }

    /// Fraction of the daily goal this log represents, in `[0.0, 1.0]`.
    ///
    /// A `Complete` log with no recorded value counts as meeting the goal.
    pub fn completion_fraction(&self, goal: f64) -> f64 {
        let met = self.is_complete() && self.value.map_or(true, |v| v >= goal);
        if met {
            return 1.0;
        }
        match self.value {
            Some(v) if goal > 0.0 => (v / goal).clamp(0.0, 1.0),
            _ => 0.0,
        }
    }

    /// Whether the day counts as goal-met for scheduling purposes.
    pub fn goal_met(&self, goal: f64) -> bool {
        self.is_complete() && self.completion_fraction(goal) >= 1.0
    }
}
