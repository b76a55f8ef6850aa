use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{DangerLevel, Milestone};

/// Kind of engagement nudge. At most one of each kind fires per scope per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NudgeKind {
    DailyReminder,
    StreakDanger,
    Milestone,
}

impl NudgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NudgeKind::DailyReminder => "reminder",
            NudgeKind::StreakDanger => "danger",
            NudgeKind::Milestone => "milestone",
        }
    }
}

impl std::fmt::Display for NudgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a nudge is about: one habit, or the user as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Global,
    Habit(String),
}

impl Scope {
    /// Stable key used for dispatch records.
    pub fn key(&self) -> String {
        match self {
            Scope::Global => "global".to_string(),
            Scope::Habit(id) => format!("habit:{id}"),
        }
    }

    pub fn habit_id(&self) -> Option<&str> {
        match self {
            Scope::Global => None,
            Scope::Habit(id) => Some(id),
        }
    }
}

/// Why a nudge was proposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NudgeReason {
    OptimalHour { hour: u8 },
    Danger { level: DangerLevel, streak: u32 },
    Milestone { milestone: Milestone },
}

/// A proposed notification, not yet dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nudge {
    pub kind: NudgeKind,
    pub scope: Scope,
    pub date: NaiveDate,
    pub title: String,
    pub body: String,
    pub reason: NudgeReason,
}

impl Nudge {
    pub fn habit_id(&self) -> Option<&str> {
        self.scope.habit_id()
    }
}
