use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::habit::LogStatus;
use crate::scheduler::{DangerLevel, NudgeKind};

/// Every state change the engine makes produces an Event.
/// The CLI prints them; a front-end can render them as it likes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A day's log was written for a habit.
    DayLogged {
        habit_id: String,
        date: NaiveDate,
        status: LogStatus,
    },
    XpAwarded {
        habit_id: String,
        xp_gained: u32,
        current_xp: u32,
    },
    LeveledUp {
        new_level: u32,
    },
    /// Delivery confirmed the handoff and the dispatch record was committed.
    NudgeDispatched {
        kind: NudgeKind,
        habit_id: Option<String>,
        date: NaiveDate,
    },
    /// Another run already sent this nudge today.
    NudgeSuppressed {
        kind: NudgeKind,
        habit_id: Option<String>,
        date: NaiveDate,
    },
    /// Delivery failed; the nudge will be retried next wake-up.
    DeliveryFailed {
        kind: NudgeKind,
        habit_id: Option<String>,
        message: String,
    },
    /// A streak is open late in the day.
    StreakInDanger {
        habit_id: String,
        streak: u32,
        level: DangerLevel,
    },
    /// One habit could not be evaluated this cycle; the others still ran.
    HabitFailed {
        habit_id: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = Event::NudgeDispatched {
            kind: NudgeKind::StreakDanger,
            habit_id: Some("h1".into()),
            date: NaiveDate::from_ymd_opt(2024, 1, 6).unwrap(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "NudgeDispatched");
        assert_eq!(json["kind"], "streak_danger");
        assert_eq!(json["date"], "2024-01-06");

        let back: Event = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
