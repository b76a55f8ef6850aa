use clap::Subcommand;
use serde_json::json;
use streakline_core::{LogStore, StorageError, StreakCalculator};

use super::{open_engine, parse_date, parse_datetime, print_json, CmdResult};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Current and longest streak for a habit
    Streak {
        /// Habit ID
        habit_id: String,
        /// Evaluate as of this day (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Consistency score over recent logs
    Consistency {
        /// Habit ID
        habit_id: String,
    },
    /// Everything the scheduler sees for a habit right now
    Snapshot {
        /// Habit ID
        habit_id: String,
        /// Evaluate at this time (YYYY-MM-DDTHH:MM, default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Average daily completion across active habits
    Trend {
        /// Last day of the window (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Calendar heat map of recent weeks
    Heatmap {
        /// Last day of the map (YYYY-MM-DD, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Print cells as JSON instead of a text grid
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: StatsAction) -> CmdResult {
    let engine = open_engine()?;

    match action {
        StatsAction::Streak { habit_id, date } => {
            let date = parse_date(date.as_deref())?;
            if engine.store().get_habit(&habit_id)?.is_none() {
                return Err(StorageError::HabitNotFound(habit_id).into());
            }
            let logs = engine.store().get_logs(&habit_id)?;
            let state = StreakCalculator::new().streak_state(&logs, date);
            print_json(&json!({
                "habit_id": habit_id,
                "as_of": date,
                "current_length": state.current_length,
                "longest_length": state.longest_length,
            }))?;
        }
        StatsAction::Consistency { habit_id } => {
            let snapshot = engine.snapshot(&habit_id, parse_datetime(None)?)?;
            print_json(&json!({
                "habit_id": habit_id,
                "score": snapshot.consistency.score,
                "level": snapshot.consistency.level.label(),
                "completion_rate": snapshot.consistency.completion_rate,
                "variance": snapshot.consistency.variance,
                "sample_size": snapshot.consistency.sample_size,
            }))?;
        }
        StatsAction::Snapshot { habit_id, at } => {
            let at = parse_datetime(at.as_deref())?;
            print_json(&engine.snapshot(&habit_id, at)?)?;
        }
        StatsAction::Trend { date } => {
            let date = parse_date(date.as_deref())?;
            print_json(&engine.trend(date)?)?;
        }
        StatsAction::Heatmap { date, json } => {
            let date = parse_date(date.as_deref())?;
            match engine.heat_map(date)? {
                Some(map) if json => print_json(&map)?,
                Some(map) => print!("{}", map.render_ascii()),
                None if json => println!("null"),
                None => println!("no completions in range"),
            }
        }
    }
    Ok(())
}
