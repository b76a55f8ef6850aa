use clap::{Args, Subcommand};
use streakline_core::LogAction;

use super::{open_engine, parse_date, parse_datetime, print_json, CmdResult};

#[derive(Args)]
pub struct Target {
    /// Habit ID
    habit_id: String,
    /// Day to record (YYYY-MM-DD, default: today)
    #[arg(long)]
    date: Option<String>,
}

#[derive(Subcommand)]
pub enum LogCommand {
    /// Mark the day's goal done
    Complete {
        #[command(flatten)]
        target: Target,
        /// Completion time (YYYY-MM-DDTHH:MM, default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Record an amount toward the day's goal
    Progress {
        #[command(flatten)]
        target: Target,
        /// Amount done so far today
        value: f64,
        /// Time of the entry (YYYY-MM-DDTHH:MM, default: now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Skip the day
    Skip {
        #[command(flatten)]
        target: Target,
    },
    /// Undo back to an open day
    Reopen {
        #[command(flatten)]
        target: Target,
    },
}

pub fn run(command: LogCommand) -> CmdResult {
    let (target, action) = match command {
        LogCommand::Complete { target, at } => {
            let at = parse_datetime(at.as_deref())?;
            (target, LogAction::Complete { at })
        }
        LogCommand::Progress { target, value, at } => {
            if !value.is_finite() || value < 0.0 {
                return Err(format!("invalid progress value: {value}").into());
            }
            let at = parse_datetime(at.as_deref())?;
            (target, LogAction::Progress { value, at })
        }
        LogCommand::Skip { target } => (target, LogAction::Skip),
        LogCommand::Reopen { target } => (target, LogAction::Reopen),
    };

    // an explicit --at with no --date logs the day it names
    let date = match (target.date.as_deref(), action) {
        (None, LogAction::Complete { at } | LogAction::Progress { at, .. }) => at.date(),
        (raw, _) => parse_date(raw)?,
    };
    let engine = open_engine()?;
    let outcome = engine.log(&target.habit_id, date, action)?;
    print_json(&outcome)
}
