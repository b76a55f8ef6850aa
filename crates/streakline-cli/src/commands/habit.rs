//! Habit management commands for CLI.

use clap::Subcommand;
use streakline_core::{
    Attribute, Database, Frequency, Habit, LogStore, StorageError, ValidationError,
};

use super::{now, print_json, CmdResult};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a new habit
    Add {
        /// Habit name
        name: String,
        /// Daily target amount (default: 1)
        #[arg(long, default_value = "1")]
        goal: f64,
        /// Attribute raised by each completion
        /// (strength, intelligence, wisdom, discipline, charisma)
        #[arg(long)]
        attribute: Option<String>,
        /// Frequency: daily, weekly or custom (default: daily)
        #[arg(long, default_value = "daily")]
        frequency: String,
    },
    /// List habits
    List {
        /// Include deactivated habits
        #[arg(long)]
        all: bool,
    },
    /// Stop tracking a habit but keep its history
    Deactivate {
        /// Habit ID
        id: String,
    },
    /// Resume a deactivated habit
    Activate {
        /// Habit ID
        id: String,
    },
    /// Delete a habit and all of its logs
    Delete {
        /// Habit ID
        id: String,
    },
}

pub fn run(action: HabitAction) -> CmdResult {
    let db = Database::open()?;

    match action {
        HabitAction::Add {
            name,
            goal,
            attribute,
            frequency,
        } => {
            let name = name.trim();
            if name.is_empty() {
                return Err(ValidationError::Empty("name".to_string()).into());
            }
            let mut habit = Habit::new(name, now()).with_goal(goal);
            habit.frequency = Frequency::parse(&frequency)?;
            if let Some(attribute) = attribute {
                habit = habit.with_attribute(Attribute::parse(&attribute)?);
            }
            habit.check_goal()?;
            db.save_habit(&habit)?;
            print_json(&habit)?;
        }
        HabitAction::List { all } => {
            let habits = if all {
                db.get_habits()?
            } else {
                db.active_habits()?
            };
            print_json(&habits)?;
        }
        HabitAction::Deactivate { id } => {
            db.set_active(&id, false)?;
            println!("deactivated {id}");
        }
        HabitAction::Activate { id } => {
            db.set_active(&id, true)?;
            println!("activated {id}");
        }
        HabitAction::Delete { id } => {
            if !db.delete_habit(&id)? {
                return Err(StorageError::HabitNotFound(id).into());
            }
            println!("deleted {id}");
        }
    }
    Ok(())
}
