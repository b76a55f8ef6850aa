use clap::Subcommand;
use streakline_core::ProgressStore;

use super::{open_engine, print_json, CmdResult};

#[derive(Subcommand)]
pub enum ProgressAction {
    /// Current level, XP and attributes
    Show,
    /// Start over at level 1
    Reset,
}

pub fn run(action: ProgressAction) -> CmdResult {
    let engine = open_engine()?;

    match action {
        ProgressAction::Show => {
            let progress = engine
                .store()
                .get_progress()?
                .unwrap_or_else(|| engine.leveling().reset());
            print_json(&progress)?;
        }
        ProgressAction::Reset => {
            let progress = engine.leveling().reset();
            engine.store().save_progress(&progress)?;
            print_json(&progress)?;
        }
    }
    Ok(())
}
