pub mod config;
pub mod habit;
pub mod log;
pub mod progress;
pub mod stats;
pub mod wake;

use chrono::{Local, NaiveDate, NaiveDateTime};
use streakline_core::{Config, Database, Engine};

pub type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Open the default database with the user's config applied.
pub fn open_engine() -> Result<Engine<Database>, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    Ok(Engine::with_config(Database::open()?, &config)?)
}

/// Local wall-clock time; all day boundaries are local midnight.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Parse `YYYY-MM-DD`, defaulting to today.
pub fn parse_date(raw: Option<&str>) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    match raw {
        Some(raw) => Ok(NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|e| format!("invalid date '{raw}': {e}"))?),
        None => Ok(now().date()),
    }
}

/// Parse `YYYY-MM-DDTHH:MM[:SS]`, defaulting to now.
pub fn parse_datetime(raw: Option<&str>) -> Result<NaiveDateTime, Box<dyn std::error::Error>> {
    let Some(raw) = raw else {
        return Ok(now());
    };
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .map_err(|e| format!("invalid datetime '{raw}': {e}").into())
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
