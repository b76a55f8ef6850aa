//! Calendar heat map of daily completion.
//!
//! The map covers a trailing window of whole weeks ending today and is laid
//! out as `weeks` rows of 7 days, oldest first.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{HabitHistory, StatsConfig};
use crate::error::ComputationError;

/// One day in the heat map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatMapCell {
    pub date: NaiveDate,
    /// Mean completion fraction of the habits that logged this day (0.0-1.0)
    pub intensity: f64,
}

impl HeatMapCell {
    /// Character for ASCII rendering.
    pub fn heat_char(&self) -> char {
        if self.intensity <= 0.0 {
            '·'
        } else if self.intensity < 0.34 {
            '░'
        } else if self.intensity < 0.67 {
            '▒'
        } else if self.intensity < 1.0 {
            '▓'
        } else {
            '█'
        }
    }
}

/// Weeks x 7 grid of daily intensities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeatMap {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub weeks: Vec<Vec<HeatMapCell>>,
}

impl HeatMap {
    pub fn cells(&self) -> impl Iterator<Item = &HeatMapCell> {
        self.weeks.iter().flatten()
    }

    pub fn active_days(&self) -> usize {
        self.cells().filter(|c| c.intensity > 0.0).count()
    }

    pub fn render_ascii(&self) -> String {
        let mut output = String::new();
        for week in &self.weeks {
            if let Some(first) = week.first() {
                output.push_str(&format!("{} ", first.date.format("%m-%d")));
            }
            for cell in week {
                output.push(cell.heat_char());
            }
            output.push('\n');
        }
        output
    }
}

/// Builds [`HeatMap`]s from habit histories.
#[derive(Debug, Clone)]
pub struct HeatMapBuilder {
    weeks: u32,
}

impl Default for HeatMapBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl HeatMapBuilder {
    pub fn new() -> Self {
        Self::with_weeks(StatsConfig::default().heatmap_weeks)
    }

    pub fn with_weeks(weeks: u32) -> Self {
        Self { weeks }
    }

    pub fn from_config(config: &StatsConfig) -> Self {
        Self::with_weeks(config.heatmap_weeks)
    }

    /// Build the grid, or `None` when no day in the window has any
    /// completion (an all-zero grid is not worth rendering).
    ///
    /// # Errors
    /// Fails when the window would start before the earliest representable
    /// date.
    pub fn calendar_heat_map(
        &self,
        histories: &[HabitHistory<'_>],
        today: NaiveDate,
    ) -> Result<Option<HeatMap>, ComputationError> {
        let days = i64::from(self.weeks) * 7;
        if days == 0 {
            return Ok(None);
        }
        let start = today
            .checked_sub_signed(Duration::days(days - 1))
            .ok_or(ComputationError::DateOutOfRange {
                window: "heat map",
                days,
                from: today,
            })?;

        let mut by_date: HashMap<NaiveDate, (f64, u32)> = HashMap::new();
        for history in histories {
            for log in history
                .logs
                .iter()
                .filter(|log| log.date >= start && log.date <= today)
            {
                let entry = by_date.entry(log.date).or_insert((0.0, 0));
                entry.0 += log.completion_fraction(history.habit.goal_per_day);
                entry.1 += 1;
            }
        }

        let cells: Vec<HeatMapCell> = (0..days)
            .map(|offset| {
                let date = start + Duration::days(offset);
                let intensity = by_date
                    .get(&date)
                    .map_or(0.0, |(sum, count)| sum / f64::from(*count));
                HeatMapCell { date, intensity }
            })
            .collect();

        if cells.iter().all(|c| c.intensity <= 0.0) {
            return Ok(None);
        }

        let weeks = cells.chunks(7).map(<[HeatMapCell]>::to_vec).collect();
        Ok(Some(HeatMap {
            start,
            end: today,
            weeks,
        }))
    }
}
