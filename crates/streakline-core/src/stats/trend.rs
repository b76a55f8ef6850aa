//! Average daily completion trend across habits.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::{HabitHistory, StatsConfig};
use crate::error::ComputationError;

/// Average completion for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub date: NaiveDate,
    /// 0-100
    pub percent: u8,
}

#[derive(Debug, Clone)]
pub struct TrendAnalyzer {
    window_days: u32,
}

impl Default for TrendAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl TrendAnalyzer {
    pub fn new() -> Self {
        Self::with_window(StatsConfig::default().trend_window_days)
    }

    pub fn with_window(window_days: u32) -> Self {
        Self { window_days }
    }

    pub fn from_config(config: &StatsConfig) -> Self {
        Self::with_window(config.trend_window_days)
    }

    /// Per-day mean completion of active habits over the trailing window
    /// ending at `today`, oldest first. Days without any log are omitted.
    pub fn average_daily_trend(
        &self,
        histories: &[HabitHistory<'_>],
        today: NaiveDate,
    ) -> Result<Vec<TrendPoint>, ComputationError> {
        if self.window_days == 0 {
            return Ok(Vec::new());
        }
        let days = i64::from(self.window_days);
        let first = today
            .checked_sub_signed(Duration::days(days - 1))
            .ok_or(ComputationError::DateOutOfRange {
                window: "trend",
                days,
                from: today,
            })?;

        let mut by_date: BTreeMap<NaiveDate, (f64, u32)> = BTreeMap::new();
        for history in histories.iter().filter(|h| h.habit.is_active) {
            for log in history
                .logs
                .iter()
                .filter(|log| log.date >= first && log.date <= today)
            {
                let entry = by_date.entry(log.date).or_insert((0.0, 0));
                entry.0 += log.completion_fraction(history.habit.goal_per_day);
                entry.1 += 1;
            }
        }

        Ok(by_date
            .into_iter()
            .map(|(date, (sum, count))| TrendPoint {
                date,
                percent: (sum / f64::from(count) * 100.0).round() as u8,
            })
            .collect())
    }
}
