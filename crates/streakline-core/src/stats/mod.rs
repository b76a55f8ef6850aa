//! Statistics module for Streakline
//!
//! This module derives consistency scores, daily completion trends and the
//! calendar heat map from habit log history.

mod consistency;
mod heatmap;
mod trend;

use serde::{Deserialize, Serialize};

use crate::habit::{Habit, HabitLog};

pub use consistency::{ConsistencyAnalyzer, ConsistencyLevel, ConsistencyScore};
pub use heatmap::{HeatMap, HeatMapBuilder, HeatMapCell};
pub use trend::{TrendAnalyzer, TrendPoint};

/// A habit together with its full log history.
#[derive(Debug, Clone, Copy)]
pub struct HabitHistory<'a> {
    pub habit: &'a Habit,
    pub logs: &'a [HabitLog],
}

impl<'a> HabitHistory<'a> {
    pub fn new(habit: &'a Habit, logs: &'a [HabitLog]) -> Self {
        Self { habit, logs }
    }
}

/// Tunables shared by the analyzers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Number of most recent logs feeding the consistency score
    #[serde(default = "default_consistency_window")]
    pub consistency_window: usize,
    /// Minimum score for `High`
    #[serde(default = "default_high_threshold")]
    pub high_threshold: u8,
    /// Minimum score for `Medium`
    #[serde(default = "default_medium_threshold")]
    pub medium_threshold: u8,
    /// Days covered by the daily trend
    #[serde(default = "default_trend_window_days")]
    pub trend_window_days: u32,
    /// Weeks covered by the heat map
    #[serde(default = "default_heatmap_weeks")]
    pub heatmap_weeks: u32,
}

fn default_consistency_window() -> usize {
    14
}
fn default_high_threshold() -> u8 {
    80
}
fn default_medium_threshold() -> u8 {
    50
}
fn default_trend_window_days() -> u32 {
    7
}
fn default_heatmap_weeks() -> u32 {
    6
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            consistency_window: default_consistency_window(),
            high_threshold: default_high_threshold(),
            medium_threshold: default_medium_threshold(),
            trend_window_days: default_trend_window_days(),
            heatmap_weeks: default_heatmap_weeks(),
        }
    }
}
