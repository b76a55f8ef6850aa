//! Consistency scoring over the most recent logs of a habit.

use serde::{Deserialize, Serialize};

use super::StatsConfig;
use crate::habit::{Habit, HabitLog};

/// Qualitative band of a consistency score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyLevel {
    NeedsAttention,
    Medium,
    High,
}

impl ConsistencyLevel {
    pub fn label(&self) -> &'static str {
        match self {
            ConsistencyLevel::NeedsAttention => "Needs attention",
            ConsistencyLevel::Medium => "Medium",
            ConsistencyLevel::High => "High",
        }
    }
}

/// Consistency of one habit over its recent window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyScore {
    /// 0-100
    pub score: u8,
    /// Mean completion fraction (0.0-1.0)
    pub completion_rate: f64,
    /// Sample variance of the completion fractions
    pub variance: f64,
    pub level: ConsistencyLevel,
    /// Number of logs that fed the score
    pub sample_size: usize,
}

/// Computes [`ConsistencyScore`]s.
#[derive(Debug, Clone)]
pub struct ConsistencyAnalyzer {
    config: StatsConfig,
}

impl Default for ConsistencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsistencyAnalyzer {
    pub fn new() -> Self {
        Self {
            config: StatsConfig::default(),
        }
    }

    pub fn with_config(config: StatsConfig) -> Self {
        Self { config }
    }

    /// Score the most recent `consistency_window` logs, regardless of gaps
    /// between their dates.
    pub fn consistency_score(&self, habit: &Habit, logs: &[HabitLog]) -> ConsistencyScore {
        let mut recent: Vec<&HabitLog> = logs.iter().collect();
        recent.sort_by(|a, b| b.date.cmp(&a.date));
        recent.truncate(self.config.consistency_window);

        let fractions: Vec<f64> = recent
            .iter()
            .map(|log| log.completion_fraction(habit.goal_per_day))
            .collect();

        let n = fractions.len();
        let mean = if n == 0 {
            0.0
        } else {
            fractions.iter().sum::<f64>() / n as f64
        };
        let variance = if n <= 1 {
            0.0
        } else {
            fractions.iter().map(|f| (f - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        };

        let score = (mean * 100.0).round().clamp(0.0, 100.0) as u8;

        ConsistencyScore {
            score,
            completion_rate: mean,
            variance,
            level: self.level_for(score),
            sample_size: n,
        }
    }

    pub fn level_for(&self, score: u8) -> ConsistencyLevel {
        if score >= self.config.high_threshold {
            ConsistencyLevel::High
        } else if score >= self.config.medium_threshold {
            ConsistencyLevel::Medium
        } else {
            ConsistencyLevel::NeedsAttention
        }
    }
}
