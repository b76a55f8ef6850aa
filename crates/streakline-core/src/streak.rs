//! Streak derivation from the daily log set.
//!
//! Streaks are never stored as running counters; they are recomputed from
//! the authoritative logs on every read so they cannot drift from history.

use std::collections::BTreeSet;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::habit::HabitLog;

/// Derived streak lengths for one habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StreakState {
    pub current_length: u32,
    pub longest_length: u32,
}

/// Stateless streak calculator.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreakCalculator;

impl StreakCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Dates of every `Complete` log, deduplicated and ordered.
    pub fn completed_dates(logs: &[HabitLog]) -> BTreeSet<NaiveDate> {
        logs.iter()
            .filter(|log| log.is_complete())
            .map(|log| log.date)
            .collect()
    }

    /// Length of the run of completed days ending at `as_of`.
    ///
    /// An uncompleted `as_of` does not break the streak (the day is not over)
    /// but earns no credit: counting starts from the day before.
    pub fn current_streak(&self, logs: &[HabitLog], as_of: NaiveDate) -> u32 {
        let completed = Self::completed_dates(logs);
        if completed.is_empty() {
            return 0;
        }

        let mut day = as_of;
        if !completed.contains(&day) {
            match day.pred_opt() {
                Some(prev) => day = prev,
                None => return 0,
            }
        }

        let mut count = 0;
        while completed.contains(&day) {
            count += 1;
            match day.pred_opt() {
                Some(prev) => day = prev,
                None => break,
            }
        }
        count
    }

    /// Longest run of consecutive completed days anywhere in history.
    ///
    /// Walks completed dates newest-first; a gap of exactly one day extends
    /// the running streak, anything else restarts it at 1.
    pub fn longest_streak(&self, logs: &[HabitLog]) -> u32 {
        let completed = Self::completed_dates(logs);
        let dates: Vec<NaiveDate> = completed.into_iter().rev().collect();
        if dates.is_empty() {
            return 0;
        }

        let mut longest = 1;
        let mut running = 1;
        for pair in dates.windows(2) {
            if pair[0] - pair[1] == Duration::days(1) {
                running += 1;
                longest = longest.max(running);
            } else {
                running = 1;
            }
        }
        longest
    }

    pub fn streak_state(&self, logs: &[HabitLog], as_of: NaiveDate) -> StreakState {
        StreakState {
            current_length: self.current_streak(logs, as_of),
            longest_length: self.longest_streak(logs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn done(d: NaiveDate) -> HabitLog {
        HabitLog::complete("h", d.and_hms_opt(9, 30, 0).unwrap())
    }

    #[test]
    fn empty_log_set_has_no_streak() {
        let calc = StreakCalculator::new();
        assert_eq!(calc.current_streak(&[], day(6)), 0);
        assert_eq!(calc.longest_streak(&[]), 0);
    }

    #[test]
    fn unlogged_today_keeps_yesterdays_streak() {
        let calc = StreakCalculator::new();
        let logs: Vec<_> = (1..=5).map(|d| done(day(d))).collect();
        assert_eq!(calc.current_streak(&logs, day(6)), 5);
    }

    #[test]
    fn logged_today_counts_today() {
        let calc = StreakCalculator::new();
        let logs: Vec<_> = (1..=6).map(|d| done(day(d))).collect();
        assert_eq!(calc.current_streak(&logs, day(6)), 6);
    }

    #[test]
    fn two_day_gap_breaks_current_streak() {
        let calc = StreakCalculator::new();
        let logs: Vec<_> = (1..=4).map(|d| done(day(d))).collect();
        assert_eq!(calc.current_streak(&logs, day(6)), 0);
    }

    #[test]
    fn pending_and_skipped_logs_are_gaps() {
        let calc = StreakCalculator::new();
        let logs = vec![
            done(day(1)),
            done(day(2)),
            HabitLog::skipped("h", day(3)),
            done(day(4)),
            HabitLog::pending("h", day(5)),
        ];
        assert_eq!(calc.current_streak(&logs, day(5)), 1);
        assert_eq!(calc.longest_streak(&logs), 2);
    }

    #[test]
    fn longest_streak_of_single_day_is_one() {
        let calc = StreakCalculator::new();
        assert_eq!(calc.longest_streak(&[done(day(3))]), 1);
    }

    #[test]
    fn insertion_order_is_irrelevant() {
        let calc = StreakCalculator::new();
        let logs = vec![done(day(4)), done(day(1)), done(day(3)), done(day(2)), done(day(9))];
        assert_eq!(calc.longest_streak(&logs), 4);
        assert_eq!(calc.current_streak(&logs, day(9)), 1);
    }

    proptest! {
        #[test]
        fn contiguous_run_ending_at_as_of_counts_k_plus_one(k in 0i64..200) {
            let calc = StreakCalculator::new();
            let as_of = day(1) + Duration::days(300);
            let logs: Vec<_> = (0..=k).map(|i| done(as_of - Duration::days(i))).collect();
            prop_assert_eq!(calc.current_streak(&logs, as_of), (k + 1) as u32);
        }

        #[test]
        fn a_gap_truncates_the_run_to_the_days_after_it(k in 1i64..60, gap in 0i64..60) {
            prop_assume!(gap <= k);
            let calc = StreakCalculator::new();
            let as_of = day(1) + Duration::days(100);
            let logs: Vec<_> = (0..=k)
                .filter(|i| *i != gap)
                .map(|i| done(as_of - Duration::days(i)))
                .collect();
            let expected = if gap == 0 {
                // today missing: credit starts yesterday and runs to the start
                k as u32
            } else {
                gap as u32
            };
            prop_assert_eq!(calc.current_streak(&logs, as_of), expected);
        }

        #[test]
        fn longest_never_below_current(offsets in proptest::collection::btree_set(0i64..90, 0..60)) {
            let calc = StreakCalculator::new();
            let base = day(1);
            let logs: Vec<_> = offsets.iter().map(|o| done(base + Duration::days(*o))).collect();
            let as_of = base + Duration::days(90);
            let state = calc.streak_state(&logs, as_of);
            prop_assert!(state.longest_length >= state.current_length);
        }
    }
}
