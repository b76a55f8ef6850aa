//! The engine ties the calculators to a store.
//!
//! [`Engine::run_cycle`] is what a periodic wake-up calls: it evaluates every
//! active habit, plans nudges and pushes them through the dispatch
//! coordinator. A fault in one habit is recorded and the cycle moves on.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::completion::{CompletionOutcome, CompletionService, LogAction};
use crate::dispatch::{
    Delivery, DispatchConfig, DispatchCoordinator, DispatchKey, DispatchLedger, DispatchOutcome,
    DispatchState, DEFAULT_STALE_AFTER_SECS,
};
use crate::error::{ConfigError, CoreError, Result, StorageError};
use crate::events::Event;
use crate::habit::{Habit, HabitLog};
use crate::leveling::LevelingEngine;
use crate::scheduler::{AdaptiveScheduler, DangerLevel, HabitSnapshot, NudgeKind, Scope};
use crate::stats::{
    ConsistencyAnalyzer, HabitHistory, HeatMap, HeatMapBuilder, StatsConfig, TrendAnalyzer,
    TrendPoint,
};
use crate::storage::{CompletionStore, Config, LogStore};

/// A habit that could not be evaluated during a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitFailure {
    pub habit_id: String,
    pub message: String,
}

/// Summary of one wake-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleReport {
    pub habits_evaluated: usize,
    pub nudges_planned: usize,
    pub dispatched: usize,
    /// Nudges another run had already sent today
    pub suppressed: usize,
    pub delivery_failures: usize,
    pub pruned: usize,
    pub failures: Vec<HabitFailure>,
    pub events: Vec<Event>,
}

impl CycleReport {
    fn fail(&mut self, habit_id: &str, err: &CoreError) {
        tracing::warn!(habit = habit_id, error = %err, "skipping habit this cycle");
        self.failures.push(HabitFailure {
            habit_id: habit_id.to_string(),
            message: err.to_string(),
        });
        self.events.push(Event::HabitFailed {
            habit_id: habit_id.to_string(),
            message: err.to_string(),
        });
    }
}

/// Streak engine bound to a store.
pub struct Engine<S> {
    store: S,
    scheduler: AdaptiveScheduler,
    leveling: LevelingEngine,
    stats: StatsConfig,
    dispatch: DispatchConfig,
    reservation_timeout: Duration,
}

impl<S> Engine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            scheduler: AdaptiveScheduler::new(),
            leveling: LevelingEngine::new(),
            stats: StatsConfig::default(),
            dispatch: DispatchConfig::default(),
            reservation_timeout: Duration::seconds(DEFAULT_STALE_AFTER_SECS),
        }
    }

    /// Build an engine from a loaded [`Config`].
    ///
    /// # Errors
    /// Returns an error if the config does not validate.
    pub fn with_config(store: S, config: &Config) -> Result<Self> {
        config.validate()?;
        // a wake-up is abandoned after its timeout, so nothing it reserved
        // can still be in flight after that
        let reservation_timeout = i64::try_from(config.wake.timeout_secs)
            .map(Duration::seconds)
            .map_err(|e| ConfigError::InvalidValue {
                key: "wake.timeout_secs".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            store,
            scheduler: AdaptiveScheduler::with_config(
                config.scheduler.clone(),
                ConsistencyAnalyzer::with_config(config.stats.clone()),
            ),
            leveling: LevelingEngine::with_config(config.leveling.clone())?,
            stats: config.stats.clone(),
            dispatch: config.dispatch.clone(),
            reservation_timeout,
        })
    }

    /// Age after which a dispatch reservation left `Pending` by another run
    /// is considered abandoned and may be claimed again. It must outlast the
    /// longest time a live run can spend handing off one nudge.
    pub fn with_reservation_timeout(mut self, timeout: Duration) -> Self {
        self.reservation_timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn scheduler(&self) -> &AdaptiveScheduler {
        &self.scheduler
    }

    pub fn leveling(&self) -> &LevelingEngine {
        &self.leveling
    }
}

impl<S: LogStore> Engine<S> {
    /// Scheduling snapshot for one habit at `now`.
    pub fn snapshot(&self, habit_id: &str, now: NaiveDateTime) -> Result<HabitSnapshot> {
        let habit = self
            .store
            .get_habit(habit_id)?
            .ok_or_else(|| StorageError::HabitNotFound(habit_id.to_string()))?;
        let logs = self.store.get_logs(habit_id)?;
        Ok(self.scheduler.snapshot(&habit, &logs, now)?)
    }

    /// Average completion across active habits for the trailing window.
    pub fn trend(&self, today: NaiveDate) -> Result<Vec<TrendPoint>> {
        let loaded = self.load_histories()?;
        let histories = as_histories(&loaded);
        TrendAnalyzer::from_config(&self.stats)
            .average_daily_trend(&histories, today)
            .map_err(CoreError::from)
    }

    /// Calendar heat map, or `None` when there is nothing to show yet.
    pub fn heat_map(&self, today: NaiveDate) -> Result<Option<HeatMap>> {
        let loaded = self.load_histories()?;
        let histories = as_histories(&loaded);
        HeatMapBuilder::from_config(&self.stats)
            .calendar_heat_map(&histories, today)
            .map_err(CoreError::from)
    }

    fn load_histories(&self) -> Result<Vec<(Habit, Vec<HabitLog>)>> {
        self.store
            .get_habits()?
            .into_iter()
            .map(|habit| {
                let logs = self.store.get_logs(&habit.id)?;
                Ok((habit, logs))
            })
            .collect()
    }
}

impl<S: CompletionStore> Engine<S> {
    /// Record a day's result; see [`CompletionService::log`].
    pub fn log(&self, habit_id: &str, date: NaiveDate, action: LogAction) -> Result<CompletionOutcome> {
        CompletionService::with_leveling(&self.store, self.leveling.clone()).log(habit_id, date, action)
    }
}

impl<S: LogStore + DispatchLedger> Engine<S> {
    /// Evaluate every active habit at `now` and dispatch what is due.
    ///
    /// # Errors
    /// Fails only when the habit list itself cannot be read. Per-habit faults
    /// land in [`CycleReport::failures`]; a failed prune is logged and leaves
    /// [`CycleReport::pruned`] at zero.
    pub fn run_cycle(&self, now: NaiveDateTime, delivery: &dyn Delivery) -> Result<CycleReport> {
        let habits = self.store.get_habits()?;
        let coordinator = DispatchCoordinator::with_config(&self.store, self.dispatch.clone())
            .with_stale_after(self.reservation_timeout);
        let mut report = CycleReport::default();

        for habit in habits.iter().filter(|h| h.is_active) {
            report.habits_evaluated += 1;

            let snapshot = match self
                .store
                .get_logs(&habit.id)
                .and_then(|logs| {
                    self.scheduler
                        .snapshot(habit, &logs, now)
                        .map_err(CoreError::from)
                })
            {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    report.fail(&habit.id, &err);
                    continue;
                }
            };

            if snapshot.streak.current_length > 0 && snapshot.danger != DangerLevel::Safe {
                report.events.push(Event::StreakInDanger {
                    habit_id: habit.id.clone(),
                    streak: snapshot.streak.current_length,
                    level: snapshot.danger,
                });
            }

            let nudges = self.scheduler.plan(&snapshot, now);
            report.nudges_planned += nudges.len();

            for nudge in &nudges {
                let habit_id = nudge.habit_id().map(str::to_string);
                match coordinator.dispatch(nudge, delivery) {
                    Ok(DispatchOutcome::Sent) => {
                        report.dispatched += 1;
                        report.events.push(Event::NudgeDispatched {
                            kind: nudge.kind,
                            habit_id,
                            date: nudge.date,
                        });
                    }
                    Ok(DispatchOutcome::AlreadySent) => {
                        report.suppressed += 1;
                        report.events.push(Event::NudgeSuppressed {
                            kind: nudge.kind,
                            habit_id,
                            date: nudge.date,
                        });
                    }
                    Err(CoreError::Delivery(err)) => {
                        report.delivery_failures += 1;
                        report.events.push(Event::DeliveryFailed {
                            kind: nudge.kind,
                            habit_id,
                            message: err.to_string(),
                        });
                    }
                    Err(err) => report.fail(&habit.id, &err),
                }
            }
        }

        match coordinator.prune(now.date()) {
            Ok(removed) => report.pruned = removed,
            Err(err) => tracing::warn!(error = %err, "could not prune dispatch records"),
        }
        tracing::info!(
            habits = report.habits_evaluated,
            dispatched = report.dispatched,
            suppressed = report.suppressed,
            delivery_failures = report.delivery_failures,
            failures = report.failures.len(),
            "cycle finished"
        );
        Ok(report)
    }

    /// Whether `kind` already went out for `habit_id` on `date`.
    pub fn was_dispatched(&self, kind: NudgeKind, habit_id: &str, date: NaiveDate) -> Result<bool> {
        let key = DispatchKey::new(kind, &Scope::Habit(habit_id.to_string()), date);
        Ok(self.store.state(&key)? == Some(DispatchState::Sent))
    }
}

fn as_histories(loaded: &[(Habit, Vec<HabitLog>)]) -> Vec<HabitHistory<'_>> {
    loaded
        .iter()
        .map(|(habit, logs)| HabitHistory::new(habit, logs))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::storage::Database;
    use std::sync::Mutex;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[derive(Default)]
    struct Outbox {
        sent: Mutex<Vec<(NudgeKind, Option<String>)>>,
    }

    impl Outbox {
        fn kinds(&self) -> Vec<NudgeKind> {
            self.sent.lock().unwrap().iter().map(|(k, _)| *k).collect()
        }
    }

    impl Delivery for Outbox {
        fn send(&self, kind: NudgeKind, _: &str, _: &str, habit: Option<&str>) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push((kind, habit.map(str::to_string)));
            Ok(())
        }
    }

    struct Offline;

    impl Delivery for Offline {
        fn send(&self, _: NudgeKind, _: &str, _: &str, _: Option<&str>) -> Result<(), DeliveryError> {
            Err(DeliveryError::Unavailable("no route".into()))
        }
    }

    /// Five completed mornings, nothing yet on the 6th.
    fn five_day_streak(db: &Database) -> Habit {
        let habit = Habit::new("Meditate", at(1, 0));
        db.save_habit(&habit).unwrap();
        for d in 1..=5 {
            db.upsert_log(&HabitLog::complete(&habit.id, at(d, 8))).unwrap();
        }
        habit
    }

    #[test]
    fn late_evening_sends_reminder_and_danger_once() {
        let engine = Engine::new(Database::open_memory().unwrap());
        let habit = five_day_streak(engine.store());
        let outbox = Outbox::default();

        let report = engine.run_cycle(at(6, 21), &outbox).unwrap();
        assert_eq!(report.habits_evaluated, 1);
        assert_eq!(report.dispatched, 2);
        assert_eq!(
            outbox.kinds(),
            vec![NudgeKind::DailyReminder, NudgeKind::StreakDanger]
        );
        assert!(report.events.contains(&Event::StreakInDanger {
            habit_id: habit.id.clone(),
            streak: 5,
            level: DangerLevel::High,
        }));

        // Critical later that night, but the danger kind already went out.
        let again = engine.run_cycle(at(6, 23), &outbox).unwrap();
        assert_eq!(again.dispatched, 0);
        assert_eq!(again.suppressed, 2);
        assert_eq!(outbox.kinds().len(), 2);
        assert!(engine.was_dispatched(NudgeKind::StreakDanger, &habit.id, at(6, 0).date()).unwrap());
    }

    #[test]
    fn failed_delivery_is_retried_next_cycle() {
        let engine = Engine::new(Database::open_memory().unwrap());
        let habit = five_day_streak(engine.store());

        let report = engine.run_cycle(at(6, 21), &Offline).unwrap();
        assert_eq!(report.delivery_failures, 2);
        assert_eq!(report.dispatched, 0);
        let key = DispatchKey::new(
            NudgeKind::StreakDanger,
            &Scope::Habit(habit.id.clone()),
            at(6, 0).date(),
        );
        assert_eq!(engine.store().state(&key).unwrap(), None);

        let outbox = Outbox::default();
        let retry = engine.run_cycle(at(6, 22), &outbox).unwrap();
        assert_eq!(retry.dispatched, 2);
        assert_eq!(engine.store().state(&key).unwrap(), Some(DispatchState::Sent));
    }

    #[test]
    fn completed_day_only_celebrates_milestones() {
        let engine = Engine::new(Database::open_memory().unwrap());
        let habit = Habit::new("Walk", at(1, 0));
        engine.store().save_habit(&habit).unwrap();
        for d in 1..=3 {
            engine
                .log(&habit.id, at(d, 0).date(), LogAction::Complete { at: at(d, 18) })
                .unwrap();
        }

        let outbox = Outbox::default();
        let report = engine.run_cycle(at(3, 22), &outbox).unwrap();
        assert_eq!(outbox.kinds(), vec![NudgeKind::Milestone]);
        assert!(report.events.iter().all(|e| !matches!(e, Event::StreakInDanger { .. })));
    }

    #[test]
    fn inactive_habits_are_not_evaluated() {
        let db = Database::open_memory().unwrap();
        let habit = five_day_streak(&db);
        db.set_active(&habit.id, false).unwrap();
        let engine = Engine::new(db);

        let outbox = Outbox::default();
        let report = engine.run_cycle(at(6, 21), &outbox).unwrap();
        assert_eq!(report.habits_evaluated, 0);
        assert!(outbox.kinds().is_empty());
    }

    /// Delegates to a database but fails log reads for one habit, or the
    /// habit list entirely.
    struct FaultyStore {
        inner: Database,
        broken_habit: Option<String>,
        list_fails: bool,
        prune_fails: bool,
    }

    impl LogStore for FaultyStore {
        fn get_habits(&self) -> Result<Vec<Habit>> {
            if self.list_fails {
                return Err(StorageError::Locked.into());
            }
            self.inner.get_habits()
        }
        fn get_habit(&self, habit_id: &str) -> Result<Option<Habit>> {
            self.inner.get_habit(habit_id)
        }
        fn save_habit(&self, habit: &Habit) -> Result<()> {
            self.inner.save_habit(habit)
        }
        fn delete_habit(&self, habit_id: &str) -> Result<bool> {
            self.inner.delete_habit(habit_id)
        }
        fn get_logs(&self, habit_id: &str) -> Result<Vec<HabitLog>> {
            if self.broken_habit.as_deref() == Some(habit_id) {
                return Err(StorageError::QueryFailed("disk I/O error".into()).into());
            }
            self.inner.get_logs(habit_id)
        }
        fn get_log(&self, habit_id: &str, date: NaiveDate) -> Result<Option<HabitLog>> {
            self.inner.get_log(habit_id, date)
        }
        fn upsert_log(&self, log: &HabitLog) -> Result<()> {
            self.inner.upsert_log(log)
        }
    }

    impl DispatchLedger for FaultyStore {
        fn reserve(&self, key: &DispatchKey, stale_before: chrono::DateTime<chrono::Utc>) -> Result<bool> {
            self.inner.reserve(key, stale_before)
        }
        fn commit(&self, key: &DispatchKey) -> Result<()> {
            self.inner.commit(key)
        }
        fn release(&self, key: &DispatchKey) -> Result<()> {
            self.inner.release(key)
        }
        fn state(&self, key: &DispatchKey) -> Result<Option<DispatchState>> {
            self.inner.state(key)
        }
        fn prune_before(&self, date: NaiveDate) -> Result<usize> {
            if self.prune_fails {
                return Err(StorageError::Locked.into());
            }
            self.inner.prune_before(date)
        }
    }

    #[test]
    fn one_broken_habit_does_not_stop_the_cycle() {
        let db = Database::open_memory().unwrap();
        let broken = five_day_streak(&db);
        let healthy = Habit::new("Journal", at(1, 1));
        db.save_habit(&healthy).unwrap();
        db.upsert_log(&HabitLog::complete(&healthy.id, at(5, 9))).unwrap();

        let engine = Engine::new(FaultyStore {
            inner: db,
            broken_habit: Some(broken.id.clone()),
            list_fails: false,
            prune_fails: false,
        });
        let outbox = Outbox::default();
        let report = engine.run_cycle(at(6, 21), &outbox).unwrap();

        assert_eq!(report.habits_evaluated, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].habit_id, broken.id);
        assert!(outbox
            .sent
            .lock()
            .unwrap()
            .iter()
            .all(|(_, h)| h.as_deref() == Some(healthy.id.as_str())));
        assert_eq!(report.dispatched, 2);
    }

    #[test]
    fn unreadable_habit_list_aborts_the_cycle() {
        let engine = Engine::new(FaultyStore {
            inner: Database::open_memory().unwrap(),
            broken_habit: None,
            list_fails: true,
            prune_fails: false,
        });
        let err = engine.run_cycle(at(6, 21), &Outbox::default()).unwrap_err();
        assert!(matches!(err, CoreError::Storage(StorageError::Locked)));
    }

    #[test]
    fn old_dispatch_records_are_pruned() {
        let engine = Engine::new(Database::open_memory().unwrap());
        five_day_streak(engine.store());
        let outbox = Outbox::default();
        engine.run_cycle(at(6, 21), &outbox).unwrap();

        let report = engine.run_cycle(at(8, 7), &outbox).unwrap();
        assert_eq!(report.pruned, 2);
    }

    #[test]
    fn trend_and_heat_map_span_all_habits() {
        let engine = Engine::new(Database::open_memory().unwrap());
        five_day_streak(engine.store());
        let trend = engine.trend(at(6, 0).date()).unwrap();
        assert_eq!(trend.len(), 5);
        assert!(trend.iter().all(|p| p.percent == 100));

        let map = engine.heat_map(at(6, 0).date()).unwrap().unwrap();
        assert_eq!(map.active_days(), 5);
    }

    #[test]
    fn with_config_rejects_invalid_config() {
        let mut config = Config::default();
        config.leveling.xp_threshold = 0;
        assert!(Engine::with_config(Database::open_memory().unwrap(), &config).is_err());
    }

    #[test]
    fn failed_prune_keeps_the_report() {
        let db = Database::open_memory().unwrap();
        five_day_streak(&db);
        let engine = Engine::new(FaultyStore {
            inner: db,
            broken_habit: None,
            list_fails: false,
            prune_fails: true,
        });
        let outbox = Outbox::default();

        let report = engine.run_cycle(at(6, 21), &outbox).unwrap();
        assert_eq!(report.dispatched, 2);
        assert_eq!(report.pruned, 0);
        assert!(report.failures.is_empty());
    }

    #[test]
    fn abandoned_reservation_is_retried_after_timeout() {
        let engine = Engine::new(Database::open_memory().unwrap());
        let habit = five_day_streak(engine.store());
        // a run that reserved the reminder and then died mid-handoff
        let key = DispatchKey::new(
            NudgeKind::DailyReminder,
            &Scope::Habit(habit.id.clone()),
            at(6, 0).date(),
        );
        assert!(engine.store().reserve(&key, chrono::Utc::now()).unwrap());

        let outbox = Outbox::default();
        let report = engine.run_cycle(at(6, 21), &outbox).unwrap();
        assert_eq!(report.suppressed, 1);
        assert_eq!(outbox.kinds(), vec![NudgeKind::StreakDanger]);

        let engine = engine.with_reservation_timeout(Duration::zero());
        let report = engine.run_cycle(at(6, 22), &outbox).unwrap();
        assert_eq!(report.dispatched, 1);
        assert_eq!(report.suppressed, 1);
        assert_eq!(
            outbox.kinds(),
            vec![NudgeKind::StreakDanger, NudgeKind::DailyReminder]
        );
        assert_eq!(engine.store().state(&key).unwrap(), Some(DispatchState::Sent));
    }

    #[test]
    fn oversized_windows_fail_without_panicking() {
        let mut engine = Engine::new(Database::open_memory().unwrap());
        five_day_streak(engine.store());
        engine.stats.heatmap_weeks = 20_000_000;
        engine.stats.trend_window_days = u32::MAX;
        assert!(matches!(
            engine.heat_map(at(6, 0).date()).unwrap_err(),
            CoreError::Computation(_)
        ));
        assert!(engine.trend(at(6, 0).date()).is_err());
    }
}
