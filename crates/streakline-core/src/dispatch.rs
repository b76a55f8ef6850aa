//! Dispatch coordination for nudges.
//!
//! At most one nudge of each kind fires per scope per calendar day. A key is
//! first *reserved* with a conditional insert, then the nudge is handed to
//! [`Delivery`], and only a confirmed handoff *commits* the record. A failed
//! handoff releases the reservation so the next wake-up retries it. A
//! reservation left `Pending` by a run that died mid-handoff goes stale and
//! may be claimed again once it is older than the coordinator's stale window.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ComputationError, DeliveryError, Result};
use crate::scheduler::{Nudge, NudgeKind, Scope};

/// Idempotency key: one nudge kind, for one scope, on one day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DispatchKey {
    pub kind: NudgeKind,
    /// Habit id prefixed with `habit:`, or `global`
    pub scope: String,
    pub date: NaiveDate,
}

impl DispatchKey {
    pub fn new(kind: NudgeKind, scope: &Scope, date: NaiveDate) -> Self {
        Self {
            kind,
            scope: scope.key(),
            date,
        }
    }

    pub fn for_nudge(nudge: &Nudge) -> Self {
        Self::new(nudge.kind, &nudge.scope, nudge.date)
    }
}

/// Lifecycle of a dispatch record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    /// Reserved by a run that is handing the nudge to delivery
    Pending,
    /// Delivery confirmed
    Sent,
}

impl DispatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchState::Pending => "pending",
            DispatchState::Sent => "sent",
        }
    }
}

/// Backing set of dispatch records.
///
/// `reserve` must be atomic per key: of any number of concurrent callers for
/// the same key, exactly one may observe `true`.
pub trait DispatchLedger {
    /// Claim `key` if no record exists, or if it is `Pending` and was last
    /// touched at or before `stale_before`. Returns `false` when the key is
    /// sent or held by a live run.
    fn reserve(&self, key: &DispatchKey, stale_before: DateTime<Utc>) -> Result<bool>;

    /// Mark a reserved key as sent.
    fn commit(&self, key: &DispatchKey) -> Result<()>;

    /// Drop a reservation whose delivery failed.
    fn release(&self, key: &DispatchKey) -> Result<()>;

    fn state(&self, key: &DispatchKey) -> Result<Option<DispatchState>>;

    /// Remove every record dated before `date`.
    fn prune_before(&self, date: NaiveDate) -> Result<usize>;
}

impl<L: DispatchLedger + ?Sized> DispatchLedger for &L {
    fn reserve(&self, key: &DispatchKey, stale_before: DateTime<Utc>) -> Result<bool> {
        (**self).reserve(key, stale_before)
    }
    fn commit(&self, key: &DispatchKey) -> Result<()> {
        (**self).commit(key)
    }
    fn release(&self, key: &DispatchKey) -> Result<()> {
        (**self).release(key)
    }
    fn state(&self, key: &DispatchKey) -> Result<Option<DispatchState>> {
        (**self).state(key)
    }
    fn prune_before(&self, date: NaiveDate) -> Result<usize> {
        (**self).prune_before(date)
    }
}

/// Process-local ledger.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    records: Mutex<HashMap<DispatchKey, (DispatchState, DateTime<Utc>)>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<DispatchKey, (DispatchState, DateTime<Utc>)>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records().is_empty()
    }
}

impl DispatchLedger for MemoryLedger {
    fn reserve(&self, key: &DispatchKey, stale_before: DateTime<Utc>) -> Result<bool> {
        let mut records = self.records();
        match records.get(key) {
            Some((DispatchState::Pending, touched)) if *touched <= stale_before => {}
            Some(_) => return Ok(false),
            None => {}
        }
        records.insert(key.clone(), (DispatchState::Pending, Utc::now()));
        Ok(true)
    }

    fn commit(&self, key: &DispatchKey) -> Result<()> {
        self.records()
            .insert(key.clone(), (DispatchState::Sent, Utc::now()));
        Ok(())
    }

    fn release(&self, key: &DispatchKey) -> Result<()> {
        let mut records = self.records();
        if matches!(records.get(key), Some((DispatchState::Pending, _))) {
            records.remove(key);
        }
        Ok(())
    }

    fn state(&self, key: &DispatchKey) -> Result<Option<DispatchState>> {
        Ok(self.records().get(key).map(|(state, _)| *state))
    }

    fn prune_before(&self, date: NaiveDate) -> Result<usize> {
        let mut records = self.records();
        let before = records.len();
        records.retain(|key, _| key.date >= date);
        Ok(before - records.len())
    }
}

/// External notification mechanism.
pub trait Delivery {
    /// Hand a nudge off for delivery. `Ok` means the handoff is confirmed.
    fn send(
        &self,
        kind: NudgeKind,
        title: &str,
        body: &str,
        target_habit_id: Option<&str>,
    ) -> Result<(), DeliveryError>;
}

/// Dispatch tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Days of records kept before `today` when pruning
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_retention_days() -> u32 {
    1
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

/// What happened to one proposed nudge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    AlreadySent,
}

/// Seconds a `Pending` reservation is honoured unless configured otherwise.
pub const DEFAULT_STALE_AFTER_SECS: i64 = 30;

/// Deduplicates nudges and forwards them to delivery.
#[derive(Debug)]
pub struct DispatchCoordinator<L> {
    ledger: L,
    config: DispatchConfig,
    stale_after: Duration,
}

impl<L: DispatchLedger> DispatchCoordinator<L> {
    pub fn new(ledger: L) -> Self {
        Self::with_config(ledger, DispatchConfig::default())
    }

    pub fn with_config(ledger: L, config: DispatchConfig) -> Self {
        Self {
            ledger,
            config,
            stale_after: Duration::seconds(DEFAULT_STALE_AFTER_SECS),
        }
    }

    /// Treat reservations older than `stale_after` as abandoned. This must be
    /// at least as long as any run may hold a key.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    fn stale_before(&self) -> DateTime<Utc> {
        Utc::now()
            .checked_sub_signed(self.stale_after)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Record a dispatch whose handoff the caller has already confirmed.
    ///
    /// Returns `true` the first time for a given kind/scope/date, `false`
    /// on every later call.
    pub fn try_dispatch(&self, kind: NudgeKind, scope: &Scope, date: NaiveDate) -> Result<bool> {
        let key = DispatchKey::new(kind, scope, date);
        if !self.ledger.reserve(&key, self.stale_before())? {
            return Ok(false);
        }
        self.ledger.commit(&key)?;
        Ok(true)
    }

    /// Deliver `nudge` unless it was already sent today.
    ///
    /// # Errors
    /// A delivery failure is returned as [`crate::CoreError::Delivery`] and
    /// leaves no record behind, so the next run retries the nudge.
    pub fn dispatch(&self, nudge: &Nudge, delivery: &dyn Delivery) -> Result<DispatchOutcome> {
        let key = DispatchKey::for_nudge(nudge);
        if !self.ledger.reserve(&key, self.stale_before())? {
            tracing::debug!(kind = %nudge.kind, scope = %key.scope, "nudge already dispatched");
            return Ok(DispatchOutcome::AlreadySent);
        }

        if let Err(err) = delivery.send(nudge.kind, &nudge.title, &nudge.body, nudge.habit_id()) {
            tracing::warn!(kind = %nudge.kind, scope = %key.scope, error = %err, "delivery failed");
            self.ledger.release(&key)?;
            return Err(err.into());
        }

        self.ledger.commit(&key)?;
        tracing::info!(kind = %nudge.kind, scope = %key.scope, date = %key.date, "nudge dispatched");
        Ok(DispatchOutcome::Sent)
    }

    /// Drop records older than the retention window.
    pub fn prune(&self, today: NaiveDate) -> Result<usize> {
        let days = i64::from(self.config.retention_days);
        let cutoff = today
            .checked_sub_signed(Duration::days(days))
            .ok_or(ComputationError::DateOutOfRange {
                window: "dispatch retention",
                days,
                from: today,
            })?;
        let removed = self.ledger.prune_before(cutoff)?;
        if removed > 0 {
            tracing::debug!(removed, %cutoff, "pruned dispatch records");
        }
        Ok(removed)
    }
}
