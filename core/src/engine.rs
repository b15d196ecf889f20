//! The stream simulator: replays the dataset as a live feed.
//!
//! TICK ORDER (fixed, one atomic unit per tick):
//!   1. Fetch `dataset[cursor]`
//!   2. Classify `[amount, hour_of_day]`
//!   3. Push the classified record to the front of the feed
//!   4. If flagged: push to the front of the fraud log, raise an alert
//!   5. `cursor += 1`
//!
//! RULES:
//!   - Time only moves through `advance()` / `advance_to()`.
//!   - At most one tick is pending. Pause and reset cancel it before
//!     returning, so it can never fire late.
//!   - A cadence change never moves a deadline that is already set.
//!   - A classifier failure skips the record; it never stops the feed.
//!   - Queries take `&self` and only read the immutable dataset.

use crate::{
    analytics::{self, UserSummary},
    classifier::ClassifierAdapter,
    clock::{Cadence, SimClock, SimPhase},
    command::ControlCommand,
    config::{ClassificationPolicy, SentinelConfig},
    dataset::Dataset,
    error::{ClassificationError, SimResult},
    event::{ClassifiedRecord, FraudLogEntry, SimEvent, Subscribers},
    explanation::{self, FraudReason},
    isolation_forest::IsolationForest,
    series::{self, HistorySeries},
    types::{Millis, RecordId},
};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

pub struct StreamSimulator {
    dataset:     Dataset,
    classifier:  ClassifierAdapter,
    policy:      ClassificationPolicy,
    clock:       SimClock,
    cursor:      usize,
    feed:        VecDeque<ClassifiedRecord>,
    fraud_log:   VecDeque<FraudLogEntry>,
    subscribers: Subscribers,
}

/// Everything the dashboard shows for one selected record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionView {
    pub record:  ClassifiedRecord,
    pub summary: UserSummary,
    /// Present only for flagged records.
    pub reason:  Option<FraudReason>,
    pub history: HistorySeries,
    pub hourly:  BTreeMap<u32, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimStatus {
    pub now:          Millis,
    pub phase:        SimPhase,
    pub cadence:      Cadence,
    pub cursor:       usize,
    pub total:        usize,
    pub feed_len:     usize,
    pub fraud_count:  usize,
    pub next_tick_at: Option<Millis>,
}

impl StreamSimulator {
    /// A simulator in `Idle`. Nothing ticks until `play()`.
    pub fn new(dataset: Dataset, classifier: ClassifierAdapter, cadence: Cadence) -> Self {
        Self {
            dataset,
            classifier,
            policy:      ClassificationPolicy::default(),
            clock:       SimClock::new(cadence),
            cursor:      0,
            feed:        VecDeque::new(),
            fraud_log:   VecDeque::new(),
            subscribers: Subscribers::default(),
        }
    }

    /// Construct and autoplay: `Playing` with the first tick scheduled.
    pub fn start(dataset: Dataset, classifier: ClassifierAdapter, cadence: Cadence) -> Self {
        let mut sim = Self::new(dataset, classifier, cadence);
        sim.play();
        sim
    }

    /// Load the dataset and model named in `config` and build a simulator.
    pub fn from_config(config: &SentinelConfig) -> SimResult<Self> {
        let dataset = Dataset::load(&config.dataset_path)?;
        let model = IsolationForest::load(&config.model_path)?;
        let classifier = ClassifierAdapter::new(Box::new(model))
            .with_anomaly_label(config.anomaly_label);
        log::info!(
            "Loaded {} records for {} users; model={}",
            dataset.len(),
            dataset.user_count(),
            classifier.model_name()
        );

        let mut sim = Self::new(dataset, classifier, config.cadence)
            .with_policy(config.classification_policy);
        if config.autoplay {
            sim.play();
        }
        Ok(sim)
    }

    /// Read a JSON config file, then load what it names.
    pub fn from_config_file(path: &str) -> SimResult<Self> {
        let config = SentinelConfig::load(path)?;
        Self::from_config(&config)
    }

    pub fn with_policy(mut self, policy: ClassificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    // ── Subscription ───────────────────────────────

    pub fn subscribe_feed(&mut self, cb: impl FnMut(&ClassifiedRecord) + 'static) {
        self.subscribers.add_feed(Box::new(cb));
    }

    pub fn subscribe_fraud_log(&mut self, cb: impl FnMut(&FraudLogEntry) + 'static) {
        self.subscribers.add_fraud_log(Box::new(cb));
    }

    /// Called with the number of records emitted, at most once per run.
    pub fn subscribe_end_of_stream(&mut self, cb: impl FnMut(usize) + 'static) {
        self.subscribers.add_end_of_stream(Box::new(cb));
    }

    pub fn subscribe_diagnostics(&mut self, cb: impl FnMut(RecordId, &ClassificationError) + 'static) {
        self.subscribers.add_diagnostics(Box::new(cb));
    }

    // ── Control ────────────────────────────────────

    pub fn play(&mut self) -> Vec<SimEvent> {
        match self.clock.phase {
            SimPhase::Idle => {
                let mut events = Vec::new();
                self.set_phase(SimPhase::Playing, &mut events);
                self.clock.schedule();
                self.publish(events)
            }
            SimPhase::Paused => self.resume(),
            SimPhase::Playing | SimPhase::Ended => Vec::new(),
        }
    }

    pub fn pause(&mut self) -> Vec<SimEvent> {
        if self.clock.phase != SimPhase::Playing {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.clock.cancel();
        self.set_phase(SimPhase::Paused, &mut events);
        self.publish(events)
    }

    pub fn resume(&mut self) -> Vec<SimEvent> {
        if self.clock.phase != SimPhase::Paused {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.set_phase(SimPhase::Playing, &mut events);
        self.clock.schedule();
        self.publish(events)
    }

    pub fn toggle_pause(&mut self) -> Vec<SimEvent> {
        match self.clock.phase {
            SimPhase::Playing => self.pause(),
            SimPhase::Paused => self.resume(),
            SimPhase::Idle | SimPhase::Ended => Vec::new(),
        }
    }

    /// Back to the first record, from any phase, and playing.
    pub fn reset(&mut self) -> Vec<SimEvent> {
        self.clock.cancel();
        self.feed.clear();
        self.fraud_log.clear();
        self.cursor = 0;

        let mut events = vec![SimEvent::SimulationReset];
        self.set_phase(SimPhase::Playing, &mut events);
        self.clock.schedule();
        log::info!("Simulation reset at t={}ms", self.clock.now);
        self.publish(events)
    }

    /// Takes effect from the next scheduled tick onwards. A pending
    /// deadline keeps the interval it was scheduled with.
    pub fn set_speed(&mut self, cadence: Cadence) -> Vec<SimEvent> {
        self.clock.cadence = cadence;
        log::debug!("Cadence set to {cadence:?} ({}ms)", cadence.interval_ms());
        self.publish(vec![SimEvent::CadenceChanged { cadence }])
    }

    pub fn apply(&mut self, command: ControlCommand) -> Vec<SimEvent> {
        match command {
            ControlCommand::Play => self.play(),
            ControlCommand::Pause => self.pause(),
            ControlCommand::Resume => self.resume(),
            ControlCommand::TogglePause => self.toggle_pause(),
            ControlCommand::Reset => self.reset(),
            ControlCommand::SetSpeed { cadence } => self.set_speed(cadence),
        }
    }

    // ── Time ───────────────────────────────────────

    pub fn advance(&mut self, elapsed: Millis) -> Vec<SimEvent> {
        self.advance_to(self.clock.now.saturating_add(elapsed))
    }

    /// Fire every tick due at or before `target`, in order.
    pub fn advance_to(&mut self, target: Millis) -> Vec<SimEvent> {
        let mut events = Vec::new();
        while self.clock.take_due(target).is_some() {
            events.extend(self.tick());
        }
        self.clock.settle(target);
        events
    }

    /// Fast-forward until the dataset is exhausted. Stops early if the
    /// simulator is not playing.
    pub fn run_until_ended(&mut self) -> Vec<SimEvent> {
        let mut events = Vec::new();
        while self.clock.phase == SimPhase::Playing {
            match self.clock.next_tick_at() {
                Some(due) => events.extend(self.advance_to(due)),
                None => break,
            }
        }
        events
    }

    /// One step. A no-op unless playing.
    ///
    /// Called directly, it emits the next record now and restarts the
    /// cadence from `now`, replacing any pending deadline.
    pub fn tick(&mut self) -> Vec<SimEvent> {
        if self.clock.phase != SimPhase::Playing {
            return Vec::new();
        }

        let mut events = Vec::new();
        if self.cursor >= self.dataset.len() {
            self.clock.cancel();
            self.set_phase(SimPhase::Ended, &mut events);
            events.push(SimEvent::EndOfStream { emitted: self.cursor });
            log::info!("End of simulation: {} records replayed", self.cursor);
        } else {
            self.emit_next(&mut events);
            self.clock.schedule();
        }
        self.publish(events)
    }

    fn emit_next(&mut self, events: &mut Vec<SimEvent>) {
        let Some(record) = self.dataset.get(self.cursor).cloned() else {
            return;
        };

        let max_attempts = self.policy.max_attempts();
        let mut attempts = 0;
        let verdict = loop {
            attempts += 1;
            match self.classifier.classify(record.amount, record.hour_of_day) {
                Ok(flag) => break Ok(flag),
                Err(e) if attempts < max_attempts => {
                    log::debug!("record={} classify attempt {attempts} failed: {e}", record.id);
                }
                Err(e) => break Err(e),
            }
        };

        match verdict {
            Ok(predicted_fraud) => {
                log::debug!("record={} user={} fraud={predicted_fraud}", record.id, record.user_id);
                let classified = ClassifiedRecord { record, predicted_fraud };
                self.feed.push_front(classified.clone());
                events.push(SimEvent::RecordClassified { record: classified.clone() });

                if let Ok(entry) = FraudLogEntry::try_from(classified) {
                    let r = &entry.record().record;
                    let message = format!("Fraud Alert! User: {}, Amount: ₹{:.2}", r.user_id, r.amount);
                    log::info!("{message}");
                    let alert = SimEvent::FraudAlert {
                        record_id: r.id,
                        user_id:   r.user_id.clone(),
                        amount:    r.amount,
                        message,
                    };
                    self.fraud_log.push_front(entry.clone());
                    events.push(SimEvent::FraudLogged { entry });
                    events.push(alert);
                }
            }
            Err(error) => {
                log::warn!(
                    "record={} skipped after {attempts} failed classification attempt(s): {error}",
                    record.id
                );
                events.push(SimEvent::ClassificationFailed {
                    record_id: record.id,
                    attempts,
                    error,
                });
            }
        }

        self.cursor += 1;
    }

    fn set_phase(&mut self, to: SimPhase, events: &mut Vec<SimEvent>) {
        let from = self.clock.phase;
        if from != to {
            self.clock.phase = to;
            log::info!("Simulation {from:?} -> {to:?} at t={}ms", self.clock.now);
            events.push(SimEvent::PhaseChanged { from, to });
        }
    }

    fn publish(&mut self, events: Vec<SimEvent>) -> Vec<SimEvent> {
        for event in &events {
            log::trace!("t={}ms event={}", self.clock.now, event.event_type());
            self.subscribers.dispatch(event);
        }
        events
    }

    // ── Queries ────────────────────────────────────

    pub fn summarize(&self, user_id: &str) -> UserSummary {
        analytics::summarize(&self.dataset, user_id)
    }

    pub fn explain(&self, record: &ClassifiedRecord, summary: &UserSummary) -> Option<FraudReason> {
        explanation::explain(record, summary)
    }

    pub fn history_series(&self, user_id: &str, selected_id: RecordId) -> HistorySeries {
        series::history_series(&self.dataset.user_records(user_id), selected_id)
    }

    pub fn hourly_histogram(&self, user_id: &str) -> BTreeMap<u32, usize> {
        series::hourly_histogram(&self.dataset.user_records(user_id))
    }

    /// Dashboard data for a record already in the feed. `None` if the
    /// record has not been emitted in this run.
    pub fn inspect(&self, record_id: RecordId) -> Option<SelectionView> {
        let record = self.feed.iter().find(|c| c.record.id == record_id)?.clone();
        let user_id = record.record.user_id.as_str();
        let summary = self.summarize(user_id);
        let reason = self.explain(&record, &summary);
        let history = self.history_series(user_id, record_id);
        let hourly = self.hourly_histogram(user_id);
        Some(SelectionView { record, summary, reason, history, hourly })
    }

    // ── Accessors ──────────────────────────────────

    /// Emitted records, newest first.
    pub fn feed(&self) -> &VecDeque<ClassifiedRecord> {
        &self.feed
    }

    /// Flagged records, newest first.
    pub fn fraud_log(&self) -> &VecDeque<FraudLogEntry> {
        &self.fraud_log
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn phase(&self) -> SimPhase {
        self.clock.phase
    }

    pub fn cadence(&self) -> Cadence {
        self.clock.cadence
    }

    pub fn now(&self) -> Millis {
        self.clock.now
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.clock.next_tick_at()
    }

    pub fn status(&self) -> SimStatus {
        SimStatus {
            now:          self.clock.now,
            phase:        self.clock.phase,
            cadence:      self.clock.cadence,
            cursor:       self.cursor,
            total:        self.dataset.len(),
            feed_len:     self.feed.len(),
            fraud_count:  self.fraud_log.len(),
            next_tick_at: self.clock.next_tick_at(),
        }
    }
}
