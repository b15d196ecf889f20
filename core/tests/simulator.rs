//! Stream simulator state machine: cadence, pause/resume, reset, speed,
//! end-of-stream, and classifier failures.

use sentinel_core::{
    classifier::{AnomalyModel, ClassifierAdapter},
    clock::{Cadence, SimPhase},
    command::ControlCommand,
    config::ClassificationPolicy,
    dataset::{parse_timestamp, Dataset, RawTransaction},
    engine::StreamSimulator,
    error::ClassificationError,
    event::SimEvent,
    explanation::FraudReason,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Flags anything strictly above `limit`, isolation-forest style.
struct AmountLimit {
    limit: f64,
}

impl AnomalyModel for AmountLimit {
    fn name(&self) -> &str { "amount_limit" }

    fn predict(&self, features: &[f64]) -> Result<i32, ClassificationError> {
        Ok(if features[0] > self.limit { -1 } else { 1 })
    }
}

/// Fails on one specific amount, otherwise never flags.
struct BrokenOn {
    amount: f64,
}

impl AnomalyModel for BrokenOn {
    fn name(&self) -> &str { "broken_on" }

    fn predict(&self, features: &[f64]) -> Result<i32, ClassificationError> {
        if features[0] == self.amount {
            Err(ClassificationError::Model { message: "bad row".into() })
        } else {
            Ok(1)
        }
    }
}

/// Fails the first `failures` calls, then flags everything.
struct FailsFirst {
    failures: u32,
    calls:    Rc<Cell<u32>>,
}

impl AnomalyModel for FailsFirst {
    fn name(&self) -> &str { "fails_first" }

    fn predict(&self, _features: &[f64]) -> Result<i32, ClassificationError> {
        let n = self.calls.get() + 1;
        self.calls.set(n);
        if n <= self.failures {
            Err(ClassificationError::Model { message: format!("call {n}") })
        } else {
            Ok(-1)
        }
    }
}

fn raw(ts: &str, user: &str, amount: f64, fraud: bool) -> RawTransaction {
    RawTransaction {
        timestamp: parse_timestamp(ts).expect("timestamp"),
        user_id: user.into(),
        amount,
        ground_truth_fraud: fraud,
    }
}

/// u1: ₹100 @10:00, ₹110 @11:00 (both normal), ₹900 @02:00.
fn sample_dataset() -> Dataset {
    Dataset::from_records(vec![
        raw("2024-01-01 10:00:00", "u1", 100.0, false),
        raw("2024-01-01 11:00:00", "u1", 110.0, false),
        raw("2024-01-02 02:00:00", "u1", 900.0, true),
    ])
    .expect("dataset")
}

fn limit_adapter() -> ClassifierAdapter {
    ClassifierAdapter::new(Box::new(AmountLimit { limit: 500.0 }))
}

fn started(cadence: Cadence) -> StreamSimulator {
    let _ = env_logger::builder().is_test(true).try_init();
    StreamSimulator::start(sample_dataset(), limit_adapter(), cadence)
}

fn emitted_ids(events: &[SimEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            SimEvent::RecordClassified { record } => Some(record.record.id),
            _ => None,
        })
        .collect()
}

#[test]
fn start_autoplays_with_first_tick_one_interval_out() {
    let sim = started(Cadence::Normal);
    assert_eq!(sim.phase(), SimPhase::Playing);
    assert_eq!(sim.cursor(), 0);
    assert_eq!(sim.next_deadline(), Some(1000));
}

#[test]
fn new_simulator_stays_idle_until_play() {
    let mut sim = StreamSimulator::new(sample_dataset(), limit_adapter(), Cadence::Fast);
    assert_eq!(sim.phase(), SimPhase::Idle);
    assert!(sim.advance(10_000).is_empty(), "idle simulator must not tick");

    let events = sim.play();
    assert_eq!(
        events,
        vec![SimEvent::PhaseChanged { from: SimPhase::Idle, to: SimPhase::Playing }]
    );
    assert_eq!(sim.next_deadline(), Some(10_200));
    assert_eq!(emitted_ids(&sim.advance(200)), vec![0]);
}

#[test]
fn ticks_fire_on_cadence_boundaries() {
    let mut sim = started(Cadence::Normal);
    assert!(sim.advance(999).is_empty());
    assert_eq!(emitted_ids(&sim.advance(1)), vec![0]);
    assert_eq!(emitted_ids(&sim.advance(2000)), vec![1, 2]);
    assert_eq!(sim.cursor(), 3);
    assert_eq!(sim.now(), 3000);
}

#[test]
fn each_record_emitted_exactly_once_in_order() {
    let mut sim = started(Cadence::Fast);
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    sim.subscribe_feed(move |c| sink.borrow_mut().push(c.record.id));

    let mut last_cursor = sim.cursor();
    while sim.phase() == SimPhase::Playing {
        sim.advance(200);
        assert!(sim.cursor() >= last_cursor, "cursor went backwards");
        last_cursor = sim.cursor();
    }

    assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    let feed_ids: Vec<usize> = sim.feed().iter().map(|c| c.record.id).collect();
    assert_eq!(feed_ids, vec![2, 1, 0], "feed must be newest first");
}

#[test]
fn flagged_record_goes_to_fraud_log_with_alert() {
    let mut sim = started(Cadence::Fast);
    let logged = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&logged);
    sim.subscribe_fraud_log(move |e| sink.borrow_mut().push(e.record().record.id));

    let events = sim.run_until_ended();

    assert_eq!(*logged.borrow(), vec![2]);
    assert_eq!(sim.fraud_log().len(), 1);
    assert!(sim.fraud_log()[0].record().predicted_fraud);

    let alert = events.iter().find_map(|e| match e {
        SimEvent::FraudAlert { record_id, message, .. } => Some((*record_id, message.clone())),
        _ => None,
    });
    assert_eq!(
        alert,
        Some((2, "Fraud Alert! User: u1, Amount: ₹900.00".to_string()))
    );
    assert!(!sim.feed()[1].predicted_fraud);
}

#[test]
fn pause_blocks_emission_and_resume_continues_with_next_record() {
    let mut sim = started(Cadence::Normal);
    assert_eq!(emitted_ids(&sim.advance(1000)), vec![0]);

    sim.pause();
    assert_eq!(sim.phase(), SimPhase::Paused);
    assert_eq!(sim.next_deadline(), None, "pause must cancel the pending tick");
    assert!(sim.advance(60_000).is_empty());
    assert_eq!(sim.cursor(), 1);

    sim.resume();
    assert_eq!(sim.next_deadline(), Some(62_000));
    assert_eq!(emitted_ids(&sim.advance(1000)), vec![1]);
}

#[test]
fn redundant_pause_and_resume_are_no_ops() {
    let mut sim = started(Cadence::Normal);
    assert!(sim.resume().is_empty(), "resume while playing");
    assert_eq!(sim.next_deadline(), Some(1000));

    assert_eq!(sim.pause().len(), 1);
    assert!(sim.pause().is_empty(), "pause while paused");
    assert_eq!(sim.phase(), SimPhase::Paused);
}

#[test]
fn toggle_pause_flips_between_playing_and_paused() {
    let mut sim = started(Cadence::Normal);
    sim.apply(ControlCommand::TogglePause);
    assert_eq!(sim.phase(), SimPhase::Paused);
    sim.apply(ControlCommand::TogglePause);
    assert_eq!(sim.phase(), SimPhase::Playing);
}

#[test]
fn reset_restores_initial_state_from_every_phase() {
    // Paused mid-run.
    let mut sim = started(Cadence::Normal);
    sim.advance(2000);
    sim.pause();
    sim.reset();
    assert_reset(&sim, 2000);

    // Ended.
    let mut sim = started(Cadence::Fast);
    sim.run_until_ended();
    assert_eq!(sim.phase(), SimPhase::Ended);
    let now = sim.now();
    sim.reset();
    assert_reset(&sim, now);

    // Playing with a tick already scheduled.
    let mut sim = started(Cadence::Normal);
    sim.advance(1500);
    let events = sim.reset();
    assert_eq!(events, vec![SimEvent::SimulationReset]);
    assert_reset(&sim, 1500);
    assert!(sim.advance(999).is_empty(), "stale pre-reset tick fired");
    assert_eq!(emitted_ids(&sim.advance(1)), vec![0]);
}

fn assert_reset(sim: &StreamSimulator, now: u64) {
    assert_eq!(sim.cursor(), 0);
    assert!(sim.feed().is_empty());
    assert!(sim.fraud_log().is_empty());
    assert_eq!(sim.phase(), SimPhase::Playing);
    assert_eq!(sim.next_deadline(), Some(now + sim.cadence().interval_ms()));
}

#[test]
fn speed_change_does_not_move_in_flight_tick() {
    let mut sim = started(Cadence::Normal);
    sim.advance(500);
    sim.set_speed(Cadence::Fast);
    assert_eq!(sim.next_deadline(), Some(1000));

    assert!(sim.advance(499).is_empty());
    assert_eq!(emitted_ids(&sim.advance(1)), vec![0]);
    assert_eq!(sim.next_deadline(), Some(1200), "following tick uses the new cadence");
}

#[test]
fn speed_change_while_paused_applies_on_resume() {
    let mut sim = started(Cadence::Normal);
    sim.advance(1000);
    sim.pause();
    sim.set_speed(Cadence::Slow);
    assert_eq!(sim.cadence(), Cadence::Slow);
    assert_eq!(sim.next_deadline(), None);

    sim.resume();
    assert_eq!(sim.next_deadline(), Some(3500));
}

#[test]
fn manual_tick_restarts_the_cadence_instead_of_stacking() {
    let mut sim = started(Cadence::Normal);
    sim.advance(400);
    assert_eq!(emitted_ids(&sim.tick()), vec![0]);
    assert_eq!(sim.next_deadline(), Some(1400), "pending tick must be replaced");

    assert!(sim.advance(999).is_empty(), "old deadline at 1000 must not fire");
    assert_eq!(emitted_ids(&sim.advance(1)), vec![1]);
    assert_eq!(sim.next_deadline(), Some(2400));
}

#[test]
fn event_type_matches_serialized_tag() {
    let mut sim = started(Cadence::Fast);
    let mut events = sim.pause();
    events.extend(sim.set_speed(Cadence::Slow));
    events.extend(sim.reset());
    events.extend(sim.run_until_ended());
    assert!(events.len() > 5);
    for event in &events {
        let json = serde_json::to_value(event).expect("serialize event");
        assert_eq!(json["type"], event.event_type(), "tag mismatch for {event:?}");
    }
}

#[test]
fn end_of_stream_fires_once_and_then_nothing_ticks() {
    let mut sim = started(Cadence::Fast);
    let ends = Rc::new(Cell::new(0));
    let counter = Rc::clone(&ends);
    sim.subscribe_end_of_stream(move |emitted| {
        assert_eq!(emitted, 3);
        counter.set(counter.get() + 1);
    });

    sim.run_until_ended();
    assert_eq!(sim.phase(), SimPhase::Ended);
    assert_eq!(sim.next_deadline(), None);
    assert!(sim.advance(100_000).is_empty());
    assert!(sim.tick().is_empty());
    assert!(sim.play().is_empty());
    assert_eq!(ends.get(), 1);
}

#[test]
fn end_of_stream_is_signalled_on_the_tick_after_the_last_record() {
    let mut sim = started(Cadence::Normal);
    sim.advance(3000);
    assert_eq!(sim.phase(), SimPhase::Playing);
    let events = sim.advance(1000);
    assert_eq!(
        events,
        vec![
            SimEvent::PhaseChanged { from: SimPhase::Playing, to: SimPhase::Ended },
            SimEvent::EndOfStream { emitted: 3 },
        ]
    );
}

#[test]
fn empty_dataset_ends_on_first_tick() {
    let dataset = Dataset::from_records(Vec::new()).unwrap();
    let mut sim = StreamSimulator::start(dataset, limit_adapter(), Cadence::Fast);
    let events = sim.advance(200);
    assert!(events.contains(&SimEvent::EndOfStream { emitted: 0 }));
    assert_eq!(sim.phase(), SimPhase::Ended);
}

#[test]
fn classifier_failure_skips_record_without_stopping_the_feed() {
    let adapter = ClassifierAdapter::new(Box::new(BrokenOn { amount: 110.0 }));
    let mut sim = StreamSimulator::start(sample_dataset(), adapter, Cadence::Fast);
    let failures = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&failures);
    sim.subscribe_diagnostics(move |id, _err| sink.borrow_mut().push(id));

    let events = sim.run_until_ended();

    assert_eq!(*failures.borrow(), vec![1]);
    assert_eq!(emitted_ids(&events), vec![0, 2]);
    assert_eq!(sim.cursor(), 3);
    assert_eq!(sim.phase(), SimPhase::Ended);
    assert!(events.iter().any(|e| matches!(
        e,
        SimEvent::ClassificationFailed { record_id: 1, attempts: 1, .. }
    )));
}

#[test]
fn retry_policy_recovers_from_transient_failures() {
    let calls = Rc::new(Cell::new(0));
    let model = FailsFirst { failures: 2, calls: Rc::clone(&calls) };
    let mut sim = StreamSimulator::start(
        sample_dataset(),
        ClassifierAdapter::new(Box::new(model)),
        Cadence::Fast,
    )
    .with_policy(ClassificationPolicy::Retry { attempts: 2 });

    assert_eq!(emitted_ids(&sim.advance(200)), vec![0]);
    assert_eq!(calls.get(), 3);
    assert!(sim.feed()[0].predicted_fraud);
}

#[test]
fn retry_policy_gives_up_after_configured_attempts() {
    let calls = Rc::new(Cell::new(0));
    let model = FailsFirst { failures: 10, calls: Rc::clone(&calls) };
    let mut sim = StreamSimulator::start(
        sample_dataset(),
        ClassifierAdapter::new(Box::new(model)),
        Cadence::Fast,
    )
    .with_policy(ClassificationPolicy::Retry { attempts: 1 });

    let events = sim.advance(200);
    assert!(events.iter().any(|e| matches!(
        e,
        SimEvent::ClassificationFailed { record_id: 0, attempts: 2, .. }
    )));
    assert_eq!(sim.cursor(), 1);
    assert!(sim.feed().is_empty());
}

#[test]
fn inspect_builds_dashboard_view_for_emitted_records_only() {
    let mut sim = started(Cadence::Fast);
    sim.advance(400);
    assert!(sim.inspect(2).is_none(), "record 2 has not been emitted yet");

    sim.advance(200);
    let view = sim.inspect(2).expect("view");
    assert!(view.record.predicted_fraud);
    assert_eq!(view.summary.total_transaction_count, 3);
    assert_eq!(view.reason, Some(FraudReason::AmountSpike { percent_increase: Some(757) }));
    assert_eq!(view.history.selected, Some(2));
    assert_eq!(view.hourly.values().sum::<usize>(), 3);

    let normal = sim.inspect(0).expect("view");
    assert_eq!(normal.reason, None);
}

#[test]
fn queries_do_not_disturb_the_replay() {
    let mut sim = started(Cadence::Normal);
    sim.advance(1000);
    let before = sim.status();

    let summary = sim.summarize("u1");
    let _ = sim.explain(&sim.feed()[0].clone(), &summary);
    let _ = sim.history_series("u1", 0);
    let _ = sim.hourly_histogram("u1");
    let _ = sim.inspect(0);

    assert_eq!(sim.status(), before);
}
