//! Engine output: events, classified records, and subscribers.
//!
//! Presentation code never reaches into the simulator. It either reads
//! the events returned from `advance()` / `tick()` or registers a
//! callback per event type.

use crate::{
    clock::{Cadence, SimPhase},
    dataset::TransactionRecord,
    error::ClassificationError,
    types::{RecordId, UserId},
};
use serde::{Deserialize, Serialize};

/// A record plus the classifier's verdict. Produced once per emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    pub record:          TransactionRecord,
    pub predicted_fraud: bool,
}

/// A flagged record in the fraud log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FraudLogEntry {
    record: ClassifiedRecord,
}

impl FraudLogEntry {
    pub fn record(&self) -> &ClassifiedRecord {
        &self.record
    }
}

impl TryFrom<ClassifiedRecord> for FraudLogEntry {
    type Error = ClassifiedRecord;

    /// Fails, handing the record back, when it was not flagged.
    fn try_from(record: ClassifiedRecord) -> Result<Self, Self::Error> {
        if record.predicted_fraud {
            Ok(Self { record })
        } else {
            Err(record)
        }
    }
}

/// Every event emitted by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SimEvent {
    // ── Feed ───────────────────────────────────────
    RecordClassified {
        record: ClassifiedRecord,
    },
    FraudLogged {
        entry: FraudLogEntry,
    },
    FraudAlert {
        record_id: RecordId,
        user_id:   UserId,
        amount:    f64,
        message:   String,
    },
    ClassificationFailed {
        record_id: RecordId,
        attempts:  u32,
        error:     ClassificationError,
    },
    EndOfStream {
        emitted: usize,
    },

    // ── Control ────────────────────────────────────
    PhaseChanged {
        from: SimPhase,
        to:   SimPhase,
    },
    CadenceChanged {
        cadence: Cadence,
    },
    SimulationReset,
}

impl SimEvent {
    /// Stable snake_case name, matching the serde tag.
    pub fn event_type(&self) -> &'static str {
        match self {
            SimEvent::RecordClassified { .. }     => "record_classified",
            SimEvent::FraudLogged { .. }          => "fraud_logged",
            SimEvent::FraudAlert { .. }           => "fraud_alert",
            SimEvent::ClassificationFailed { .. } => "classification_failed",
            SimEvent::EndOfStream { .. }          => "end_of_stream",
            SimEvent::PhaseChanged { .. }         => "phase_changed",
            SimEvent::CadenceChanged { .. }       => "cadence_changed",
            SimEvent::SimulationReset             => "simulation_reset",
        }
    }
}

pub type FeedCallback        = Box<dyn FnMut(&ClassifiedRecord)>;
pub type FraudLogCallback    = Box<dyn FnMut(&FraudLogEntry)>;
pub type EndOfStreamCallback = Box<dyn FnMut(usize)>;
pub type DiagnosticCallback  = Box<dyn FnMut(RecordId, &ClassificationError)>;

/// Callbacks registered per event type.
#[derive(Default)]
pub struct Subscribers {
    feed:          Vec<FeedCallback>,
    fraud_log:     Vec<FraudLogCallback>,
    end_of_stream: Vec<EndOfStreamCallback>,
    diagnostics:   Vec<DiagnosticCallback>,
}

impl Subscribers {
    pub fn add_feed(&mut self, cb: FeedCallback) {
        self.feed.push(cb);
    }

    pub fn add_fraud_log(&mut self, cb: FraudLogCallback) {
        self.fraud_log.push(cb);
    }

    pub fn add_end_of_stream(&mut self, cb: EndOfStreamCallback) {
        self.end_of_stream.push(cb);
    }

    pub fn add_diagnostics(&mut self, cb: DiagnosticCallback) {
        self.diagnostics.push(cb);
    }

    /// Route one event to the callbacks for its type.
    pub fn dispatch(&mut self, event: &SimEvent) {
        match event {
            SimEvent::RecordClassified { record } => {
                self.feed.iter_mut().for_each(|cb| cb(record));
            }
            SimEvent::FraudLogged { entry } => {
                self.fraud_log.iter_mut().for_each(|cb| cb(entry));
            }
            SimEvent::EndOfStream { emitted } => {
                self.end_of_stream.iter_mut().for_each(|cb| cb(*emitted));
            }
            SimEvent::ClassificationFailed { record_id, error, .. } => {
                self.diagnostics.iter_mut().for_each(|cb| cb(*record_id, error));
            }
            _ => {}
        }
    }
}
