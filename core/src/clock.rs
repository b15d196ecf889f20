//! Simulation clock: owns virtual time, phase, cadence, and the single
//! pending tick deadline.
//!
//! At most one tick is ever scheduled. Cancelling clears the deadline,
//! so a cancelled tick can never fire.

use crate::types::Millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Fast,   // 200 ms between records
    Normal, // 1000 ms
    Slow,   // 2500 ms
}

impl Cadence {
    pub fn interval_ms(self) -> Millis {
        match self {
            Cadence::Fast   => 200,
            Cadence::Normal => 1000,
            Cadence::Slow   => 2500,
        }
    }

    /// Map a 0..=2 speed-slider position onto a cadence.
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Cadence::Fast),
            1 => Some(Cadence::Normal),
            2 => Some(Cadence::Slow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SimPhase {
    /// Constructed, not yet ticking.
    Idle,
    Playing,
    Paused,
    /// Dataset exhausted. Only `reset()` leaves this state.
    Ended,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimClock {
    pub now:      Millis,
    pub phase:    SimPhase,
    pub cadence:  Cadence,
    next_tick_at: Option<Millis>,
}

impl SimClock {
    pub fn new(cadence: Cadence) -> Self {
        Self {
            now: 0,
            phase: SimPhase::Idle,
            cadence,
            next_tick_at: None,
        }
    }

    pub fn next_tick_at(&self) -> Option<Millis> {
        self.next_tick_at
    }

    /// Schedule the next tick one interval from now, replacing any
    /// pending deadline.
    pub fn schedule(&mut self) {
        self.next_tick_at = Some(self.now + self.cadence.interval_ms());
    }

    pub fn cancel(&mut self) {
        self.next_tick_at = None;
    }

    /// If a tick is due at or before `target`, move time to its deadline,
    /// consume it, and return the fire time.
    pub fn take_due(&mut self, target: Millis) -> Option<Millis> {
        match self.next_tick_at {
            Some(due) if due <= target => {
                self.now = due.max(self.now);
                self.next_tick_at = None;
                Some(self.now)
            }
            _ => None,
        }
    }

    /// Move time forward without firing anything. Never moves backwards.
    pub fn settle(&mut self, target: Millis) {
        self.now = self.now.max(target);
    }
}
