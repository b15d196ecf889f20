use serde::{Deserialize, Serialize};

use crate::clock::Cadence;

/// Control calls a front-end can issue, in serializable form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ControlCommand {
    Play,
    Pause,
    Resume,
    /// Pause when playing, resume when paused.
    TogglePause,
    Reset,
    SetSpeed { cadence: Cadence },
}
