//! Shared primitive types used across the entire engine.

/// Stable identifier of a loaded record: its original data-row position.
pub type RecordId = usize;

/// The user a transaction belongs to.
pub type UserId = String;

/// Virtual simulation time in milliseconds.
pub type Millis = u64;
