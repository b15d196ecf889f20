//! Rule-based reasons for flagged transactions.
//!
//! Rules are checked in priority order and the first match wins:
//!   1. no normal history for the user
//!   2. amount more than 5x the user's normal average
//!   3. transaction between 01:00 and 06:59
//!   4. generic deviation

use crate::{
    analytics::UserSummary,
    dataset::TransactionRecord,
    event::ClassifiedRecord,
};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const AMOUNT_SPIKE_MULTIPLIER: f64 = 5.0;
pub const UNUSUAL_HOURS: std::ops::RangeInclusive<u32> = 1..=6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum FraudReason {
    NoNormalHistory,
    /// `None` when the normal average is zero and the increase is unbounded.
    AmountSpike { percent_increase: Option<i64> },
    UnusualHour { hour: u32 },
    PatternDeviation,
}

impl FraudReason {
    pub fn evaluate(record: &TransactionRecord, summary: &UserSummary) -> Self {
        let Some(average) = summary.normal_average_amount else {
            return Self::NoNormalHistory;
        };

        if record.amount > AMOUNT_SPIKE_MULTIPLIER * average {
            return Self::AmountSpike { percent_increase: percent_increase(record.amount, average) };
        }

        if UNUSUAL_HOURS.contains(&record.hour_of_day) {
            return Self::UnusualHour { hour: record.hour_of_day };
        }

        Self::PatternDeviation
    }
}

/// Whole-percent increase over `average`, ties rounded to even.
fn percent_increase(amount: f64, average: f64) -> Option<i64> {
    if average <= 0.0 {
        return None;
    }
    Some(((amount / average - 1.0) * 100.0).round_ties_even() as i64)
}

impl fmt::Display for FraudReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoNormalHistory => {
                write!(f, "No normal transaction history exists for this user.")
            }
            Self::AmountSpike { percent_increase: Some(percent) } => {
                write!(f, "Amount is {percent}% higher than user's average.")
            }
            Self::AmountSpike { percent_increase: None } => {
                write!(f, "Amount is inf% higher than user's average.")
            }
            Self::UnusualHour { hour } => {
                write!(f, "Transaction occurred at an unusual time ({hour}:00).")
            }
            Self::PatternDeviation => {
                write!(f, "Transaction pattern deviates from user's normal behavior.")
            }
        }
    }
}

/// Reason for a classified record, or `None` if it was not flagged.
pub fn explain(record: &ClassifiedRecord, summary: &UserSummary) -> Option<FraudReason> {
    record
        .predicted_fraud
        .then(|| FraudReason::evaluate(&record.record, summary))
}
