//! Plot-ready projections of one user's history.

use crate::{dataset::TransactionRecord, types::RecordId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub record_id: RecordId,
    pub timestamp: NaiveDateTime,
    pub amount:    f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySeries {
    /// Chronological; equal timestamps keep id order.
    pub points:   Vec<SeriesPoint>,
    /// Index into `points` of the selected record, for highlighting.
    pub selected: Option<usize>,
}

pub fn history_series(user_records: &[&TransactionRecord], selected_id: RecordId) -> HistorySeries {
    let mut points: Vec<SeriesPoint> = user_records
        .iter()
        .map(|r| SeriesPoint {
            record_id: r.id,
            timestamp: r.timestamp,
            amount:    r.amount,
        })
        .collect();
    points.sort_by_key(|p| (p.timestamp, p.record_id));

    let selected = points.iter().position(|p| p.record_id == selected_id);
    HistorySeries { points, selected }
}

/// Transaction count per hour of day. Hours with no activity are absent.
pub fn hourly_histogram(user_records: &[&TransactionRecord]) -> BTreeMap<u32, usize> {
    let mut counts = BTreeMap::new();
    for r in user_records {
        *counts.entry(r.hour_of_day).or_insert(0) += 1;
    }
    counts
}
