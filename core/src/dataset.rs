//! Transaction dataset: parsing the source table into immutable records.
//!
//! Records keep file row order and are never re-sorted. A record's `id`
//! is its 0-based data-row position and stays stable for the whole run.

use crate::{
    error::LoadError,
    types::{RecordId, UserId},
};
use chrono::{DateTime, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;

pub const COL_TIMESTAMP: &str = "timestamp";
pub const COL_USER_ID:   &str = "user_id";
pub const COL_AMOUNT:    &str = "amount";
pub const COL_IS_FRAUD:  &str = "is_fraud";

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// One row of input before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub timestamp:          NaiveDateTime,
    pub user_id:            UserId,
    pub amount:             f64,
    pub ground_truth_fraud: bool,
}

/// An immutable loaded transaction.
///
/// Always built through [`TransactionRecord::new`], which derives
/// `hour_of_day` from `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id:                 RecordId,
    pub timestamp:          NaiveDateTime,
    pub user_id:            UserId,
    pub amount:             f64,
    pub hour_of_day:        u32,
    /// Source label. Used for analytics only, never fed to the classifier.
    pub ground_truth_fraud: bool,
}

impl TransactionRecord {
    pub fn new(id: RecordId, raw: RawTransaction) -> Self {
        Self {
            id,
            hour_of_day:        raw.timestamp.hour(),
            timestamp:          raw.timestamp,
            user_id:            raw.user_id,
            amount:             raw.amount,
            ground_truth_fraud: raw.ground_truth_fraud,
        }
    }
}

impl fmt::Display for TransactionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Time: {} | User: {} | Amount: ₹{:.2}",
            self.timestamp.format("%Y-%m-%d %H:%M"),
            self.user_id,
            self.amount
        )
    }
}

/// The full replay source, in file order. Immutable after load.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<TransactionRecord>,
    by_id:   HashMap<RecordId, usize>,
    by_user: HashMap<UserId, Vec<usize>>,
}

impl Dataset {
    /// Build from already-parsed rows. Ids are assigned by position.
    pub fn from_records(rows: Vec<RawTransaction>) -> Result<Self, LoadError> {
        let mut records = Vec::with_capacity(rows.len());
        for (row, raw) in rows.into_iter().enumerate() {
            validate_amount(row, raw.amount)?;
            if raw.user_id.is_empty() {
                return Err(LoadError::EmptyUserId { row });
            }
            records.push(TransactionRecord::new(row, raw));
        }
        Ok(Self::index(records))
    }

    /// Load a CSV file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let file = std::fs::File::open(path.as_ref())?;
        Self::from_reader(file)
    }

    pub fn from_csv_str(csv_data: &str) -> Result<Self, LoadError> {
        Self::from_reader(csv_data.as_bytes())
    }

    /// Parse a CSV source with a header row.
    ///
    /// Required columns are matched by name; extra columns are ignored.
    /// Nothing is returned unless every row parses.
    pub fn from_reader<R: Read>(source: R) -> Result<Self, LoadError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(source);

        let headers = reader.headers()?.clone();
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or(LoadError::MissingColumn { column: name })
        };
        let ts_col     = column(COL_TIMESTAMP)?;
        let user_col   = column(COL_USER_ID)?;
        let amount_col = column(COL_AMOUNT)?;
        let label_col  = column(COL_IS_FRAUD)?;

        let mut rows = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let record = result?;
            let field = |idx: usize| record.get(idx).unwrap_or("");

            let ts_raw = field(ts_col);
            let timestamp = parse_timestamp(ts_raw).ok_or_else(|| LoadError::InvalidTimestamp {
                row,
                value: ts_raw.to_string(),
            })?;

            let amount_raw = field(amount_col);
            let amount: f64 = amount_raw.parse().map_err(|_| LoadError::InvalidAmount {
                row,
                value: amount_raw.to_string(),
            })?;

            let label_raw = field(label_col);
            let ground_truth_fraud = parse_label(label_raw).ok_or_else(|| LoadError::InvalidLabel {
                row,
                value: label_raw.to_string(),
            })?;

            rows.push(RawTransaction {
                timestamp,
                user_id: field(user_col).to_string(),
                amount,
                ground_truth_fraud,
            });
        }

        let dataset = Self::from_records(rows)?;
        log::info!(
            "Loaded {} transactions for {} users",
            dataset.len(),
            dataset.user_count()
        );
        Ok(dataset)
    }

    fn index(records: Vec<TransactionRecord>) -> Self {
        let mut by_id = HashMap::with_capacity(records.len());
        let mut by_user: HashMap<UserId, Vec<usize>> = HashMap::new();
        for (pos, r) in records.iter().enumerate() {
            by_id.insert(r.id, pos);
            by_user.entry(r.user_id.clone()).or_default().push(pos);
        }
        Self { records, by_id, by_user }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.by_user.len()
    }

    /// Record at replay position `pos`.
    pub fn get(&self, pos: usize) -> Option<&TransactionRecord> {
        self.records.get(pos)
    }

    pub fn by_id(&self, id: RecordId) -> Option<&TransactionRecord> {
        self.by_id.get(&id).and_then(|&pos| self.records.get(pos))
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    /// Every record for `user_id`, in file order. Empty for unknown users.
    pub fn user_records(&self, user_id: &str) -> Vec<&TransactionRecord> {
        self.by_user
            .get(user_id)
            .map(|positions| positions.iter().map(|&p| &self.records[p]).collect())
            .unwrap_or_default()
    }
}

fn validate_amount(row: usize, amount: f64) -> Result<(), LoadError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(LoadError::InvalidAmount { row, value: amount.to_string() })
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

fn parse_label(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "0" | "0.0" | "false" => Some(false),
        "1" | "1.0" | "true"  => Some(true),
        _ => None,
    }
}
