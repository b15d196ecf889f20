//! Per-user aggregate statistics, computed on demand.
//!
//! Nothing here is cached: every call walks the user's records again.
//! Statistics cover the whole dataset, including records the replay has
//! not reached yet.

use crate::{dataset::Dataset, types::UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id:                 UserId,
    /// Mean amount over records labelled normal. `None` when the user
    /// has no normal history at all.
    pub normal_average_amount:   Option<f64>,
    pub total_transaction_count: usize,
}

pub fn summarize(dataset: &Dataset, user_id: &str) -> UserSummary {
    let records = dataset.user_records(user_id);

    let (normal_sum, normal_count) = records
        .iter()
        .filter(|r| !r.ground_truth_fraud)
        .fold((0.0, 0usize), |(sum, n), r| (sum + r.amount, n + 1));

    let normal_average_amount = if normal_count == 0 {
        None
    } else {
        Some(normal_sum / normal_count as f64)
    };

    UserSummary {
        user_id: user_id.to_string(),
        normal_average_amount,
        total_transaction_count: records.len(),
    }
}
