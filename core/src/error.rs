use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fatal startup failures while building a `Dataset`.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Required column '{column}' is missing")]
    MissingColumn { column: &'static str },

    #[error("Row {row}: cannot parse timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },

    #[error("Row {row}: invalid amount '{value}'")]
    InvalidAmount { row: usize, value: String },

    #[error("Row {row}: invalid fraud label '{value}'")]
    InvalidLabel { row: usize, value: String },

    #[error("Row {row}: empty user_id")]
    EmptyUserId { row: usize },
}

/// A single prediction call failed. Never fatal to the run.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassificationError {
    #[error("Feature vector has {actual} values, model expects {expected}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("Feature {index} is not a finite number")]
    NonFiniteFeature { index: usize },

    #[error("Model error: {message}")]
    Model { message: String },
}

/// Failures while loading a serialized anomaly model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid model: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type SimResult<T> = Result<T, SimError>;
