//! Transaction replay sentinel: replays a historical transaction log as a
//! live feed, classifies each record with a pre-trained anomaly model, and
//! explains flagged records from per-user analytics.

pub mod analytics;
pub mod classifier;
pub mod clock;
pub mod command;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod event;
pub mod explanation;
pub mod isolation_forest;
pub mod series;
pub mod types;
