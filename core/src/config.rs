use crate::{classifier::DEFAULT_ANOMALY_LABEL, clock::Cadence};
use serde::{Deserialize, Serialize};

/// What a tick does when the classifier fails on its record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPolicy {
    /// Drop the record from the feed and advance.
    #[default]
    Skip,
    /// Try again up to `attempts` more times, then skip.
    Retry { attempts: u32 },
}

impl ClassificationPolicy {
    pub fn max_attempts(self) -> u32 {
        match self {
            ClassificationPolicy::Skip => 1,
            ClassificationPolicy::Retry { attempts } => attempts.saturating_add(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default = "default_dataset_path")]
    pub dataset_path:          String,
    #[serde(default = "default_model_path")]
    pub model_path:            String,
    #[serde(default = "default_cadence")]
    pub cadence:               Cadence,
    #[serde(default = "default_autoplay")]
    pub autoplay:              bool,
    #[serde(default = "default_anomaly_label")]
    pub anomaly_label:         i32,
    #[serde(default)]
    pub classification_policy: ClassificationPolicy,
}

fn default_dataset_path() -> String {
    "upi_transactions.csv".to_string()
}

fn default_model_path() -> String {
    "fraud_model.json".to_string()
}

fn default_cadence() -> Cadence {
    Cadence::Normal
}

fn default_autoplay() -> bool {
    true
}

fn default_anomaly_label() -> i32 {
    DEFAULT_ANOMALY_LABEL
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            dataset_path:          default_dataset_path(),
            model_path:            default_model_path(),
            cadence:               default_cadence(),
            autoplay:              default_autoplay(),
            anomaly_label:         default_anomaly_label(),
            classification_policy: ClassificationPolicy::default(),
        }
    }
}

impl SentinelConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: SentinelConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> Self {
        Self {
            dataset_path: "test_transactions.csv".into(),
            model_path:   "test_model.json".into(),
            ..Self::default()
        }
    }
}
