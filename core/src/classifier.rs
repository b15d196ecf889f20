//! Classifier adapter: the single prediction call the engine makes.
//!
//! Models speak their own label convention (an isolation forest says
//! `-1` for anomalous, `1` for normal). The adapter turns that into a
//! plain bool so nothing downstream ever sees a native label.

use crate::error::ClassificationError;

/// Native label returned by the default isolation-forest convention.
pub const DEFAULT_ANOMALY_LABEL: i32 = -1;

/// Number of features the engine feeds a model: `[amount, hour_of_day]`.
pub const FEATURE_COUNT: usize = 2;

/// A pre-trained anomaly model. Prediction must be deterministic.
pub trait AnomalyModel {
    /// Stable name for logs.
    fn name(&self) -> &str;

    /// Predict a native label for one feature vector.
    fn predict(&self, features: &[f64]) -> Result<i32, ClassificationError>;
}

pub struct ClassifierAdapter {
    model:         Box<dyn AnomalyModel>,
    anomaly_label: i32,
}

impl ClassifierAdapter {
    pub fn new(model: Box<dyn AnomalyModel>) -> Self {
        Self { model, anomaly_label: DEFAULT_ANOMALY_LABEL }
    }

    /// Override the native label that means "anomalous".
    pub fn with_anomaly_label(mut self, label: i32) -> Self {
        self.anomaly_label = label;
        self
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Returns `true` when the model flags the transaction as anomalous.
    pub fn classify(&self, amount: f64, hour_of_day: u32) -> Result<bool, ClassificationError> {
        let features = [amount, f64::from(hour_of_day)];
        if let Some(index) = features.iter().position(|v| !v.is_finite()) {
            return Err(ClassificationError::NonFiniteFeature { index });
        }
        let label = self.model.predict(&features)?;
        Ok(label == self.anomaly_label)
    }
}
