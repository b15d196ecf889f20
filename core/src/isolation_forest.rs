//! Pre-trained isolation forest, deserialized from JSON.
//!
//! The forest is exported once by the training pipeline and only ever
//! scored here. Scoring follows the usual isolation-forest definition:
//! a point isolated in few splits is anomalous.
//!
//! Native labels: `-1` anomalous, `1` normal.

use crate::{
    classifier::{AnomalyModel, FEATURE_COUNT},
    error::{ClassificationError, ModelError},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

pub const LABEL_ANOMALY: i32 = -1;
pub const LABEL_NORMAL:  i32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature:   usize,
        threshold: f64,
        left:      usize,
        right:     usize,
    },
    Leaf {
        n_samples: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    /// Node 0 is the root. Children always sit after their parent.
    pub nodes: Vec<TreeNode>,
}

impl IsolationTree {
    fn validate(&self, tree_idx: usize, n_features: usize) -> Result<(), ModelError> {
        if self.nodes.is_empty() {
            return Err(ModelError::Invalid(format!("tree {tree_idx} has no nodes")));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { feature, threshold, left, right } = *node {
                if feature >= n_features {
                    return Err(ModelError::Invalid(format!(
                        "tree {tree_idx} node {idx}: feature {feature} out of range"
                    )));
                }
                if !threshold.is_finite() {
                    return Err(ModelError::Invalid(format!(
                        "tree {tree_idx} node {idx}: non-finite threshold"
                    )));
                }
                for child in [left, right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(ModelError::Invalid(format!(
                            "tree {tree_idx} node {idx}: bad child index {child}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Edges walked to reach a leaf, plus the expected remaining depth
    /// of the samples that leaf still holds.
    fn path_length(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        let mut depth = 0.0;
        loop {
            match self.nodes[idx] {
                TreeNode::Split { feature, threshold, left, right } => {
                    idx = if x[feature] <= threshold { left } else { right };
                    depth += 1.0;
                }
                TreeNode::Leaf { n_samples } => return depth + average_path_length(n_samples),
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    pub n_features:  usize,
    pub max_samples: usize,
    /// Decision offset: scores below it are anomalous.
    pub offset:      f64,
    pub trees:       Vec<IsolationTree>,
}

impl IsolationForest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let forest: IsolationForest = serde_json::from_str(json)?;
        forest.validate()?;
        log::info!(
            "Isolation forest loaded: {} trees, max_samples={}",
            forest.trees.len(),
            forest.max_samples
        );
        Ok(forest)
    }

    fn validate(&self) -> Result<(), ModelError> {
        if self.n_features != FEATURE_COUNT {
            return Err(ModelError::Invalid(format!(
                "expected {FEATURE_COUNT} features, model has {}",
                self.n_features
            )));
        }
        if self.max_samples == 0 {
            return Err(ModelError::Invalid("max_samples must be positive".into()));
        }
        if self.trees.is_empty() {
            return Err(ModelError::Invalid("forest has no trees".into()));
        }
        if !self.offset.is_finite() {
            return Err(ModelError::Invalid("offset must be finite".into()));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(i, self.n_features)?;
        }
        Ok(())
    }

    /// Anomaly score in `[-1, 0)`. Lower is more anomalous.
    pub fn score(&self, x: &[f64]) -> Result<f64, ClassificationError> {
        if x.len() != self.n_features {
            return Err(ClassificationError::ShapeMismatch {
                expected: self.n_features,
                actual:   x.len(),
            });
        }
        let total: f64 = self.trees.iter().map(|t| t.path_length(x)).sum();
        let mean_path = total / self.trees.len() as f64;
        let norm = average_path_length(self.max_samples);
        if norm == 0.0 {
            // A single-sample forest cannot isolate anything.
            return Ok(-1.0);
        }
        Ok(-(2f64.powf(-mean_path / norm)))
    }
}

impl AnomalyModel for IsolationForest {
    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn predict(&self, features: &[f64]) -> Result<i32, ClassificationError> {
        let score = self.score(features)?;
        Ok(if score - self.offset < 0.0 { LABEL_ANOMALY } else { LABEL_NORMAL })
    }
}

/// Average path length of an unsuccessful BST search over `n` samples.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}
