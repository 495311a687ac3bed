//! Tree ensemble exported as flat node arrays
//!
//! Each tree stores its nodes the way scikit-learn's `tree_` attribute
//! does: parallel arrays indexed by node id, `-1` children marking leaves,
//! and per-node class weights in `value`. The ensemble prediction is the
//! mean of each tree's normalized leaf distribution.

use crate::InferenceError;
use serde::{Deserialize, Serialize};
use std::path::Path;

const LEAF: i64 = -1;

/// Anything that maps a scaled feature vector to class probabilities
pub trait ProbabilityModel: Send + Sync {
    /// One probability per model class, in metadata class order
    fn predict_proba(&self, input: &[f64]) -> Result<Vec<f64>, InferenceError>;
}

/// A single fitted decision tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Class weights per node
    pub value: Vec<Vec<f64>>,
}

impl DecisionTree {
    fn node_count(&self) -> usize {
        self.children_left.len()
    }

    fn validate(&self, n_classes: usize, n_features: usize) -> Result<(), InferenceError> {
        let n = self.node_count();
        if n == 0 {
            return Err(InferenceError::ModelLoadError("empty tree".to_string()));
        }
        if self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
            || self.value.len() != n
        {
            return Err(InferenceError::ModelLoadError(
                "tree node arrays differ in length".to_string(),
            ));
        }
        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                if self.value[node].len() != n_classes {
                    return Err(InferenceError::ModelLoadError(format!(
                        "leaf {} has {} class weights, expected {}",
                        node,
                        self.value[node].len(),
                        n_classes
                    )));
                }
                continue;
            }
            let in_range = |child: i64| child > 0 && (child as usize) < n;
            if !in_range(left) || !in_range(right) {
                return Err(InferenceError::ModelLoadError(format!(
                    "node {} has invalid children ({}, {})",
                    node, left, right
                )));
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(InferenceError::ModelLoadError(format!(
                    "node {} splits on feature {} of {}",
                    node, feature, n_features
                )));
            }
        }
        Ok(())
    }

    /// Normalized class distribution of the leaf `input` lands in
    fn leaf_distribution(&self, input: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let mut node = 0usize;
        // a valid tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..=self.node_count() {
            let left = self.children_left[node];
            if left == LEAF {
                let weights = &self.value[node];
                let total: f64 = weights.iter().sum();
                if total <= 0.0 {
                    return Ok(vec![1.0 / weights.len() as f64; weights.len()]);
                }
                return Ok(weights.iter().map(|w| w / total).collect());
            }
            let feature = self.feature[node] as usize;
            // splits were fitted on float32 inputs
            let x = input[feature] as f32 as f64;
            node = if x <= self.threshold[node] {
                left as usize
            } else {
                self.children_right[node] as usize
            };
        }
        Err(InferenceError::InferenceFailed("tree traversal did not terminate".to_string()))
    }
}

/// Averaging ensemble of [`DecisionTree`]s
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub n_classes: usize,
    pub trees: Vec<DecisionTree>,
}

impl TreeEnsemble {
    /// Load from JSON and validate against the expected input width
    pub fn load(path: &Path, n_features: usize) -> Result<Self, InferenceError> {
        let raw = std::fs::read_to_string(path)?;
        let ensemble: TreeEnsemble = serde_json::from_str(&raw)
            .map_err(|e| InferenceError::ModelLoadError(e.to_string()))?;
        ensemble.validate(n_features)?;
        Ok(ensemble)
    }

    pub fn validate(&self, n_features: usize) -> Result<(), InferenceError> {
        if self.trees.is_empty() || self.n_classes == 0 {
            return Err(InferenceError::ModelLoadError("empty ensemble".to_string()));
        }
        for tree in &self.trees {
            tree.validate(self.n_classes, n_features)?;
        }
        Ok(())
    }
}

impl ProbabilityModel for TreeEnsemble {
    fn predict_proba(&self, input: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let mut sum = vec![0.0; self.n_classes];
        for tree in &self.trees {
            let dist = tree.leaf_distribution(input)?;
            for (acc, p) in sum.iter_mut().zip(dist) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        Ok(sum.into_iter().map(|p| p / n).collect())
    }
}
