//! Tabular tree-ensemble model
//!
//! Trees are exported by the training pipeline as JSON:
//!
//! ```json
//! {
//!   "n_features": 50,
//!   "n_classes": 2,
//!   "trees": [
//!     { "nodes": [
//!       { "split": { "feature": 3, "threshold": 0.5, "left": 1, "right": 2 } },
//!       { "leaf": { "value": [8.0, 2.0] } },
//!       { "leaf": { "value": [1.0, 9.0] } }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Leaf values are per-class sample counts (or probabilities); each tree's
//! leaf is normalized and the ensemble averages the per-tree distributions.

use crate::predictor::{InputKind, ModelInput, Predictor};
use apktriage_core::{Error, PredictionUnit, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const NUM_CLASSES: usize = 2;

/// Serialized tree ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestArtifact {
    pub n_features: usize,

    #[serde(default = "default_classes")]
    pub n_classes: usize,

    pub trees: Vec<DecisionTree>,
}

fn default_classes() -> usize {
    NUM_CLASSES
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Go left when `x[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f32>,
    },
}

impl ForestArtifact {
    /// Read and validate an artifact file
    pub fn from_file(path: &Path) -> std::result::Result<Self, String> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let artifact: Self = serde_json::from_str(&contents)
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Structural checks that make traversal total: every child index
    /// points forward, so no walk can cycle or run off the node table.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.n_classes != NUM_CLASSES {
            return Err(format!(
                "expected a binary classifier, artifact has {} classes",
                self.n_classes
            ));
        }
        if self.trees.is_empty() {
            return Err("artifact contains no trees".to_string());
        }

        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(format!("tree {} has no nodes", t));
            }
            for (i, node) in tree.nodes.iter().enumerate() {
                match node {
                    TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        if *feature >= self.n_features {
                            return Err(format!(
                                "tree {} node {} splits on feature {} (n_features = {})",
                                t, i, feature, self.n_features
                            ));
                        }
                        if !threshold.is_finite() {
                            return Err(format!("tree {} node {} has a non-finite threshold", t, i));
                        }
                        for child in [*left, *right] {
                            if child <= i || child >= tree.nodes.len() {
                                return Err(format!(
                                    "tree {} node {} has invalid child index {}",
                                    t, i, child
                                ));
                            }
                        }
                    }
                    TreeNode::Leaf { value } => {
                        if value.len() != self.n_classes {
                            return Err(format!(
                                "tree {} leaf {} has {} class values, expected {}",
                                t,
                                i,
                                value.len(),
                                self.n_classes
                            ));
                        }
                        if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                            return Err(format!("tree {} leaf {} has an invalid value", t, i));
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl DecisionTree {
    /// Normalized class distribution of the leaf `features` lands in
    fn leaf_distribution(&self, features: &[f32]) -> [f32; NUM_CLASSES] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { value } => {
                    let total: f32 = value.iter().sum();
                    if total <= 0.0 {
                        return [0.5, 0.5];
                    }
                    return [value[0] / total, value[1] / total];
                }
            }
        }
    }
}

/// Tree-ensemble classifier over a fixed-width numeric view
pub struct TabularEnsembleModel {
    name: String,
    input_kind: InputKind,
    artifact: ForestArtifact,
}

impl TabularEnsembleModel {
    pub fn new(name: impl Into<String>, input_kind: InputKind, artifact: ForestArtifact) -> Self {
        Self {
            name: name.into(),
            input_kind,
            artifact,
        }
    }

    pub fn n_features(&self) -> usize {
        self.artifact.n_features
    }

    pub fn n_trees(&self) -> usize {
        self.artifact.trees.len()
    }

    /// Averaged class distribution across all trees
    pub fn predict_proba(&self, features: &[f32]) -> [f32; NUM_CLASSES] {
        let mut acc = [0.0f32; NUM_CLASSES];
        for tree in &self.artifact.trees {
            let dist = tree.leaf_distribution(features);
            acc[0] += dist[0];
            acc[1] += dist[1];
        }
        let n = self.artifact.trees.len() as f32;
        [acc[0] / n, acc[1] / n]
    }
}

impl Predictor for TabularEnsembleModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_kind(&self) -> InputKind {
        self.input_kind
    }

    fn predict(&self, input: &ModelInput<'_>) -> Result<PredictionUnit> {
        let features = input.features().ok_or_else(|| {
            Error::inference(&self.name, "tree ensemble requires a numeric input")
        })?;

        if features.len() != self.artifact.n_features {
            return Err(Error::inference(
                &self.name,
                format!(
                    "expected {} features, got {}",
                    self.artifact.n_features,
                    features.len()
                ),
            ));
        }

        let proba = self.predict_proba(features);
        // Ties go to the benign class, matching argmax over [benign, malicious].
        let malicious = proba[1] > proba[0];
        Ok(PredictionUnit::new(&self.name, malicious, Some(proba[1])))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apktriage_core::STATIC_DIM;

    fn stump(n_features: usize) -> ForestArtifact {
        serde_json::from_value(serde_json::json!({
            "n_features": n_features,
            "trees": [
                { "nodes": [
                    { "split": { "feature": 0, "threshold": 0.5, "left": 1, "right": 2 } },
                    { "leaf": { "value": [9.0, 1.0] } },
                    { "leaf": { "value": [1.0, 3.0] } }
                ] },
                { "nodes": [
                    { "leaf": { "value": [0.5, 0.5] } }
                ] }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_predict_follows_splits_and_averages_trees() {
        let artifact = stump(STATIC_DIM);
        artifact.validate().unwrap();
        let model = TabularEnsembleModel::new("APITracker", InputKind::Static, artifact);

        let mut benign = vec![0.0; STATIC_DIM];
        let unit = model.predict(&ModelInput::Static(&benign)).unwrap();
        assert_eq!(unit.label, 0);
        assert!((unit.raw_score.unwrap() - 0.3).abs() < 1e-6);

        benign[0] = 1.0;
        let unit = model.predict(&ModelInput::Static(&benign)).unwrap();
        assert_eq!(unit.label, 1);
        assert!((unit.raw_score.unwrap() - 0.625).abs() < 1e-6);
        assert_eq!(unit.model_name, "APITracker");
    }

    #[test]
    fn test_threshold_is_inclusive_on_left() {
        let model = TabularEnsembleModel::new("APITracker", InputKind::Static, stump(STATIC_DIM));
        let mut x = vec![0.0; STATIC_DIM];
        x[0] = 0.5;
        let unit = model.predict(&ModelInput::Static(&x)).unwrap();
        assert_eq!(unit.label, 0);
    }

    #[test]
    fn test_wrong_width_is_inference_error() {
        let model = TabularEnsembleModel::new("APITracker", InputKind::Static, stump(STATIC_DIM));
        let short = vec![0.0; 10];
        let err = model.predict(&ModelInput::Static(&short)).unwrap_err();
        assert!(matches!(err, Error::Inference { .. }));
        assert!(err.to_string().contains("expected 50 features, got 10"));

        let err = model.predict(&ModelInput::LogText("boot ok")).unwrap_err();
        assert!(matches!(err, Error::Inference { .. }));
    }

    #[test]
    fn test_validation_rejects_cycles_and_bad_features() {
        let mut artifact = stump(STATIC_DIM);
        artifact.trees[0].nodes[0] = TreeNode::Split {
            feature: 0,
            threshold: 0.5,
            left: 0,
            right: 2,
        };
        assert!(artifact.validate().unwrap_err().contains("invalid child index 0"));

        let artifact = stump(0);
        assert!(artifact.validate().unwrap_err().contains("splits on feature 0"));

        let mut artifact = stump(STATIC_DIM);
        artifact.trees.clear();
        assert!(artifact.validate().unwrap_err().contains("no trees"));
    }

    #[test]
    fn test_validation_rejects_malformed_leaf() {
        let mut artifact = stump(STATIC_DIM);
        artifact.trees[1].nodes[0] = TreeNode::Leaf { value: vec![1.0] };
        assert!(artifact.validate().unwrap_err().contains("1 class values"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("forest.json");
        std::fs::write(&path, serde_json::to_string(&stump(STATIC_DIM)).unwrap()).unwrap();

        let artifact = ForestArtifact::from_file(&path).unwrap();
        assert_eq!(artifact.trees.len(), 2);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(ForestArtifact::from_file(&path).unwrap_err().contains("Failed to parse"));
    }
}
