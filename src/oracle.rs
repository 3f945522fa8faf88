/// Prediction oracle: the pre-trained water level model.
///
/// The model is trained elsewhere and exported as a JSON artifact. This
/// module only loads it and evaluates it; callers see a single
/// [`Predictor::predict`] returning one `f64` per feature row.
///
/// ## Artifact format
///
/// ```json
/// { "kind": "random_forest",
///   "n_features": 5,
///   "trees": [ { "nodes": [
///       { "feature": 3, "threshold": 9.0, "left": 1, "right": 2 },
///       { "value": 2.1 },
///       { "value": 3.4 } ] } ] }
/// ```
///
/// or
///
/// ```json
/// { "kind": "linear", "coefficients": [0.0, 0.0, 0.0, 0.3, 0.5], "intercept": 0.1 }
/// ```
///
/// Forest splits send a row left when `x[feature] <= threshold`; the forest
/// predicts the mean of its trees.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::logging::{self, Component};
use crate::model::FloodError;

// ---------------------------------------------------------------------------
// Predictor trait
// ---------------------------------------------------------------------------

/// A regression model: feature row in, water level out.
pub trait Predictor: Send + Sync + std::fmt::Debug {
    fn predict(&self, features: &[f64]) -> Result<f64, FloodError>;

    /// Number of features the model expects, when it declares one.
    fn feature_count(&self) -> Option<usize> {
        None
    }
}

// ---------------------------------------------------------------------------
// Artifact structures
// ---------------------------------------------------------------------------

/// One node of a regression tree. Untagged: splits carry `feature`, leaves `value`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegressionTree {
    /// Node 0 is the root.
    pub nodes: Vec<TreeNode>,
}

impl RegressionTree {
    fn evaluate(&self, features: &[f64]) -> Result<f64, FloodError> {
        let mut index = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..self.nodes.len() {
            match &self.nodes[index] {
                TreeNode::Leaf { value } => return Ok(*value),
                TreeNode::Split { feature, threshold, left, right } => {
                    index = if features[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
        Err(FloodError::Model("tree walk did not reach a leaf (cycle in artifact)".into()))
    }

    fn validate(&self, tree_index: usize, n_features: usize) -> Result<(), FloodError> {
        if self.nodes.is_empty() {
            return Err(FloodError::Model(format!("tree {} has no nodes", tree_index)));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { feature, left, right, threshold } = node {
                if *feature >= n_features {
                    return Err(FloodError::Model(format!(
                        "tree {} node {} splits on feature {} but the model has {} features",
                        tree_index, i, feature, n_features
                    )));
                }
                if *left >= self.nodes.len() || *right >= self.nodes.len() {
                    return Err(FloodError::Model(format!(
                        "tree {} node {} points outside the tree",
                        tree_index, i
                    )));
                }
                if !threshold.is_finite() {
                    return Err(FloodError::Model(format!(
                        "tree {} node {} has a non-finite threshold",
                        tree_index, i
                    )));
                }
            }
        }
        Ok(())
    }
}

/// A loaded model artifact.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressionModel {
    Linear {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    RandomForest {
        n_features: usize,
        trees: Vec<RegressionTree>,
    },
}

impl RegressionModel {
    /// Loads and validates a model artifact.
    pub fn load(path: &Path) -> Result<Self, FloodError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            FloodError::Model(format!("failed to read model artifact {}: {}", path.display(), e))
        })?;
        let model = Self::from_json(&contents).map_err(|e| match e {
            FloodError::Model(msg) => FloodError::Model(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;

        logging::info(
            Component::Model,
            &format!("Loaded {} from {}", model.describe(), path.display()),
        );
        Ok(model)
    }

    /// Parses and validates a model artifact held in memory.
    pub fn from_json(contents: &str) -> Result<Self, FloodError> {
        let model: RegressionModel = serde_json::from_str(contents)
            .map_err(|e| FloodError::Model(format!("incompatible model artifact: {}", e)))?;
        model.validate()?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), FloodError> {
        match self {
            RegressionModel::Linear { coefficients, intercept } => {
                if coefficients.is_empty() {
                    return Err(FloodError::Model("linear model has no coefficients".into()));
                }
                if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
                    return Err(FloodError::Model("linear model has non-finite weights".into()));
                }
            }
            RegressionModel::RandomForest { n_features, trees } => {
                if *n_features == 0 {
                    return Err(FloodError::Model("forest declares zero features".into()));
                }
                if trees.is_empty() {
                    return Err(FloodError::Model("forest has no trees".into()));
                }
                for (i, tree) in trees.iter().enumerate() {
                    tree.validate(i, *n_features)?;
                }
            }
        }
        Ok(())
    }

    /// One-line summary for startup logs.
    pub fn describe(&self) -> String {
        match self {
            RegressionModel::Linear { coefficients, .. } => {
                format!("linear model ({} features)", coefficients.len())
            }
            RegressionModel::RandomForest { n_features, trees } => {
                format!("random forest ({} trees, {} features)", trees.len(), n_features)
            }
        }
    }

    fn expected_features(&self) -> usize {
        match self {
            RegressionModel::Linear { coefficients, .. } => coefficients.len(),
            RegressionModel::RandomForest { n_features, .. } => *n_features,
        }
    }
}

impl Predictor for RegressionModel {
    fn predict(&self, features: &[f64]) -> Result<f64, FloodError> {
        let expected = self.expected_features();
        if features.len() != expected {
            return Err(FloodError::Model(format!(
                "model expects {} features, got {}",
                expected,
                features.len()
            )));
        }
        if let Some(pos) = features.iter().position(|f| !f.is_finite()) {
            return Err(FloodError::Model(format!("feature {} is not a finite number", pos)));
        }

        match self {
            RegressionModel::Linear { coefficients, intercept } => Ok(coefficients
                .iter()
                .zip(features)
                .map(|(c, x)| c * x)
                .sum::<f64>()
                + intercept),
            RegressionModel::RandomForest { trees, .. } => {
                let mut total = 0.0;
                for tree in trees {
                    total += tree.evaluate(features)?;
                }
                Ok(total / trees.len() as f64)
            }
        }
    }

    fn feature_count(&self) -> Option<usize> {
        Some(self.expected_features())
    }
}
