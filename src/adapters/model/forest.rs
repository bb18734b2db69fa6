//! Random forest exported as flattened decision trees.
//!
//! Each tree uses sklearn's `tree_` array layout: node `i` is a leaf when
//! `children_left[i] == -1`; otherwise a row goes left when
//! `row[feature[i]] <= threshold[i]`. `value[i]` holds the class weights
//! `[no PE, PE]` at the node.

use serde::{Deserialize, Serialize};

use crate::domain::FeatureSchema;
use crate::{PeRiskError, Result};

const LEAF: i64 = -1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    pub value: Vec<[f64; 2]>,
}

impl DecisionTree {
    fn n_nodes(&self) -> usize {
        self.children_left.len()
    }

    /// Check array shapes and node links.
    ///
    /// Children must point forward (`child > node`), which also rules out cycles.
    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        let n = self.n_nodes();
        if n == 0 {
            return Err("tree has no nodes".into());
        }
        if self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
            || self.value.len() != n
        {
            return Err("node array lengths differ".into());
        }

        for node in 0..n {
            let (left, right) = (self.children_left[node], self.children_right[node]);
            if left == LEAF {
                if right != LEAF {
                    return Err(format!("node {node} has only a right child"));
                }
                let [a, b] = self.value[node];
                if !(a >= 0.0 && b >= 0.0 && a + b > 0.0) {
                    return Err(format!("leaf {node} has invalid class weights"));
                }
                continue;
            }

            for child in [left, right] {
                if child <= node as i64 || child >= n as i64 {
                    return Err(format!("node {node} links to invalid child {child}"));
                }
            }
            let feature = self.feature[node];
            if feature < 0 || feature as usize >= n_features {
                return Err(format!("node {node} splits on invalid feature {feature}"));
            }
            if self.threshold[node].is_nan() {
                return Err(format!("node {node} has NaN threshold"));
            }
        }
        Ok(())
    }

    /// Fraction of PE weight at the leaf reached by `row`.
    fn predict(&self, row: &[f64]) -> f64 {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            let x = row[self.feature[node] as usize];
            node = if x <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        let [no_pe, pe] = self.value[node];
        pe / (no_pe + pe)
    }
}

/// Averaged ensemble of decision trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestModel {
    pub feature_names: FeatureSchema,
    pub trees: Vec<DecisionTree>,
}

impl ForestModel {
    /// # Errors
    /// Returns `PeRiskError::Artifact` naming the first malformed tree.
    pub fn validate(&self) -> Result<()> {
        if self.trees.is_empty() {
            return Err(PeRiskError::Artifact("random forest has no trees".into()));
        }
        let n_features = self.feature_names.len();
        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate(n_features)
                .map_err(|e| PeRiskError::Artifact(format!("tree {i}: {e}")))?;
        }
        Ok(())
    }

    /// Mean of per-tree leaf probabilities, as sklearn's `predict_proba`.
    #[must_use]
    pub fn probability(&self, row: &[f64]) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(row)).sum();
        sum / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stump on feature `f`: `x <= t` -> left leaf weights, else right.
    fn stump(f: i64, t: f64, left: [f64; 2], right: [f64; 2]) -> DecisionTree {
        DecisionTree {
            children_left: vec![1, -1, -1],
            children_right: vec![2, -1, -1],
            feature: vec![f, -2, -2],
            threshold: vec![t, -2.0, -2.0],
            value: vec![[1.0, 1.0], left, right],
        }
    }

    fn forest() -> ForestModel {
        ForestModel {
            feature_names: FeatureSchema::new(vec!["SII".into(), "FIB4".into()]).unwrap(),
            trees: vec![
                stump(0, 500.0, [9.0, 1.0], [2.0, 8.0]),
                stump(1, 1.0, [3.0, 1.0], [1.0, 3.0]),
            ],
        }
    }

    #[test]
    fn test_forest_averages_leaf_fractions() {
        let m = forest();
        m.validate().expect("valid");
        // tree0: 400 <= 500 -> 0.1; tree1: 1.2 > 1.0 -> 0.75
        assert!((m.probability(&[400.0, 1.2]) - 0.425).abs() < 1e-12);
        // threshold is inclusive on the left
        assert!((m.probability(&[500.0, 1.0]) - 0.175).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_backward_links() {
        let mut m = forest();
        m.trees[0].children_left[0] = 0;
        let err = m.validate().expect_err("cycle");
        assert!(err.to_string().contains("tree 0"));
    }

    #[test]
    fn test_validate_rejects_out_of_range_feature() {
        let mut m = forest();
        m.trees[1].feature[0] = 5;
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_leaf() {
        let mut m = forest();
        m.trees[0].value[1] = [0.0, 0.0];
        assert!(m.validate().is_err());
    }
}
