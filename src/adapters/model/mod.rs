//! Model artifact adapter: Implementation of RiskModel for exported models.
//!
//! The training pipeline exports a single JSON document tagged by `kind`,
//! carrying the fitted parameters together with the ordered feature schema the
//! model was fit on.
//!
//! ```json
//! { "kind": "logistic_regression",
//!   "feature_names": ["WBC", "N", ...],
//!   "coefficients": [...], "intercept": -1.2,
//!   "scaler_mean": [...], "scaler_scale": [...] }
//!
//! { "kind": "random_forest",
//!   "feature_names": ["WBC", "N", ...],
//!   "trees": [{ "children_left": [...], "children_right": [...],
//!               "feature": [...], "threshold": [...], "value": [[n0, n1], ...] }] }
//! ```

mod forest;
mod logistic;
pub mod manifest;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use forest::{DecisionTree, ForestModel};
pub use logistic::LogisticModel;
pub use manifest::{Manifest, ManifestPolicy};

use crate::domain::{FeatureMatrix, FeatureSchema};
use crate::ports::RiskModel;
use crate::{PeRiskError, Result};

/// File name looked up when the model path is a directory.
pub const MODEL_FILE_NAME: &str = "model.json";

/// An exported classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    LogisticRegression(LogisticModel),
    RandomForest(ForestModel),
}

impl ModelArtifact {
    /// Parse and validate an exported model document.
    ///
    /// # Errors
    /// Returns `PeRiskError::Artifact` if the document is malformed or its
    /// parameters disagree with its schema.
    pub fn from_json(json: &str) -> Result<Self> {
        let model: Self = serde_json::from_str(json)
            .map_err(|e| PeRiskError::Artifact(format!("cannot parse model document: {e}")))?;
        model.validate()?;
        Ok(model)
    }

    /// # Errors
    /// Returns `PeRiskError::Artifact` describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::LogisticRegression(m) => m.validate(),
            Self::RandomForest(m) => m.validate(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LogisticRegression(_) => "logistic_regression",
            Self::RandomForest(_) => "random_forest",
        }
    }

    fn probability(&self, row: &[f64]) -> f64 {
        match self {
            Self::LogisticRegression(m) => m.probability(row),
            Self::RandomForest(m) => m.probability(row),
        }
    }
}

impl RiskModel for ModelArtifact {
    fn name(&self) -> &str {
        self.kind()
    }

    fn schema(&self) -> &FeatureSchema {
        match self {
            Self::LogisticRegression(m) => &m.feature_names,
            Self::RandomForest(m) => &m.feature_names,
        }
    }

    fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Vec<[f64; 2]>> {
        let expected = self.schema().len();
        if matrix.n_cols() != expected {
            return Err(PeRiskError::SchemaMismatch {
                expected,
                actual: matrix.n_cols(),
            });
        }

        Ok(matrix
            .rows()
            .iter()
            .map(|row| {
                let p = self.probability(row);
                [1.0 - p, p]
            })
            .collect())
    }
}

/// Resolve a model path: a directory means `<dir>/model.json`.
#[must_use]
pub fn resolve_model_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        path.join(MODEL_FILE_NAME)
    } else {
        path.to_path_buf()
    }
}

/// Load an exported model from a file or model directory.
///
/// # Errors
/// Returns `PeRiskError::MissingModelArtifact` if the file does not exist,
/// `PeRiskError::Artifact` if the manifest check or validation fails.
pub fn load_model(path: &Path, policy: ManifestPolicy) -> Result<ModelArtifact> {
    let model_path = resolve_model_path(path);
    if !model_path.is_file() {
        tracing::error!("Model artifact not found at {:?}", model_path);
        return Err(PeRiskError::MissingModelArtifact(model_path));
    }

    let base_dir = model_path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = model_path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PeRiskError::Artifact(format!("invalid model file name {model_path:?}")))?;
    let bytes = std::fs::read(&model_path)?;
    let verified = manifest::verify_model_files(base_dir, file_name, &bytes, policy)?;

    let content = std::str::from_utf8(&bytes)
        .map_err(|e| PeRiskError::Artifact(format!("model file is not UTF-8: {e}")))?;
    let model = ModelArtifact::from_json(content)?;

    tracing::info!(
        "Loaded {} model from {:?} (n_features={}, manifest_verified={})",
        model.kind(),
        model_path,
        model.schema().len(),
        verified
    );

    Ok(model)
}
