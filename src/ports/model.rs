//! Risk model port: Trait for the trained classifier.
//!
//! This trait abstracts the model artifact from the application logic, so the
//! prediction service can be exercised with an in-memory stub.

use crate::domain::{FeatureMatrix, FeatureSchema};
use crate::Result;

/// A trained binary classifier.
///
/// Implementations are immutable after load and shared read-only across
/// prediction calls.
pub trait RiskModel: Send + Sync {
    /// Short model identifier for logs and reports.
    fn name(&self) -> &str;

    /// Ordered features the model was fit on.
    fn schema(&self) -> &FeatureSchema;

    /// Class probabilities per row: `[P(no PE), P(PE)]`.
    ///
    /// # Errors
    /// Returns `PeRiskError::SchemaMismatch` if the matrix width differs from
    /// the schema length.
    fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Vec<[f64; 2]>>;
}

impl<M: RiskModel + ?Sized> RiskModel for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn schema(&self) -> &FeatureSchema {
        (**self).schema()
    }

    fn predict_proba(&self, matrix: &FeatureMatrix) -> Result<Vec<[f64; 2]>> {
        (**self).predict_proba(matrix)
    }
}
