//! Prediction service: Orchestrates derivation, alignment and scoring.
//!
//! This service coordinates:
//! - Biomarker derivation for the features the model's schema names
//! - Merging derived values into the subject's record
//! - Alignment onto the model's ordered schema
//! - Model scoring and risk classification
//!
//! Single and batch predictions share every step, so a batch row scores
//! exactly as the same record would on its own.

use std::sync::Arc;

use crate::domain::{
    align, align_batch, Deriver, FeatureMatrix, FeatureSchema, LmrDefinition, MergedRecord,
    RawRecord, RiskAssessment, RiskLevel,
};
use crate::ports::RiskModel;
use crate::{PeRiskError, Result};

/// Settings for the prediction pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceConfig {
    pub lmr: LmrDefinition,
}

/// Result for one batch row.
#[derive(Debug)]
pub enum RowOutcome {
    Scored(RiskAssessment),
    Failed(PeRiskError),
}

impl RowOutcome {
    #[must_use]
    pub fn assessment(&self) -> Option<&RiskAssessment> {
        match self {
            Self::Scored(a) => Some(a),
            Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&PeRiskError> {
        match self {
            Self::Scored(_) => None,
            Self::Failed(e) => Some(e),
        }
    }
}

/// Row counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
    pub failed: usize,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} rows: {} low, {} medium, {} high, {} failed",
            self.total, self.low, self.medium, self.high, self.failed
        )
    }
}

/// Outcomes of a batch, in input row order.
#[derive(Debug)]
pub struct BatchReport {
    outcomes: Vec<RowOutcome>,
}

impl BatchReport {
    #[must_use]
    pub fn outcomes(&self) -> &[RowOutcome] {
        &self.outcomes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Failed rows as `(1-based row number, error)`.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &PeRiskError)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.error().map(|e| (i + 1, e)))
    }

    #[must_use]
    pub fn summary(&self) -> BatchSummary {
        let mut summary = BatchSummary {
            total: self.outcomes.len(),
            ..BatchSummary::default()
        };
        for outcome in &self.outcomes {
            match outcome {
                RowOutcome::Scored(a) => match a.risk_level {
                    RiskLevel::Low => summary.low += 1,
                    RiskLevel::Medium => summary.medium += 1,
                    RiskLevel::High => summary.high += 1,
                },
                RowOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// Service for scoring subjects against a loaded model.
///
/// The model handle is immutable; one service can serve any number of
/// concurrent callers.
pub struct PredictionService<M: RiskModel> {
    model: Arc<M>,
    deriver: Deriver,
}

impl<M: RiskModel> PredictionService<M> {
    /// Create a new prediction service for `model`.
    pub fn new(model: Arc<M>, config: ServiceConfig) -> Self {
        let deriver = Deriver::for_schema(model.schema(), config.lmr);
        tracing::info!(
            "Prediction service ready: model={}, n_features={}, derived={}, lmr={}",
            model.name(),
            model.schema().len(),
            deriver.wanted().len(),
            config.lmr
        );
        Self { model, deriver }
    }

    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    #[must_use]
    pub fn schema(&self) -> &FeatureSchema {
        self.model.schema()
    }

    #[must_use]
    pub fn deriver(&self) -> &Deriver {
        &self.deriver
    }

    /// Derive the schema's biomarkers and merge them into the record.
    ///
    /// # Errors
    /// Returns `PeRiskError::MalformedInput` if a field needed for derivation is absent.
    pub fn prepare(&self, record: &RawRecord) -> Result<MergedRecord> {
        let derived = self.deriver.derive_record(record)?;
        Ok(MergedRecord::merge(record, &derived))
    }

    /// Score one subject. Any failure aborts the prediction.
    ///
    /// # Errors
    /// Returns `MalformedInput`, `SchemaMismatch`, `InvalidProbability` or
    /// `ModelContract` errors.
    pub fn predict_one(&self, record: &RawRecord) -> Result<RiskAssessment> {
        tracing::debug!("Step 1: Deriving biomarkers...");
        let merged = self.prepare(record)?;

        tracing::debug!("Step 2: Aligning onto {} features...", self.schema().len());
        let alignment = align(&merged, self.schema());
        let matrix = FeatureMatrix::from_rows(self.schema().len(), vec![alignment.vector])?;

        tracing::debug!("Step 3: Scoring with {} model...", self.model.name());
        let probs = self.model.predict_proba(&matrix)?;
        let [proba] = probs.as_slice() else {
            return Err(PeRiskError::ModelContract(format!(
                "expected 1 probability row, got {}",
                probs.len()
            )));
        };

        let assessment = RiskAssessment::new(proba[1], alignment.defaulted)?;
        tracing::info!(
            "Prediction complete: probability={:.4}, risk={}",
            assessment.probability,
            assessment.risk_level
        );
        Ok(assessment)
    }

    /// Score many subjects.
    ///
    /// Every row gets an outcome and the batch never aborts. Missing
    /// derivation inputs and invalid probabilities fail their own row. When
    /// the model rejects the whole matrix, each row it was asked to score
    /// fails with that error.
    pub fn predict_batch(&self, records: &[RawRecord]) -> BatchReport {
        tracing::info!("Starting batch prediction over {} rows...", records.len());

        let prepared: Vec<Result<MergedRecord>> = self
            .deriver
            .derive_batch(records)
            .into_iter()
            .zip(records)
            .map(|(derived, record)| derived.map(|d| MergedRecord::merge(record, &d)))
            .collect();

        let ready: Vec<MergedRecord> = prepared
            .iter()
            .filter_map(|p| p.as_ref().ok().cloned())
            .collect();

        let scored = match self.score_rows(&ready) {
            Ok(scored) => scored,
            Err(e) => {
                tracing::error!("Model rejected batch of {} rows: {}", ready.len(), e);
                ready
                    .iter()
                    .map(|_| RowOutcome::Failed(per_row_copy(&e)))
                    .collect()
            }
        };

        let mut scored = scored.into_iter();
        let mut outcomes = Vec::with_capacity(records.len());
        for (i, p) in prepared.into_iter().enumerate() {
            let outcome = match p {
                Ok(_) => scored.next().unwrap_or_else(|| {
                    RowOutcome::Failed(PeRiskError::ModelContract(
                        "scored rows out of step with input".into(),
                    ))
                }),
                Err(e) => RowOutcome::Failed(e),
            };
            if let RowOutcome::Failed(e) = &outcome {
                tracing::warn!("row {}: {}", i + 1, e);
            }
            outcomes.push(outcome);
        }

        let report = BatchReport { outcomes };
        tracing::info!("Batch complete: {}", report.summary());
        report
    }

    /// Align and score prepared rows in one model call.
    fn score_rows(&self, ready: &[MergedRecord]) -> Result<Vec<RowOutcome>> {
        if ready.is_empty() {
            return Ok(Vec::new());
        }

        let aligned = align_batch(ready, self.schema());
        let probs = self.model.predict_proba(&aligned.matrix)?;
        if probs.len() != ready.len() {
            return Err(PeRiskError::ModelContract(format!(
                "expected {} probability rows, got {}",
                ready.len(),
                probs.len()
            )));
        }

        Ok(probs
            .into_iter()
            .zip(aligned.defaulted)
            .map(|(proba, defaulted)| match RiskAssessment::new(proba[1], defaulted) {
                Ok(a) => RowOutcome::Scored(a),
                Err(e) => RowOutcome::Failed(e),
            })
            .collect())
    }
}

/// Restate a batch-wide model error for one row.
fn per_row_copy(error: &PeRiskError) -> PeRiskError {
    match error {
        PeRiskError::SchemaMismatch { expected, actual } => PeRiskError::SchemaMismatch {
            expected: *expected,
            actual: *actual,
        },
        PeRiskError::ModelContract(msg) => PeRiskError::ModelContract(msg.clone()),
        other => PeRiskError::ModelContract(other.to_string()),
    }
}
