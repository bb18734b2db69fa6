//! # PE Risk
//!
//! Preeclampsia risk scoring from routine clinical measurements.
//!
//! This crate provides:
//! - Derived inflammatory and liver biomarkers (LMR, NMR, SII, PIV, APRI, FIB-4, HSI, SUA/sCr)
//! - Schema-driven alignment of named values onto a model's ordered feature vector
//! - Single-subject and batch (CSV) inference against an exported classifier
//! - Three-tier risk classification of the predicted probability
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core types and pure computations (records, derivation, alignment, risk tiers)
//! - `ports`: Trait definitions for external collaborators (the trained model)
//! - `adapters`: Concrete implementations (JSON model artifacts, CSV tables)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Environment-driven configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

use std::path::PathBuf;

pub use domain::{
    ClinicalField, DerivedFeature, FeatureSchema, LmrDefinition, RawRecord, RiskAssessment,
    RiskLevel,
};

/// Result type for PE Risk operations
pub type Result<T> = std::result::Result<T, PeRiskError>;

/// Main error type for PE Risk
#[derive(Debug, thiserror::Error)]
pub enum PeRiskError {
    #[error("Model artifact not found at {0:?}")]
    MissingModelArtifact(PathBuf),

    #[error("Invalid model artifact: {0}")]
    Artifact(String),

    #[error("Malformed input{}: missing {}", row_context(.row), join_names(.missing))]
    MalformedInput {
        /// 1-based data row number (header excluded), `None` for single-record input
        row: Option<usize>,
        /// Raw fields required for derivation that were absent
        missing: Vec<String>,
    },

    #[error("Feature schema mismatch: model expects {expected} features, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Invalid probability {0}: must be within [0, 1]")]
    InvalidProbability(f64),

    #[error("Invalid feature schema: {0}")]
    InvalidSchema(String),

    #[error("Model contract violated: {0}")]
    ModelContract(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl PeRiskError {
    /// Attach a 1-based row number to a row-level input error.
    #[must_use]
    pub fn at_row(self, row: usize) -> Self {
        match self {
            Self::MalformedInput { missing, .. } => Self::MalformedInput {
                row: Some(row),
                missing,
            },
            other => other,
        }
    }
}

fn row_context(row: &Option<usize>) -> String {
    match row {
        Some(n) => format!(" in row {n}"),
        None => String::new(),
    }
}

fn join_names(names: &[String]) -> String {
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input_message_names_row_and_fields() {
        let err = PeRiskError::MalformedInput {
            row: Some(3),
            missing: vec!["AST".into(), "Plt".into()],
        };
        assert_eq!(err.to_string(), "Malformed input in row 3: missing AST, Plt");

        let single = PeRiskError::MalformedInput {
            row: None,
            missing: vec!["ALT".into()],
        };
        assert_eq!(single.to_string(), "Malformed input: missing ALT");
    }
}
