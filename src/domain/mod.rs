//! Domain layer: Core types and pure computations.
//!
//! Nothing here touches the filesystem or a concrete model; derivation,
//! alignment and classification are deterministic functions of their inputs.

pub mod features;
pub mod record;
mod risk;
pub mod schema;

pub use features::{
    derive, safe_div, DerivedFeature, DerivedFeatures, DerivedRecord, Deriver, LmrDefinition,
};
pub use record::{ClinicalField, ClinicalInputs, MergedRecord, RawRecord};
pub use risk::{RiskAssessment, RiskLevel, HIGH_RISK_THRESHOLD, MEDIUM_RISK_THRESHOLD};
pub use schema::{
    align, align_batch, Alignment, BatchAlignment, FeatureMatrix, FeatureSchema, FeatureVector,
};
