//! Risk tiers and assessment records.
//!
//! Represents the interpreted output of a preeclampsia risk model.

use serde::{Deserialize, Serialize};

use crate::{PeRiskError, Result};

/// Probabilities at or above this are at least `Medium`.
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.2;

/// Probabilities at or above this are `High`.
pub const HIGH_RISK_THRESHOLD: f64 = 0.5;

/// Preeclampsia risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// p < 0.2
    Low,
    /// 0.2 <= p < 0.5
    Medium,
    /// p >= 0.5
    High,
}

impl RiskLevel {
    /// Classify a predicted probability.
    ///
    /// # Errors
    /// Returns `PeRiskError::InvalidProbability` if `p` is outside [0, 1] or NaN.
    pub fn from_probability(p: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(PeRiskError::InvalidProbability(p));
        }
        Ok(if p >= HIGH_RISK_THRESHOLD {
            Self::High
        } else if p >= MEDIUM_RISK_THRESHOLD {
            Self::Medium
        } else {
            Self::Low
        })
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low risk (p < 0.2)",
            Self::Medium => "Medium risk (0.2 <= p < 0.5) - closer monitoring advised",
            Self::High => "High risk (p >= 0.5) - specialist follow-up advised",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// A scored subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Unique identifier
    pub id: String,

    /// Caller-supplied subject reference
    pub subject_id: Option<String>,

    /// P(preeclampsia) from the model
    pub probability: f64,

    pub risk_level: RiskLevel,

    /// Schema features that were absent and substituted with 0
    pub defaulted_features: Vec<String>,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl RiskAssessment {
    /// Create an assessment from a model probability.
    ///
    /// # Errors
    /// Returns `PeRiskError::InvalidProbability` if `probability` is outside [0, 1].
    pub fn new(probability: f64, defaulted_features: Vec<String>) -> Result<Self> {
        let risk_level = RiskLevel::from_probability(probability)?;
        Ok(Self {
            id: uuid_v4(),
            subject_id: None,
            probability,
            risk_level,
            defaulted_features,
            created_at: chrono::Utc::now(),
        })
    }

    #[must_use]
    pub fn with_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.subject_id = Some(subject_id.into());
        self
    }

    /// Probability as a percentage.
    #[must_use]
    pub fn percent(&self) -> f64 {
        self.probability * 100.0
    }
}

/// Random UUID v4 from a ChaCha20 CSPRNG seeded by the OS.
fn uuid_v4() -> String {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let bytes: [u8; 16] = rng.gen();

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        (bytes[6] & 0x0f) | 0x40, bytes[7],
        (bytes[8] & 0x3f) | 0x80, bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}
