//! Logistic regression exported from the training pipeline.

use serde::{Deserialize, Serialize};

use crate::domain::FeatureSchema;
use crate::{PeRiskError, Result};

/// Logistic regression parameters with an optional standard scaler.
///
/// When present, the scaler is applied as `(x - scaler_mean) / scaler_scale`
/// before the linear term, matching sklearn's `StandardScaler`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticModel {
    pub feature_names: FeatureSchema,
    pub coefficients: Vec<f64>,
    pub intercept: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler_mean: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaler_scale: Option<Vec<f64>>,
}

impl LogisticModel {
    /// Check parameter lengths against the schema.
    ///
    /// # Errors
    /// Returns `PeRiskError::Artifact` describing the first inconsistency.
    pub fn validate(&self) -> Result<()> {
        let n = self.feature_names.len();
        if self.coefficients.len() != n {
            return Err(PeRiskError::Artifact(format!(
                "coefficients has {} entries, feature_names has {n}",
                self.coefficients.len()
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|c| !c.is_finite()) {
            return Err(PeRiskError::Artifact("non-finite model coefficient".into()));
        }

        match (&self.scaler_mean, &self.scaler_scale) {
            (None, None) => {}
            (Some(mean), Some(scale)) => {
                if mean.len() != n || scale.len() != n {
                    return Err(PeRiskError::Artifact(
                        "scaler parameter lengths do not match feature_names length".into(),
                    ));
                }
                if mean.iter().any(|m| !m.is_finite()) {
                    return Err(PeRiskError::Artifact("non-finite scaler_mean entry".into()));
                }
                if scale.iter().any(|s| !s.is_finite() || *s == 0.0) {
                    return Err(PeRiskError::Artifact(
                        "scaler_scale entries must be finite and non-zero".into(),
                    ));
                }
            }
            _ => {
                return Err(PeRiskError::Artifact(
                    "scaler_mean and scaler_scale must be given together".into(),
                ))
            }
        }
        Ok(())
    }

    /// Linear term for one aligned row.
    fn decision_function(&self, row: &[f64]) -> f64 {
        let mut z = self.intercept;
        for (i, (&x, &coef)) in row.iter().zip(&self.coefficients).enumerate() {
            let x = match (&self.scaler_mean, &self.scaler_scale) {
                (Some(mean), Some(scale)) => (x - mean[i]) / scale[i],
                _ => x,
            };
            z += coef * x;
        }
        z
    }

    /// P(PE) for one aligned row.
    #[must_use]
    pub fn probability(&self, row: &[f64]) -> f64 {
        sigmoid(self.decision_function(row))
    }
}

/// Logistic function, stable for large |z|. NaN passes through.
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(scaled: bool) -> LogisticModel {
        LogisticModel {
            feature_names: FeatureSchema::new(vec!["a".into(), "b".into()]).unwrap(),
            coefficients: vec![2.0, -1.0],
            intercept: 0.5,
            scaler_mean: scaled.then(|| vec![1.0, 0.0]),
            scaler_scale: scaled.then(|| vec![2.0, 1.0]),
        }
    }

    #[test]
    fn test_probability_matches_closed_form() {
        let m = model(false);
        let z: f64 = 0.5 + 2.0 * 1.0 - 1.0 * 3.0;
        let expected = 1.0 / (1.0 + (-z).exp());
        assert!((m.probability(&[1.0, 3.0]) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_scaler_applied_before_linear_term() {
        let m = model(true);
        // (3 - 1) / 2 = 1 -> z = 0.5 + 2*1 - 1*0 = 2.5
        let expected = 1.0 / (1.0 + (-2.5f64).exp());
        assert!((m.probability(&[3.0, 0.0]) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_sigmoid_saturates() {
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert_eq!(sigmoid(1000.0), 1.0);
        assert!((sigmoid(0.0) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overflowing_logit_is_not_a_probability() {
        let m = LogisticModel {
            feature_names: FeatureSchema::new(vec!["AST".into(), "ALT".into()]).unwrap(),
            coefficients: vec![1e308, -1e308],
            intercept: 0.0,
            scaler_mean: None,
            scaler_scale: None,
        };
        m.validate().expect("finite parameters");

        // inf - inf
        let p = m.probability(&[10.0, 10.0]);
        assert!(p.is_nan());
        assert!(matches!(
            crate::domain::RiskLevel::from_probability(p),
            Err(PeRiskError::InvalidProbability(_))
        ));
    }

    #[test]
    fn test_validate_rejects_inconsistent_parameters() {
        let mut m = model(false);
        m.coefficients.push(1.0);
        assert!(m.validate().is_err());

        let mut m = model(true);
        m.scaler_scale = None;
        assert!(m.validate().is_err());

        let mut m = model(true);
        m.scaler_scale = Some(vec![0.0, 1.0]);
        assert!(m.validate().is_err());

        assert!(model(true).validate().is_ok());
    }
}
