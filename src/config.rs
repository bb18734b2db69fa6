//! Environment-driven configuration.
//!
//! Every setting has a `PE_RISK_*` variable; command-line flags override them.

use std::path::PathBuf;
use std::str::FromStr;

use crate::adapters::model::ManifestPolicy;
use crate::domain::LmrDefinition;
use crate::{PeRiskError, Result};

pub const MODEL_PATH_ENV: &str = "PE_RISK_MODEL_PATH";
pub const LMR_DEFINITION_ENV: &str = "PE_RISK_LMR_DEFINITION";
pub const VERIFY_MANIFEST_ENV: &str = "PE_RISK_VERIFY_MANIFEST";
pub const LOG_MODE_ENV: &str = "PE_RISK_LOG_MODE";
pub const LOG_FILE_ENV: &str = "PE_RISK_LOG_FILE";

pub const DEFAULT_MODEL_PATH: &str = "models/model.json";
pub const DEFAULT_LOG_FILE: &str = "pe-risk.log";

/// Where log lines go. Stdout is reserved for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogMode {
    #[default]
    Stderr,
    File,
}

impl FromStr for LogMode {
    type Err = PeRiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stderr" => Ok(Self::Stderr),
            "file" => Ok(Self::File),
            other => Err(PeRiskError::Config(format!(
                "Unknown log mode '{other}' (expected stderr or file)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub mode: LogMode,
    pub file: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            mode: LogMode::default(),
            file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub model_path: PathBuf,
    pub lmr: LmrDefinition,
    pub manifest_policy: ManifestPolicy,
    pub log: LogConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            lmr: LmrDefinition::default(),
            manifest_policy: ManifestPolicy::default(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    /// Returns `PeRiskError::Config` if a variable holds an unknown value.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`; unset or blank keys keep defaults.
    ///
    /// # Errors
    /// Returns `PeRiskError::Config` if a variable holds an unknown value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(path) = get(MODEL_PATH_ENV) {
            config.model_path = PathBuf::from(path);
        }
        if let Some(lmr) = get(LMR_DEFINITION_ENV) {
            config.lmr = lmr.parse()?;
        }
        if let Some(policy) = get(VERIFY_MANIFEST_ENV) {
            config.manifest_policy = policy.parse()?;
        }
        if let Some(mode) = get(LOG_MODE_ENV) {
            config.log.mode = mode.parse()?;
        }
        if let Some(file) = get(LOG_FILE_ENV) {
            config.log.file = PathBuf::from(file);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.model_path, PathBuf::from("models/model.json"));
        assert_eq!(config.lmr, LmrDefinition::LymphocyteMonocyte);
        assert_eq!(config.manifest_policy, ManifestPolicy::Auto);
        assert_eq!(config.log.mode, LogMode::Stderr);
    }

    #[test]
    fn test_reads_all_variables() {
        let config = AppConfig::from_lookup(lookup(&[
            (MODEL_PATH_ENV, "/srv/pe/model.json"),
            (LMR_DEFINITION_ENV, "lymphocyte_wbc"),
            (VERIFY_MANIFEST_ENV, "required"),
            (LOG_MODE_ENV, "file"),
            (LOG_FILE_ENV, "/var/log/pe.log"),
        ]))
        .expect("config");

        assert_eq!(config.model_path, PathBuf::from("/srv/pe/model.json"));
        assert_eq!(config.lmr, LmrDefinition::LymphocyteWbc);
        assert_eq!(config.manifest_policy, ManifestPolicy::Required);
        assert_eq!(config.log.mode, LogMode::File);
        assert_eq!(config.log.file, PathBuf::from("/var/log/pe.log"));
    }

    #[test]
    fn test_blank_values_keep_defaults() {
        let config = AppConfig::from_lookup(lookup(&[(MODEL_PATH_ENV, "  ")])).expect("config");
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
    }

    #[test]
    fn test_unknown_values_are_config_errors() {
        let err = AppConfig::from_lookup(lookup(&[(LMR_DEFINITION_ENV, "neutrophil")]))
            .expect_err("bad lmr");
        assert!(matches!(err, PeRiskError::Config(_)));

        assert!(AppConfig::from_lookup(lookup(&[(LOG_MODE_ENV, "syslog")])).is_err());
    }
}
