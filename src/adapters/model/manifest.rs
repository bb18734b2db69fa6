//! Model manifest: SHA-256 digests binding exported model files.
//!
//! `write_manifest` produces `manifest.json` after training; the loader checks
//! it before trusting a model file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{PeRiskError, Result};

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

pub const MANIFEST_VERSION: u32 = 1;

/// How the loader treats `manifest.json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ManifestPolicy {
    /// Verify when present, load unverified otherwise
    #[default]
    Auto,
    /// Refuse to load without a valid manifest
    Required,
    /// Never read the manifest
    Off,
}

impl FromStr for ManifestPolicy {
    type Err = PeRiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "required" | "require" => Ok(Self::Required),
            "off" | "false" | "0" | "no" => Ok(Self::Off),
            other => Err(PeRiskError::Config(format!(
                "Unknown manifest policy '{other}' (expected auto, required or off)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    #[serde(default)]
    pub created_at: Option<i64>,
    /// Relative file name -> lowercase hex SHA-256
    pub files: BTreeMap<String, String>,
}

/// Hex SHA-256 of a byte buffer.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Hex SHA-256 of a file's contents.
///
/// # Errors
/// Returns `PeRiskError::Io` if the file cannot be read.
pub fn sha256_hex_file(path: &Path) -> Result<String> {
    Ok(sha256_hex(&fs::read(path)?))
}

fn is_plain_relative(rel: &str) -> bool {
    let path = Path::new(rel);
    !rel.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

impl Manifest {
    /// Digest `files` (relative to `dir`) into a new manifest.
    ///
    /// # Errors
    /// Returns an error if a name escapes `dir` or a file cannot be read.
    pub fn build(dir: &Path, files: &[String]) -> Result<Self> {
        let mut digests = BTreeMap::new();
        for rel in files {
            if !is_plain_relative(rel) {
                return Err(PeRiskError::Artifact(format!(
                    "manifest entry '{rel}' must be a relative path inside the model directory"
                )));
            }
            digests.insert(rel.clone(), sha256_hex_file(&dir.join(rel))?);
        }
        Ok(Self {
            version: MANIFEST_VERSION,
            created_at: Some(chrono::Utc::now().timestamp()),
            files: digests,
        })
    }

    /// Write `manifest.json` into `dir`.
    ///
    /// # Errors
    /// Returns an error on serialization or IO failure.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE_NAME);
        fs::write(&path, serde_json::to_vec_pretty(self)?)?;
        Ok(path)
    }

    /// Read `manifest.json` from `dir`, if present.
    ///
    /// # Errors
    /// Returns `PeRiskError::Artifact` if the file exists but is not a manifest.
    pub fn read(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(MANIFEST_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let manifest = serde_json::from_slice(&bytes)
            .map_err(|e| PeRiskError::Artifact(format!("Invalid manifest.json format: {e}")))?;
        Ok(Some(manifest))
    }

    /// Check version, coverage of `model_file`, and every digest.
    ///
    /// `model_bytes` is the model content the caller will parse; its digest is
    /// taken from that buffer, other entries are read from `dir`.
    ///
    /// # Errors
    /// Returns `PeRiskError::Artifact` on any mismatch.
    pub fn verify(&self, dir: &Path, model_file: &str, model_bytes: &[u8]) -> Result<()> {
        if self.version != MANIFEST_VERSION {
            return Err(PeRiskError::Artifact(format!(
                "Unsupported manifest version: {}",
                self.version
            )));
        }
        if !self.files.contains_key(model_file) {
            return Err(PeRiskError::Artifact(format!(
                "manifest.json does not list {model_file}"
            )));
        }

        for (rel, expected_hex) in &self.files {
            if !is_plain_relative(rel) {
                return Err(PeRiskError::Artifact(format!(
                    "manifest entry '{rel}' escapes the model directory"
                )));
            }
            let actual_hex = if rel == model_file {
                sha256_hex(model_bytes)
            } else {
                let path = dir.join(rel);
                sha256_hex_file(&path).map_err(|e| {
                    PeRiskError::Artifact(format!(
                        "Manifest references missing/unreadable file {path:?}: {e}"
                    ))
                })?
            };
            if !actual_hex.eq_ignore_ascii_case(expected_hex.trim()) {
                return Err(PeRiskError::Artifact(format!("File hash mismatch for {rel}")));
            }
        }
        Ok(())
    }
}

/// Apply `policy` to `model_bytes`, read from `model_file` inside `dir`.
///
/// Returns whether a manifest was verified.
///
/// # Errors
/// Returns `PeRiskError::Artifact` if verification fails, or if the policy is
/// `Required` and no manifest exists.
pub fn verify_model_files(
    dir: &Path,
    model_file: &str,
    model_bytes: &[u8],
    policy: ManifestPolicy,
) -> Result<bool> {
    if policy == ManifestPolicy::Off {
        return Ok(false);
    }

    match Manifest::read(dir)? {
        Some(manifest) => {
            manifest.verify(dir, model_file, model_bytes)?;
            tracing::info!(
                "Model manifest verified ({} file(s) bound)",
                manifest.files.len()
            );
            Ok(true)
        }
        None if policy == ManifestPolicy::Required => Err(PeRiskError::Artifact(format!(
            "{MANIFEST_FILE_NAME} required but not found in {dir:?}"
        ))),
        None => {
            tracing::debug!("No {MANIFEST_FILE_NAME} in {:?}; loading unverified model", dir);
            Ok(false)
        }
    }
}
