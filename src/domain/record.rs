//! Clinical record types.
//!
//! Column names follow the training dataset headers, since those are what a
//! persisted model schema refers to. English aliases are accepted on input and
//! folded onto the canonical header.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::features::{DerivedFeature, DerivedRecord};
use crate::{PeRiskError, Result};

/// Raw clinical fields consumed by the biomarker derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClinicalField {
    /// White blood cell count (10^9/L)
    Wbc,
    /// Neutrophil count (10^9/L)
    Neutrophils,
    /// Monocyte count (10^9/L)
    Monocytes,
    /// Lymphocyte count (10^9/L)
    Lymphocytes,
    /// Platelet count (10^9/L)
    Platelets,
    /// Aspartate aminotransferase (U/L)
    Ast,
    /// Alanine aminotransferase (U/L)
    Alt,
    /// Serum uric acid (umol/L)
    UricAcid,
    /// Serum creatinine (umol/L)
    Creatinine,
    /// Pre-pregnancy body mass index (kg/m^2)
    PrePregnancyBmi,
    /// Maternal age at pregnancy (years)
    MaternalAge,
}

impl ClinicalField {
    pub const ALL: [ClinicalField; 11] = [
        Self::Wbc,
        Self::Neutrophils,
        Self::Monocytes,
        Self::Lymphocytes,
        Self::Platelets,
        Self::Ast,
        Self::Alt,
        Self::UricAcid,
        Self::Creatinine,
        Self::PrePregnancyBmi,
        Self::MaternalAge,
    ];

    /// Canonical column name, as used by model schemas.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Wbc => "WBC",
            Self::Neutrophils => "N",
            Self::Monocytes => "M",
            Self::Lymphocytes => "L",
            Self::Platelets => "Plt",
            Self::Ast => "AST",
            Self::Alt => "ALT",
            Self::UricAcid => "UA",
            Self::Creatinine => "Cr",
            Self::PrePregnancyBmi => "孕前BMI",
            Self::MaternalAge => "妊娠年龄",
        }
    }

    /// Alternative column names folded onto [`ClinicalField::name`].
    #[must_use]
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::Wbc => &["wbc"],
            Self::Neutrophils => &["neutrophils"],
            Self::Monocytes => &["monocytes"],
            Self::Lymphocytes => &["lymphocytes"],
            Self::Platelets => &["PLT", "platelets"],
            Self::Ast => &["ast"],
            Self::Alt => &["alt"],
            Self::UricAcid => &["SUA", "uric_acid"],
            Self::Creatinine => &["sCr", "creatinine"],
            Self::PrePregnancyBmi => &["BMI", "bmi", "pre_pregnancy_bmi"],
            Self::MaternalAge => &["age", "Age", "maternal_age"],
        }
    }

    /// Resolve a column name (canonical or alias) to a field.
    #[must_use]
    pub fn from_column(column: &str) -> Option<Self> {
        let column = column.trim();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == column || f.aliases().contains(&column))
    }
}

impl std::fmt::Display for ClinicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fold a column name onto its canonical form.
///
/// Derived biomarker spellings (`FIB-4`) fold onto the derived feature name,
/// clinical aliases onto their dataset header. Unknown names are kept as-is
/// (trimmed): model schemas may use any column from the dataset, not only the
/// ones derivation reads.
#[must_use]
pub fn canonical_column(column: &str) -> &str {
    if let Some(feature) = DerivedFeature::from_name(column) {
        return feature.name();
    }
    match ClinicalField::from_column(column) {
        Some(field) => field.name(),
        None => column.trim(),
    }
}

/// Named raw measurements for one subject.
///
/// Binary history fields (IVF, prior PE, chronic hypertension, ...) are stored
/// as 0/1. Absent keys mean the value was not supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct RawRecord {
    values: BTreeMap<String, f64>,
}

impl RawRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a value under its canonical column name.
    ///
    /// Returns `false` (and keeps the existing value) if the canonical name
    /// was already present, e.g. when both `BMI` and `孕前BMI` are supplied.
    pub fn insert(&mut self, name: &str, value: f64) -> bool {
        let key = canonical_column(name);
        if self.values.contains_key(key) {
            return false;
        }
        self.values.insert(key.to_string(), value);
        true
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(canonical_column(name)).copied()
    }

    #[must_use]
    pub fn field(&self, field: ClinicalField) -> Option<f64> {
        self.values.get(field.name()).copied()
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(canonical_column(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl From<BTreeMap<String, f64>> for RawRecord {
    fn from(map: BTreeMap<String, f64>) -> Self {
        map.into_iter().collect()
    }
}

impl From<RawRecord> for BTreeMap<String, f64> {
    fn from(record: RawRecord) -> Self {
        record.values
    }
}

impl<K: AsRef<str>> FromIterator<(K, f64)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (k, v) in iter {
            record.insert(k.as_ref(), v);
        }
        record
    }
}

/// Typed view of the fields the derivation reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInputs {
    pub wbc: f64,
    pub neutrophils: f64,
    pub monocytes: f64,
    pub lymphocytes: f64,
    pub platelets: f64,
    pub ast: f64,
    pub alt: f64,
    pub uric_acid: f64,
    pub creatinine: f64,
    pub bmi: f64,
    pub age: f64,
}

impl ClinicalInputs {
    /// Build inputs from a record.
    ///
    /// Every field in `required` must be present; other fields default to 0.
    ///
    /// # Errors
    /// Returns `PeRiskError::MalformedInput` listing all absent required fields.
    pub fn from_record(record: &RawRecord, required: &[ClinicalField]) -> Result<Self> {
        let missing: Vec<String> = required
            .iter()
            .filter(|f| record.field(**f).is_none())
            .map(|f| f.name().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PeRiskError::MalformedInput { row: None, missing });
        }

        let get = |f: ClinicalField| record.field(f).unwrap_or(0.0);
        Ok(Self {
            wbc: get(ClinicalField::Wbc),
            neutrophils: get(ClinicalField::Neutrophils),
            monocytes: get(ClinicalField::Monocytes),
            lymphocytes: get(ClinicalField::Lymphocytes),
            platelets: get(ClinicalField::Platelets),
            ast: get(ClinicalField::Ast),
            alt: get(ClinicalField::Alt),
            uric_acid: get(ClinicalField::UricAcid),
            creatinine: get(ClinicalField::Creatinine),
            bmi: get(ClinicalField::PrePregnancyBmi),
            age: get(ClinicalField::MaternalAge),
        })
    }

    #[must_use]
    pub fn get(&self, field: ClinicalField) -> f64 {
        match field {
            ClinicalField::Wbc => self.wbc,
            ClinicalField::Neutrophils => self.neutrophils,
            ClinicalField::Monocytes => self.monocytes,
            ClinicalField::Lymphocytes => self.lymphocytes,
            ClinicalField::Platelets => self.platelets,
            ClinicalField::Ast => self.ast,
            ClinicalField::Alt => self.alt,
            ClinicalField::UricAcid => self.uric_acid,
            ClinicalField::Creatinine => self.creatinine,
            ClinicalField::PrePregnancyBmi => self.bmi,
            ClinicalField::MaternalAge => self.age,
        }
    }
}

/// Raw values plus derived biomarkers, keyed by feature name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedRecord {
    values: BTreeMap<String, f64>,
}

impl MergedRecord {
    /// Merge a raw record with its derived features.
    ///
    /// A derived value never replaces a raw value of the same name.
    #[must_use]
    pub fn merge(raw: &RawRecord, derived: &DerivedRecord) -> Self {
        let mut values = raw.values.clone();
        for (feature, value) in derived.iter() {
            values.entry(feature.name().to_string()).or_insert(value);
        }
        Self { values }
    }

    /// A merged record with no derived features.
    #[must_use]
    pub fn from_raw(raw: &RawRecord) -> Self {
        Self {
            values: raw.values.clone(),
        }
    }

    /// Look up a feature; clinical aliases resolve to their canonical column.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(canonical_column(name)).copied()
    }

    #[must_use]
    pub fn derived(&self, feature: DerivedFeature) -> Option<f64> {
        self.get(feature.name())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
