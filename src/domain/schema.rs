//! Feature schemas and schema-driven alignment.
//!
//! A trained model is positional: once vectorized, column `i` must hold the
//! value of the schema's `i`-th feature. Alignment is the only place where
//! named values become positions.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::domain::features::DerivedFeature;
use crate::domain::record::MergedRecord;
use crate::{PeRiskError, Result};

/// Features of the reference random-forest model, in training order.
pub const PE_V1_FEATURES: [&str; 31] = [
    "WBC",
    "N",
    "M",
    "Plt",
    "L",
    "LMR",
    "NMR",
    "SII",
    "PIV",
    "MoM值（P）",
    "MoM值（PI）",
    "MoM值（MAP）",
    "试管",
    "孕前BMI",
    "胎数",
    "产次",
    "AST",
    "ALT",
    "Cr",
    "UA",
    "HSI",
    "APRI",
    "FIB4",
    "SUA/sCr",
    "不良孕产史",
    "子痫前期既往史",
    "慢性高血压",
    "内科疾病史",
    "非典型抗磷脂综合征",
    "糖尿病",
    "妊娠年龄",
];

/// Yes/no history fields, encoded 0/1.
pub const BINARY_FEATURES: [&str; 7] = [
    "试管",
    "不良孕产史",
    "子痫前期既往史",
    "慢性高血压",
    "内科疾病史",
    "非典型抗磷脂综合征",
    "糖尿病",
];

/// Ordered feature names a model was fit on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Create a schema.
    ///
    /// # Errors
    /// Returns `PeRiskError::InvalidSchema` if the list is empty, contains a
    /// blank name, or repeats a name.
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(PeRiskError::InvalidSchema("schema has no features".into()));
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.trim().is_empty() {
                return Err(PeRiskError::InvalidSchema("blank feature name".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(PeRiskError::InvalidSchema(format!(
                    "duplicate feature name '{name}'"
                )));
            }
        }
        Ok(Self { names })
    }

    /// The 31-feature schema of the reference model.
    #[must_use]
    pub fn pe_v1() -> Self {
        Self {
            names: PE_V1_FEATURES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always `false`: a schema has at least one feature.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Derived biomarkers named by this schema, in schema order.
    #[must_use]
    pub fn derived_features(&self) -> Vec<DerivedFeature> {
        self.names
            .iter()
            .filter_map(|n| DerivedFeature::from_name(n))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = PeRiskError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

/// Values positionally aligned to a schema.
pub type FeatureVector = Vec<f64>;

/// Rows of feature vectors sharing one column count.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_cols: usize,
    rows: Vec<FeatureVector>,
}

impl FeatureMatrix {
    #[must_use]
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            rows: Vec::new(),
        }
    }

    /// # Errors
    /// Returns `PeRiskError::SchemaMismatch` if any row has the wrong length.
    pub fn from_rows(n_cols: usize, rows: Vec<FeatureVector>) -> Result<Self> {
        let mut matrix = Self {
            n_cols,
            rows: Vec::with_capacity(rows.len()),
        };
        for row in rows {
            matrix.push(row)?;
        }
        Ok(matrix)
    }

    /// # Errors
    /// Returns `PeRiskError::SchemaMismatch` if the row has the wrong length.
    pub fn push(&mut self, row: FeatureVector) -> Result<()> {
        if row.len() != self.n_cols {
            return Err(PeRiskError::SchemaMismatch {
                expected: self.n_cols,
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    #[must_use]
    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }
}

/// A single aligned record.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    pub vector: FeatureVector,
    /// Schema features absent from the record, substituted with 0
    pub defaulted: Vec<String>,
}

/// An aligned batch; `defaulted[i]` belongs to `matrix.rows()[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAlignment {
    pub matrix: FeatureMatrix,
    pub defaulted: Vec<Vec<String>>,
}

fn lookup(record: &MergedRecord, schema: &FeatureSchema) -> Alignment {
    let mut vector = Vec::with_capacity(schema.len());
    let mut defaulted = Vec::new();
    for name in schema.iter() {
        match record.get(name) {
            Some(value) => vector.push(value),
            None => {
                vector.push(0.0);
                defaulted.push(name.to_string());
            }
        }
    }
    Alignment { vector, defaulted }
}

/// Align one record onto `schema`, defaulting absent features to 0.
#[must_use]
pub fn align(record: &MergedRecord, schema: &FeatureSchema) -> Alignment {
    let alignment = lookup(record, schema);
    if !alignment.defaulted.is_empty() {
        tracing::warn!(
            "{} feature(s) absent from input, defaulted to 0: {}",
            alignment.defaulted.len(),
            alignment.defaulted.join(", ")
        );
    }
    alignment
}

/// Align every record onto `schema`. Row `i` equals `align(&records[i], schema)`.
#[must_use]
pub fn align_batch(records: &[MergedRecord], schema: &FeatureSchema) -> BatchAlignment {
    let mut matrix = FeatureMatrix::new(schema.len());
    let mut defaulted = Vec::with_capacity(records.len());
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();

    for record in records {
        let Alignment {
            vector,
            defaulted: missing,
        } = lookup(record, schema);
        for name in &missing {
            *counts.entry(name.clone()).or_default() += 1;
        }
        matrix.rows.push(vector);
        defaulted.push(missing);
    }

    if !counts.is_empty() {
        let listing = counts
            .iter()
            .map(|(name, n)| format!("{name} ({n} rows)"))
            .collect::<Vec<_>>()
            .join(", ");
        tracing::warn!(
            "{} feature(s) absent from batch input, defaulted to 0: {}",
            counts.len(),
            listing
        );
    }

    BatchAlignment { matrix, defaulted }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::features::DerivedRecord;
    use crate::domain::record::RawRecord;

    fn schema(names: &[&str]) -> FeatureSchema {
        FeatureSchema::new(names.iter().map(|s| (*s).to_string()).collect()).expect("schema")
    }

    fn merged(pairs: &[(&str, f64)]) -> MergedRecord {
        let raw: RawRecord = pairs.iter().copied().collect();
        MergedRecord::from_raw(&raw)
    }

    #[test]
    fn test_pe_v1_schema_shape() {
        let s = FeatureSchema::pe_v1();
        assert_eq!(s.len(), 31);
        assert_eq!(s.position("LMR"), Some(5));
        assert_eq!(s.names().last().map(String::as_str), Some("妊娠年龄"));
        assert_eq!(
            s.derived_features(),
            vec![
                DerivedFeature::Lmr,
                DerivedFeature::Nmr,
                DerivedFeature::Sii,
                DerivedFeature::Piv,
                DerivedFeature::Hsi,
                DerivedFeature::Apri,
                DerivedFeature::Fib4,
                DerivedFeature::SuaScr,
            ]
        );
    }

    #[test]
    fn test_schema_rejects_duplicates_and_empty() {
        assert!(FeatureSchema::new(vec![]).is_err());
        assert!(FeatureSchema::new(vec!["A".into(), "A".into()]).is_err());
        assert!(FeatureSchema::new(vec!["A".into(), "  ".into()]).is_err());
    }

    #[test]
    fn test_schema_deserialization_validates() {
        let ok: FeatureSchema = serde_json::from_str(r#"["AST", "ALT"]"#).expect("parse");
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<FeatureSchema>(r#"["AST", "AST"]"#).is_err());
    }

    #[test]
    fn test_align_follows_schema_order() {
        let s = schema(&["C", "A", "B"]);
        let a = align(&merged(&[("A", 1.0), ("B", 2.0), ("C", 3.0)]), &s);
        assert_eq!(a.vector, vec![3.0, 1.0, 2.0]);
        assert!(a.defaulted.is_empty());
    }

    #[test]
    fn test_align_defaults_absent_features() {
        let s = schema(&["A", "X", "B", "Y"]);
        let a = align(&merged(&[("A", 1.0), ("B", 2.0), ("unused", 9.0)]), &s);
        assert_eq!(a.vector.len(), s.len());
        assert_eq!(a.vector, vec![1.0, 0.0, 2.0, 0.0]);
        assert_eq!(a.defaulted, vec!["X".to_string(), "Y".to_string()]);
    }

    #[test]
    fn test_align_uses_derived_values() {
        let raw = RawRecord::new().with("L", 3.0);
        let mut derived = DerivedRecord::default();
        derived.insert(DerivedFeature::Sii, 400.0);
        let record = MergedRecord::merge(&raw, &derived);

        let a = align(&record, &schema(&["SII", "L"]));
        assert_eq!(a.vector, vec![400.0, 3.0]);
    }

    #[test]
    fn test_batch_alignment_equals_single_alignments() {
        let s = FeatureSchema::pe_v1();
        let records = vec![
            merged(&[("WBC", 10.0), ("N", 6.0), ("妊娠年龄", 30.0)]),
            merged(&[]),
            merged(&[("AST", 40.0), ("ALT", 25.0), ("LMR", 3.0)]),
        ];

        let batch = align_batch(&records, &s);
        assert_eq!(batch.matrix.n_rows(), records.len());
        assert_eq!(batch.matrix.n_cols(), s.len());
        for (i, record) in records.iter().enumerate() {
            let single = align(record, &s);
            assert_eq!(batch.matrix.row(i), Some(single.vector.as_slice()));
            assert_eq!(batch.defaulted[i], single.defaulted);
        }
        assert_eq!(batch.defaulted[1].len(), 31);
    }

    #[test]
    fn test_matrix_rejects_wrong_width() {
        let mut m = FeatureMatrix::new(2);
        m.push(vec![1.0, 2.0]).expect("push");
        match m.push(vec![1.0]) {
            Err(PeRiskError::SchemaMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
        assert_eq!(m.n_rows(), 1);
    }
}
