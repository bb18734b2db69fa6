//! Derived biomarkers.
//!
//! Composite inflammatory ratios (LMR, NMR, SII, PIV) from the blood count,
//! liver indices (APRI, FIB-4, HSI) and the uric acid to creatinine ratio.
//! Every formula is total: an undefined result (non-positive divisor,
//! overflow, non-finite input) yields 0.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::record::{ClinicalField, ClinicalInputs, RawRecord};
use crate::domain::schema::FeatureSchema;
use crate::{PeRiskError, Result};

/// AST upper limit of normal (U/L) used by APRI.
pub const AST_UPPER_LIMIT: f64 = 40.0;

/// Divide, returning 0 when the divisor is not positive or the result is not finite.
#[must_use]
pub fn safe_div(numerator: f64, divisor: f64) -> f64 {
    if !(divisor > 0.0) {
        return 0.0;
    }
    finite_or_zero(numerator / divisor)
}

#[inline]
fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() {
        x
    } else {
        0.0
    }
}

/// Which denominator LMR uses.
///
/// Dataset revisions disagree; lymphocyte/monocyte is the clinical definition
/// and the default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmrDefinition {
    /// LMR = L / M
    #[default]
    LymphocyteMonocyte,
    /// LMR = L / WBC
    LymphocyteWbc,
}

impl FromStr for LmrDefinition {
    type Err = PeRiskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lymphocyte_monocyte" | "l/m" | "lm" => Ok(Self::LymphocyteMonocyte),
            "lymphocyte_wbc" | "l/wbc" | "lwbc" => Ok(Self::LymphocyteWbc),
            other => Err(PeRiskError::Config(format!(
                "Unknown LMR definition '{other}' (expected lymphocyte_monocyte or lymphocyte_wbc)"
            ))),
        }
    }
}

impl std::fmt::Display for LmrDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LymphocyteMonocyte => write!(f, "lymphocyte_monocyte"),
            Self::LymphocyteWbc => write!(f, "lymphocyte_wbc"),
        }
    }
}

/// A derived biomarker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DerivedFeature {
    /// Lymphocyte-to-monocyte ratio
    Lmr,
    /// Neutrophil-to-monocyte ratio
    Nmr,
    /// Systemic immune-inflammation index
    Sii,
    /// Pan-immune-inflammation value
    Piv,
    /// AST-to-platelet ratio index
    Apri,
    /// Fibrosis-4 index
    Fib4,
    /// Hepatic steatosis index
    Hsi,
    /// Serum uric acid to serum creatinine ratio
    SuaScr,
}

impl DerivedFeature {
    pub const ALL: [DerivedFeature; 8] = [
        Self::Lmr,
        Self::Nmr,
        Self::Sii,
        Self::Piv,
        Self::Apri,
        Self::Fib4,
        Self::Hsi,
        Self::SuaScr,
    ];

    /// Feature name as it appears in model schemas.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Lmr => "LMR",
            Self::Nmr => "NMR",
            Self::Sii => "SII",
            Self::Piv => "PIV",
            Self::Apri => "APRI",
            Self::Fib4 => "FIB4",
            Self::Hsi => "HSI",
            Self::SuaScr => "SUA/sCr",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name == "FIB-4" {
            return Some(Self::Fib4);
        }
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    /// Raw fields the formula reads.
    #[must_use]
    pub fn inputs(self, lmr: LmrDefinition) -> &'static [ClinicalField] {
        use ClinicalField::*;
        match self {
            Self::Lmr => match lmr {
                LmrDefinition::LymphocyteMonocyte => &[Lymphocytes, Monocytes],
                LmrDefinition::LymphocyteWbc => &[Lymphocytes, Wbc],
            },
            Self::Nmr => &[Neutrophils, Monocytes],
            Self::Sii => &[Neutrophils, Platelets, Lymphocytes],
            Self::Piv => &[Neutrophils, Platelets, Monocytes, Lymphocytes],
            Self::Apri => &[Ast, Platelets],
            Self::Fib4 => &[MaternalAge, Ast, Platelets, Alt],
            Self::Hsi => &[Alt, Ast, PrePregnancyBmi],
            Self::SuaScr => &[UricAcid, Creatinine],
        }
    }

    /// Evaluate the formula. Always finite.
    #[must_use]
    pub fn compute(self, x: &ClinicalInputs, lmr: LmrDefinition) -> f64 {
        let value = match self {
            Self::Lmr => match lmr {
                LmrDefinition::LymphocyteMonocyte => safe_div(x.lymphocytes, x.monocytes),
                LmrDefinition::LymphocyteWbc => safe_div(x.lymphocytes, x.wbc),
            },
            Self::Nmr => safe_div(x.neutrophils, x.monocytes),
            Self::Sii => safe_div(x.neutrophils * x.platelets, x.lymphocytes),
            Self::Piv => safe_div(x.neutrophils * x.platelets * x.monocytes, x.lymphocytes),
            Self::Apri => safe_div(x.ast / AST_UPPER_LIMIT * 100.0, x.platelets),
            Self::Fib4 => {
                if !(x.alt > 0.0) {
                    0.0
                } else {
                    safe_div(x.age * x.ast, x.platelets * x.alt.sqrt())
                }
            }
            Self::Hsi => {
                if !(x.ast > 0.0) {
                    0.0
                } else {
                    safe_div(8.0 * x.alt, x.ast) + x.bmi
                }
            }
            Self::SuaScr => safe_div(x.uric_acid, x.creatinine),
        };
        finite_or_zero(value)
    }
}

impl std::fmt::Display for DerivedFeature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// All derived biomarkers for one subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedFeatures {
    pub lmr: f64,
    pub nmr: f64,
    pub sii: f64,
    pub piv: f64,
    pub apri: f64,
    pub fib4: f64,
    pub hsi: f64,
    pub sua_scr: f64,
}

impl DerivedFeatures {
    #[must_use]
    pub fn get(&self, feature: DerivedFeature) -> f64 {
        match feature {
            DerivedFeature::Lmr => self.lmr,
            DerivedFeature::Nmr => self.nmr,
            DerivedFeature::Sii => self.sii,
            DerivedFeature::Piv => self.piv,
            DerivedFeature::Apri => self.apri,
            DerivedFeature::Fib4 => self.fib4,
            DerivedFeature::Hsi => self.hsi,
            DerivedFeature::SuaScr => self.sua_scr,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DerivedFeature, f64)> + '_ {
        DerivedFeature::ALL.into_iter().map(|f| (f, self.get(f)))
    }
}

/// Compute every derived biomarker.
#[must_use]
pub fn derive(inputs: &ClinicalInputs, lmr: LmrDefinition) -> DerivedFeatures {
    let c = |f: DerivedFeature| f.compute(inputs, lmr);
    DerivedFeatures {
        lmr: c(DerivedFeature::Lmr),
        nmr: c(DerivedFeature::Nmr),
        sii: c(DerivedFeature::Sii),
        piv: c(DerivedFeature::Piv),
        apri: c(DerivedFeature::Apri),
        fib4: c(DerivedFeature::Fib4),
        hsi: c(DerivedFeature::Hsi),
        sua_scr: c(DerivedFeature::SuaScr),
    }
}

/// The derived values a record contributes to its merged record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivedRecord {
    values: BTreeMap<DerivedFeature, f64>,
}

impl DerivedRecord {
    pub fn insert(&mut self, feature: DerivedFeature, value: f64) {
        self.values.insert(feature, value);
    }

    #[must_use]
    pub fn get(&self, feature: DerivedFeature) -> Option<f64> {
        self.values.get(&feature).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DerivedFeature, f64)> + '_ {
        self.values.iter().map(|(f, v)| (*f, *v))
    }
}

impl From<&DerivedFeatures> for DerivedRecord {
    fn from(all: &DerivedFeatures) -> Self {
        Self {
            values: all.iter().collect(),
        }
    }
}

/// Derives the biomarkers a model needs from raw records.
///
/// Only fields feeding a wanted feature are required. A feature already
/// supplied as a raw column is not recomputed and its inputs are not required.
#[derive(Debug, Clone)]
pub struct Deriver {
    lmr: LmrDefinition,
    wanted: Vec<DerivedFeature>,
}

impl Deriver {
    /// A deriver producing every biomarker.
    #[must_use]
    pub fn new(lmr: LmrDefinition) -> Self {
        Self {
            lmr,
            wanted: DerivedFeature::ALL.to_vec(),
        }
    }

    /// A deriver producing the biomarkers named in `schema`.
    #[must_use]
    pub fn for_schema(schema: &FeatureSchema, lmr: LmrDefinition) -> Self {
        Self {
            lmr,
            wanted: schema.derived_features(),
        }
    }

    #[must_use]
    pub fn lmr(&self) -> LmrDefinition {
        self.lmr
    }

    #[must_use]
    pub fn wanted(&self) -> &[DerivedFeature] {
        &self.wanted
    }

    fn pending<'a>(&'a self, record: &'a RawRecord) -> impl Iterator<Item = DerivedFeature> + 'a {
        self.wanted
            .iter()
            .copied()
            .filter(move |f| !record.contains(f.name()))
    }

    /// Raw fields `record` must carry for derivation to be trusted.
    #[must_use]
    pub fn required_fields(&self, record: &RawRecord) -> Vec<ClinicalField> {
        let fields: BTreeSet<ClinicalField> = self
            .pending(record)
            .flat_map(|f| f.inputs(self.lmr).iter().copied())
            .collect();
        fields.into_iter().collect()
    }

    /// Derive the wanted biomarkers for one record.
    ///
    /// # Errors
    /// Returns `PeRiskError::MalformedInput` if a required raw field is absent.
    pub fn derive_record(&self, record: &RawRecord) -> Result<DerivedRecord> {
        let required = self.required_fields(record);
        let inputs = ClinicalInputs::from_record(record, &required)?;

        let mut derived = DerivedRecord::default();
        for feature in self.pending(record) {
            derived.insert(feature, feature.compute(&inputs, self.lmr));
        }
        Ok(derived)
    }

    /// Derive every row independently; errors carry their 1-based row number.
    #[must_use]
    pub fn derive_batch(&self, records: &[RawRecord]) -> Vec<Result<DerivedRecord>> {
        records
            .iter()
            .enumerate()
            .map(|(i, record)| self.derive_record(record).map_err(|e| e.at_row(i + 1)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    fn blood_count() -> ClinicalInputs {
        ClinicalInputs {
            wbc: 10.0,
            neutrophils: 6.0,
            monocytes: 1.0,
            lymphocytes: 3.0,
            platelets: 200.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_inflammatory_ratios_worked_example() {
        let d = derive(&blood_count(), LmrDefinition::LymphocyteMonocyte);
        assert!((d.lmr - 3.0).abs() < EPS);
        assert!((d.nmr - 6.0).abs() < EPS);
        assert!((d.sii - 400.0).abs() < EPS);
        assert!((d.piv - 400.0).abs() < EPS);
    }

    #[test]
    fn test_liver_indices_worked_example() {
        let x = ClinicalInputs {
            ast: 40.0,
            alt: 25.0,
            platelets: 200.0,
            age: 30.0,
            ..Default::default()
        };
        let d = derive(&x, LmrDefinition::default());
        assert!((d.apri - 0.5).abs() < EPS);
        assert!((d.fib4 - 1.2).abs() < EPS);
    }

    #[test]
    fn test_hsi_and_uric_acid_ratio() {
        let x = ClinicalInputs {
            ast: 20.0,
            alt: 10.0,
            bmi: 21.0,
            uric_acid: 300.0,
            creatinine: 60.0,
            ..Default::default()
        };
        let d = derive(&x, LmrDefinition::default());
        assert!((d.hsi - 25.0).abs() < EPS);
        assert!((d.sua_scr - 5.0).abs() < EPS);
    }

    #[test]
    fn test_lmr_wbc_definition() {
        let d = derive(&blood_count(), LmrDefinition::LymphocyteWbc);
        assert!((d.lmr - 0.3).abs() < EPS);
    }

    #[test]
    fn test_fib4_zero_when_alt_or_platelets_zero() {
        for (ast, alt, plt) in [
            (40.0, 0.0, 200.0),
            (40.0, 25.0, 0.0),
            (0.0, 0.0, 0.0),
            (1e6, 0.0, 1e-9),
        ] {
            let x = ClinicalInputs {
                ast,
                alt,
                platelets: plt,
                age: 30.0,
                ..Default::default()
            };
            let fib4 = DerivedFeature::Fib4.compute(&x, LmrDefinition::default());
            assert_eq!(fib4, 0.0, "ast={ast} alt={alt} plt={plt}");
        }
    }

    #[test]
    fn test_hsi_zero_when_ast_not_positive() {
        let x = ClinicalInputs {
            ast: 0.0,
            alt: 30.0,
            bmi: 24.0,
            ..Default::default()
        };
        assert_eq!(DerivedFeature::Hsi.compute(&x, LmrDefinition::default()), 0.0);
    }

    #[test]
    fn test_safe_div_degenerate_divisors() {
        assert_eq!(safe_div(5.0, 0.0), 0.0);
        assert_eq!(safe_div(5.0, -2.0), 0.0);
        assert_eq!(safe_div(5.0, f64::NAN), 0.0);
        assert_eq!(safe_div(f64::MAX, 1e-300), 0.0);
        assert!((safe_div(6.0, 3.0) - 2.0).abs() < EPS);
    }

    #[test]
    fn test_derivation_always_finite() {
        let values = [0.0, -1.0, 1e-300, 1e300, f64::MAX, f64::NAN, 3.5];
        for &a in &values {
            for &b in &values {
                let x = ClinicalInputs {
                    wbc: a,
                    neutrophils: b,
                    monocytes: a,
                    lymphocytes: b,
                    platelets: a,
                    ast: b,
                    alt: a,
                    uric_acid: b,
                    creatinine: a,
                    bmi: b,
                    age: a,
                };
                for lmr in [LmrDefinition::LymphocyteMonocyte, LmrDefinition::LymphocyteWbc] {
                    for (feature, value) in derive(&x, lmr).iter() {
                        assert!(value.is_finite(), "{feature} not finite for a={a} b={b}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_deriver_requires_only_schema_inputs() {
        let schema =
            FeatureSchema::new(vec!["WBC".into(), "APRI".into(), "SUA/sCr".into()]).unwrap();
        let deriver = Deriver::for_schema(&schema, LmrDefinition::default());

        let record = RawRecord::new()
            .with("AST", 40.0)
            .with("Plt", 200.0)
            .with("UA", 300.0)
            .with("Cr", 60.0);
        assert_eq!(
            deriver.required_fields(&record),
            vec![
                ClinicalField::Platelets,
                ClinicalField::Ast,
                ClinicalField::UricAcid,
                ClinicalField::Creatinine
            ]
        );

        let derived = deriver.derive_record(&record).expect("derive");
        assert_eq!(derived.len(), 2);
        assert!((derived.get(DerivedFeature::Apri).unwrap() - 0.5).abs() < EPS);
        assert_eq!(derived.get(DerivedFeature::Lmr), None);
    }

    #[test]
    fn test_deriver_skips_features_supplied_raw() {
        let schema = FeatureSchema::new(vec!["FIB4".into()]).unwrap();
        let deriver = Deriver::for_schema(&schema, LmrDefinition::default());

        let record = RawRecord::new().with("FIB4", 0.9);
        assert!(deriver.required_fields(&record).is_empty());
        assert!(deriver.derive_record(&record).expect("derive").is_empty());
    }

    #[test]
    fn test_fib4_hyphenated_spelling_is_the_same_feature() {
        let schema = FeatureSchema::new(vec!["FIB-4".into()]).unwrap();
        let deriver = Deriver::for_schema(&schema, LmrDefinition::default());
        assert_eq!(deriver.wanted(), [DerivedFeature::Fib4]);

        let supplied = RawRecord::new().with("FIB-4", 0.9);
        assert_eq!(supplied.get("FIB4"), Some(0.9));
        assert!(deriver.required_fields(&supplied).is_empty());
        assert!(deriver.derive_record(&supplied).expect("derive").is_empty());
    }

    #[test]
    fn test_derive_batch_matches_row_by_row() {
        let deriver = Deriver::new(LmrDefinition::default());
        let full = |l: f64| {
            ClinicalField::ALL
                .into_iter()
                .map(|f| (f.name(), if f == ClinicalField::Lymphocytes { l } else { 1.5 }))
                .collect::<RawRecord>()
        };
        let rows = vec![full(3.0), RawRecord::new().with("WBC", 5.0), full(0.0)];

        let batch = deriver.derive_batch(&rows);
        assert_eq!(batch.len(), 3);
        for (i, (row, result)) in rows.iter().zip(&batch).enumerate() {
            match (deriver.derive_record(row), result) {
                (Ok(single), Ok(batched)) => assert_eq!(&single, batched),
                (Err(_), Err(PeRiskError::MalformedInput { row, .. })) => {
                    assert_eq!(*row, Some(i + 1));
                }
                other => panic!("row {i} diverged: {other:?}"),
            }
        }
        assert!(batch[1].is_err());
    }

    #[test]
    fn test_lmr_definition_parsing() {
        assert_eq!(
            "lymphocyte_wbc".parse::<LmrDefinition>().unwrap(),
            LmrDefinition::LymphocyteWbc
        );
        assert_eq!("L/M".parse::<LmrDefinition>().unwrap(), LmrDefinition::LymphocyteMonocyte);
        assert!("neutrophil".parse::<LmrDefinition>().is_err());
    }
}
