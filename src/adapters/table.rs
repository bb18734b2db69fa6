//! CSV table adapter: batch input and result export.
//!
//! One row per subject, one column per measurement. Cells are kept verbatim
//! for export; numeric cells also populate the row's [`RawRecord`].

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::application::{BatchReport, RowOutcome};
use crate::domain::RawRecord;
use crate::Result;

/// Column appended with the predicted probability.
pub const PROBABILITY_COLUMN: &str = "predicted_probability";

/// Column appended with the risk label (or the row's error).
pub const RISK_LEVEL_COLUMN: &str = "risk_level";

/// A parsed batch table.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    /// Verbatim cells, padded to `columns.len()`
    pub cells: Vec<Vec<String>>,
    /// Numeric view of each row
    pub records: Vec<RawRecord>,
}

impl Table {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Read a CSV table with a header row.
///
/// Empty cells are absent from the record. Non-numeric cells are absent too
/// and logged at warn level with their row and column. When two headers fold
/// onto the same field, the first column wins.
///
/// # Errors
/// Returns `PeRiskError::Csv` if the input is not valid CSV.
pub fn read_table<R: Read>(reader: R) -> Result<Table> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<String> = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == 0 {
                h.trim_start_matches('\u{feff}').to_string()
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut seen = HashSet::new();
    for column in &columns {
        let key = crate::domain::record::canonical_column(column);
        if !seen.insert(key.to_string()) {
            tracing::warn!("duplicate column '{}' (as '{}'); keeping first", column, key);
        }
    }

    let mut table = Table {
        columns,
        ..Table::default()
    };

    for (i, row) in rdr.records().enumerate() {
        let row = row?;
        let row_no = i + 1;
        if row.len() > table.columns.len() {
            tracing::warn!(
                "row {} has {} cells for {} columns; extra cells ignored",
                row_no,
                row.len(),
                table.columns.len()
            );
        }

        let mut cells = Vec::with_capacity(table.columns.len());
        let mut record = RawRecord::new();
        for (idx, column) in table.columns.iter().enumerate() {
            let cell = row.get(idx).unwrap_or("");
            cells.push(cell.to_string());
            if cell.is_empty() {
                continue;
            }
            match cell.parse::<f64>() {
                Ok(value) if value.is_finite() => {
                    record.insert(column, value);
                }
                _ => {
                    tracing::warn!(
                        "row {}: column '{}' value '{}' is not numeric; treated as absent",
                        row_no,
                        column,
                        cell
                    );
                }
            }
        }
        table.cells.push(cells);
        table.records.push(record);
    }

    tracing::debug!(
        "Read table with {} columns and {} rows",
        table.columns.len(),
        table.len()
    );
    Ok(table)
}

/// Read a CSV table from a file.
///
/// # Errors
/// Returns an error if the file cannot be opened or parsed.
pub fn read_table_path(path: &Path) -> Result<Table> {
    read_table(File::open(path)?)
}

/// Write the input table with probability and risk columns appended.
///
/// Failed rows keep an empty probability and `ERROR: <reason>` as risk.
///
/// # Errors
/// Returns `PeRiskError::Csv` on write failure.
pub fn write_report<W: Write>(writer: W, table: &Table, report: &BatchReport) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = table.columns.iter().map(String::as_str).collect();
    header.push(PROBABILITY_COLUMN);
    header.push(RISK_LEVEL_COLUMN);
    wtr.write_record(&header)?;

    for (cells, outcome) in table.cells.iter().zip(report.outcomes()) {
        let (probability, risk) = match outcome {
            RowOutcome::Scored(a) => (format!("{:.6}", a.probability), a.risk_level.to_string()),
            RowOutcome::Failed(e) => (String::new(), format!("ERROR: {e}")),
        };
        let mut record: Vec<&str> = cells.iter().map(String::as_str).collect();
        record.push(&probability);
        record.push(&risk);
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

/// Write the report CSV to a file.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_report_path(path: &Path, table: &Table, report: &BatchReport) -> Result<()> {
    write_report(File::create(path)?, table, report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClinicalField;

    #[test]
    fn test_read_table_parses_numeric_cells() {
        let csv = "\u{feff}ID,WBC,BMI,note\nS1,10.5,22,ok\nS2,,23.5,\n";
        let table = read_table(csv.as_bytes()).expect("read");

        assert_eq!(table.columns, vec!["ID", "WBC", "BMI", "note"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].field(ClinicalField::Wbc), Some(10.5));
        assert_eq!(table.records[0].field(ClinicalField::PrePregnancyBmi), Some(22.0));
        assert!(!table.records[0].contains("ID"));
        assert_eq!(table.records[1].field(ClinicalField::Wbc), None);
        assert_eq!(table.cells[1], vec!["S2", "", "23.5", ""]);
    }

    #[test]
    fn test_short_rows_are_padded() {
        let table = read_table("A,B,C\n1,2\n".as_bytes()).expect("read");
        assert_eq!(table.cells[0], vec!["1", "2", ""]);
        assert!(!table.records[0].contains("C"));
    }

    #[test]
    fn test_non_finite_cells_are_absent() {
        let table = read_table("A,B\nNaN,inf\n".as_bytes()).expect("read");
        assert!(table.records[0].is_empty());
    }
}
