//! Tabular → store import (upsert by Patient ID).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};

use super::{BridgeError, BridgeResult};
use crate::db::{upsert_record, Database, DbError, UpsertOutcome};
use crate::models::{Field, FieldError, PatientIdGenerator, RecordPatch, ValidationErrors};

/// One rejected value in a skipped row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// 1-based data row number (the header row is not counted)
    pub row: usize,
    pub patient_id: Option<String>,
    pub field: String,
    pub reason: String,
}

/// Outcome of an import batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: Vec<RowError>,
}

impl ImportReport {
    /// Number of distinct rows skipped.
    pub fn skipped_rows(&self) -> usize {
        let mut rows: Vec<usize> = self.skipped.iter().map(|e| e.row).collect();
        rows.dedup();
        rows.len()
    }
}

fn resolve_headers(headers: &csv::StringRecord) -> BridgeResult<Vec<Field>> {
    let mut fields = Vec::with_capacity(headers.len());
    let mut errors: Vec<FieldError> = Vec::new();
    for header in headers.iter() {
        match Field::lookup(header.trim()) {
            Ok(field) => fields.push(field),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(fields)
    } else {
        Err(BridgeError::Headers(ValidationErrors(errors)))
    }
}

/// Import rows from CSV.
///
/// Rows whose `Patient ID` matches a stored record update it with their
/// non-blank cells; other rows become new records. Invalid rows are skipped
/// and reported. The batch is one transaction: a storage failure leaves the
/// store untouched.
pub fn import_from_reader<R: Read>(
    db: &mut Database,
    reader: R,
    ids: &mut PatientIdGenerator,
) -> BridgeResult<ImportReport> {
    db.ensure_current_schema()?;

    let mut csv_reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let fields = resolve_headers(csv_reader.headers()?)?;

    let mut report = ImportReport::default();
    let tx = db.transaction()?;

    for (index, result) in csv_reader.records().enumerate() {
        let row = index + 1;
        let cells = result?;
        let patch = RecordPatch::from_cells(fields.iter().copied().zip(cells.iter()));
        if patch.is_empty() {
            continue;
        }

        match upsert_record(&tx, &patch, ids) {
            Ok(UpsertOutcome::Inserted(record)) => {
                tracing::debug!(row, patient_id = %record.patient_id, "inserted");
                report.inserted += 1;
            }
            Ok(UpsertOutcome::Updated(record)) => {
                tracing::debug!(row, patient_id = %record.patient_id, "updated");
                report.updated += 1;
            }
            Err(DbError::Validation(errors)) => {
                tracing::warn!(row, %errors, "skipping row");
                let patient_id = patch.patient_id().map(str::to_string);
                report
                    .skipped
                    .extend(errors.0.into_iter().map(|e| RowError {
                        row,
                        patient_id: patient_id.clone(),
                        field: e.field,
                        reason: e.reason,
                    }));
            }
            Err(e) => return Err(e.into()),
        }
    }

    tx.commit()?;
    tracing::info!(
        inserted = report.inserted,
        updated = report.updated,
        skipped = report.skipped_rows(),
        "import finished"
    );
    Ok(report)
}

pub fn import_from_path(
    db: &mut Database,
    path: &Path,
    ids: &mut PatientIdGenerator,
) -> BridgeResult<ImportReport> {
    let file = File::open(path)?;
    import_from_reader(db, BufReader::new(file), ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_with(rows: &[&str]) -> String {
        let mut text = String::from("Patient ID,Full Name,Date of Visit,Time of Visit,Nurse Name/ID,Blood pressure (mmHg)\n");
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        text
    }

    #[test]
    fn test_import_inserts_and_parses_bp() {
        let mut db = Database::open_in_memory().unwrap();
        let mut ids = PatientIdGenerator::new();
        let input = csv_with(&["SID1,Ada Obi,2024-03-01,09:15,Nurse Joy,120/80"]);

        let report = import_from_reader(&mut db, input.as_bytes(), &mut ids).unwrap();
        assert_eq!(report.inserted, 1);

        let record = db.get_record("SID1").unwrap().unwrap();
        assert_eq!(record.blood_pressure_systolic, Some(120));
        assert_eq!(record.blood_pressure_diastolic, Some(80));
    }

    #[test]
    fn test_import_assigns_missing_ids() {
        let mut db = Database::open_in_memory().unwrap();
        let mut ids = PatientIdGenerator::new();
        let input = csv_with(&[
            ",Ada Obi,2024-03-01,09:15,Nurse Joy,",
            ",Ada Obi,2024-03-01,09:15,Nurse Joy,",
        ]);

        let report = import_from_reader(&mut db, input.as_bytes(), &mut ids).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(db.count_records().unwrap(), 2);
    }

    #[test]
    fn test_import_skips_invalid_rows() {
        let mut db = Database::open_in_memory().unwrap();
        let mut ids = PatientIdGenerator::new();
        let input = csv_with(&[
            "SID1,Ada Obi,2024-03-01,09:15,Nurse Joy,",
            "SID2,Bo Lee,not-a-date,09:15,,",
            "SID3,Cy Dunn,2024-03-02,10:00,Nurse Joy,",
        ]);

        let report = import_from_reader(&mut db, input.as_bytes(), &mut ids).unwrap();
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped_rows(), 1);
        assert!(report.skipped.iter().all(|e| e.row == 2));
        assert!(report
            .skipped
            .iter()
            .any(|e| e.field == Field::DateOfVisit.header()));
        assert!(db.get_record("SID2").unwrap().is_none());
    }

    #[test]
    fn test_import_rejects_unknown_headers() {
        let mut db = Database::open_in_memory().unwrap();
        let mut ids = PatientIdGenerator::new();
        let input = "Patient ID,Ful Name\nSID1,Ada\n";

        let err = import_from_reader(&mut db, input.as_bytes(), &mut ids).unwrap_err();
        match err {
            BridgeError::Headers(errors) => {
                assert_eq!(errors.0.len(), 1);
                assert!(errors.0[0].reason.contains("Full Name"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(db.count_records().unwrap(), 0);
    }
}
