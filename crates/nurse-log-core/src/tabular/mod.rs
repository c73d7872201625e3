//! Tabular health log file (CSV, one header row, one row per record).
//!
//! Every operation loads the whole file, works in memory and rewrites it
//! through a temporary file, so a failed operation leaves the file as it was.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use csv::{Reader, StringRecord, Writer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use thiserror::Error;

use crate::models::{
    Field, FieldError, HealthRecord, PatientIdGenerator, RecordPatch, ValidationErrors,
};

/// Tabular file errors.
#[derive(Error, Debug)]
pub enum TabularError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{} does not exist; run init first", .0.display())]
    MissingFile(PathBuf),

    #[error("{} has unexpected headers (found {} columns, expected {})", .path.display(), .found.len(), Field::ALL.len())]
    HeaderMismatch { path: PathBuf, found: Vec<String> },

    #[error("No record with Patient ID {0}")]
    NotFound(String),

    #[error("Duplicate Patient ID: {0}")]
    Duplicate(String),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),
}

pub type TabularResult<T> = Result<T, TabularError>;

/// One data row, cells in [`Field::ALL`] order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    cells: Vec<String>,
}

impl SheetRow {
    pub fn from_record(record: &HealthRecord) -> Self {
        Self {
            cells: record.cells(),
        }
    }

    fn from_csv(record: &StringRecord) -> Self {
        Self {
            cells: record.iter().map(str::to_string).collect(),
        }
    }

    /// Cell text for `field`; empty when absent.
    pub fn get(&self, field: Field) -> &str {
        self.cells
            .get(field.index())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn patient_id(&self) -> &str {
        self.get(Field::PatientId)
    }

    pub fn cells(&self) -> &[String] {
        &self.cells
    }

    /// Parse every cell into a record, collecting all failures.
    pub fn to_record(&self) -> Result<HealthRecord, ValidationErrors> {
        let mut record = HealthRecord::empty(String::new());
        let errors: Vec<FieldError> = Field::ALL
            .iter()
            .filter_map(|field| record.set_cell(*field, Some(self.get(*field))).err())
            .collect();
        if errors.is_empty() {
            Ok(record)
        } else {
            Err(ValidationErrors(errors))
        }
    }
}

/// Serializes as an object keyed by header, in column order.
impl Serialize for SheetRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Field::ALL.len()))?;
        for field in Field::ALL {
            map.serialize_entry(field.header(), self.get(field))?;
        }
        map.end()
    }
}

/// True when every criterion matches its cell.
///
/// `exact` compares whole cells case-sensitively; otherwise a criterion
/// matches any cell containing it, ignoring case. Empty cells never match.
pub fn row_matches(row: &SheetRow, criteria: &[(Field, String)], exact: bool) -> bool {
    criteria.iter().all(|(field, wanted)| {
        let cell = row.get(*field);
        if cell.is_empty() {
            return false;
        }
        if exact {
            cell == wanted
        } else {
            cell.to_lowercase().contains(&wanted.to_lowercase())
        }
    })
}

/// What [`TabularFile::init`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Created,
    Existing { headers_match: bool },
}

/// Handle to the health log file.
#[derive(Debug, Clone)]
pub struct TabularFile {
    path: PathBuf,
}

impl TabularFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with the fixed header row. An existing file is left
    /// alone; a header mismatch is only reported.
    pub fn init(&self) -> TabularResult<InitOutcome> {
        if self.path.exists() {
            let found = self.read_headers()?;
            let headers_match = headers_match(&found);
            if headers_match {
                tracing::info!(path = %self.path.display(), "health log already exists");
            } else {
                tracing::warn!(
                    path = %self.path.display(),
                    columns = found.len(),
                    "health log exists but its headers differ from the expected set"
                );
            }
            return Ok(InitOutcome::Existing { headers_match });
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        self.save(&[])?;
        tracing::info!(path = %self.path.display(), "created health log");
        Ok(InitOutcome::Created)
    }

    fn read_headers(&self) -> TabularResult<Vec<String>> {
        let mut reader = self.reader()?;
        Ok(reader.headers()?.iter().map(str::to_string).collect())
    }

    fn reader(&self) -> TabularResult<Reader<BufReader<File>>> {
        let file = File::open(&self.path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TabularError::MissingFile(self.path.clone()),
            _ => TabularError::Io(e),
        })?;
        Ok(Reader::from_reader(BufReader::new(file)))
    }

    /// Read every row, verifying the header row first.
    pub fn load(&self) -> TabularResult<Vec<SheetRow>> {
        let mut reader = self.reader()?;
        let found: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if !headers_match(&found) {
            return Err(TabularError::HeaderMismatch {
                path: self.path.clone(),
                found,
            });
        }

        let mut rows = Vec::new();
        for result in reader.records() {
            rows.push(SheetRow::from_csv(&result?));
        }
        Ok(rows)
    }

    /// Rewrite the whole file through a temporary sibling.
    fn save(&self, rows: &[SheetRow]) -> TabularResult<()> {
        let temp_path = self.path.with_extension("csv.tmp");
        {
            let mut writer = Writer::from_writer(BufWriter::new(File::create(&temp_path)?));
            writer.write_record(Field::headers())?;
            for row in rows {
                writer.write_record(row.cells())?;
            }
            writer.flush()?;
        }
        fs::rename(&temp_path, &self.path)?;
        tracing::debug!(path = %self.path.display(), rows = rows.len(), "wrote health log");
        Ok(())
    }

    /// Append a validated record, generating its Patient ID when absent.
    pub fn add(
        &self,
        patch: &RecordPatch,
        ids: &mut PatientIdGenerator,
    ) -> TabularResult<HealthRecord> {
        let mut rows = self.load()?;
        let taken: HashSet<String> = rows.iter().map(|r| r.patient_id().to_string()).collect();

        let mut record = HealthRecord::empty(String::new());
        patch.apply_to(&mut record)?;

        if record.patient_id.is_empty() {
            record.patient_id = ids.generate(&record.full_name, |id| taken.contains(id));
        } else if taken.contains(&record.patient_id) {
            return Err(TabularError::Duplicate(record.patient_id));
        }
        record.touch_created();
        record.finalize()?;

        rows.push(SheetRow::from_record(&record));
        self.save(&rows)?;
        tracing::info!(patient_id = %record.patient_id, "added record");
        Ok(record)
    }

    pub fn list(&self) -> TabularResult<Vec<SheetRow>> {
        self.load()
    }

    /// Rows matching every criterion; see [`row_matches`].
    pub fn find(&self, criteria: &[(Field, String)], exact: bool) -> TabularResult<Vec<SheetRow>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|row| row_matches(row, criteria, exact))
            .collect())
    }

    /// Merge `patch` into the row with this Patient ID.
    pub fn update(&self, patient_id: &str, patch: &RecordPatch) -> TabularResult<HealthRecord> {
        let mut rows = self.load()?;
        let index = rows
            .iter()
            .position(|r| r.patient_id() == patient_id)
            .ok_or_else(|| TabularError::NotFound(patient_id.to_string()))?;

        patch
            .check_identity(patient_id)
            .map_err(ValidationErrors::from)?;
        let mut patch = patch.clone();
        patch.remove(Field::CreatedAt);
        patch.remove(Field::UpdatedAt);

        let mut record = rows[index].to_record()?;
        patch.apply_to(&mut record)?;
        record.touch_updated();
        record.finalize()?;

        rows[index] = SheetRow::from_record(&record);
        self.save(&rows)?;
        tracing::info!(patient_id, "updated record");
        Ok(record)
    }

    /// Remove exactly the row with this Patient ID.
    pub fn delete(&self, patient_id: &str) -> TabularResult<()> {
        let mut rows = self.load()?;
        let index = rows
            .iter()
            .position(|r| r.patient_id() == patient_id)
            .ok_or_else(|| TabularError::NotFound(patient_id.to_string()))?;

        rows.remove(index);
        self.save(&rows)?;
        tracing::info!(patient_id, "deleted record");
        Ok(())
    }
}

fn headers_match(found: &[String]) -> bool {
    found.len() == Field::ALL.len()
        && found
            .iter()
            .zip(Field::ALL)
            .all(|(header, field)| header.trim() == field.header())
}
