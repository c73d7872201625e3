//! Schema versioning and the upgrade of older `records` layouts.

use std::collections::{BTreeMap, BTreeSet};

use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use thiserror::Error;

use super::records::{insert_into, RECORD_COLUMNS};
use super::schema::{records_table, CREATE_SCHEMA_MIGRATIONS, RECORD_INDEXES, REPLACE_LEGACY_TABLE};
use super::{Database, DbError, DbResult};
use crate::models::{check_patient_id, now_timestamp, parse_blood_pressure, Field, HealthRecord};

/// Schema version written by this build.
pub const LATEST_SCHEMA_VERSION: i64 = 2;

/// Version of every `records` layout older than the current one: the first
/// release (`pulse`, Fahrenheit, combined blood pressure) and unversioned
/// `heart_rate` tables keyed by a surrogate `id`.
pub const LEGACY_SCHEMA_VERSION: i64 = 1;

/// Migration errors.
#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("legacy row {row} (id {legacy_id}) cannot be migrated: {failure}")]
    Row {
        row: usize,
        legacy_id: i64,
        failure: RowFailure,
    },

    #[error("store is recorded at schema version {version} but its records table is missing")]
    LegacyTableMissing { version: i64 },

    #[error("no migration path from schema version {found} (expected {expected})")]
    UnsupportedVersion { found: i64, expected: i64 },
}

/// Why one legacy row could not be converted.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{field}: {reason}")]
pub struct RowFailure {
    pub patient_id: Option<String>,
    pub field: String,
    pub reason: String,
}

impl RowFailure {
    fn new(patient_id: Option<&str>, field: &str, reason: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.map(str::to_string),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Where a store stands relative to [`LATEST_SCHEMA_VERSION`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaStatus {
    pub current_version: i64,
    pub target_version: i64,
    pub pending_versions: Vec<i64>,
    /// Version was deduced from the table shape of a store that predates
    /// version bookkeeping.
    pub inferred: bool,
    pub legacy_table_present: bool,
}

impl SchemaStatus {
    pub fn is_current(&self) -> bool {
        self.pending_versions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    AlreadyCurrent,
    Migrated { from: i64, to: i64, rows: usize },
}

/// One row of an older `records` table, keyed by source column name.
///
/// Values are kept as raw SQLite values: older tables never enforced their
/// column types, so text can turn up in numeric columns. Columns the source
/// table lacks read as NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRecord {
    /// Source rowid
    pub id: i64,
    values: BTreeMap<String, Value>,
}

static NULL: Value = Value::Null;

/// First-release column names and the fields that replaced them.
const RENAMED_COLUMNS: [(&str, Field); 4] = [
    ("pulse", Field::HeartRate),
    ("visit_reason", Field::VisitReasonCategory),
    ("parent_name", Field::ParentPrimaryName),
    ("parent_phone", Field::ParentPrimaryPhone),
];

impl LegacyRecord {
    pub fn from_columns<I, K>(id: i64, columns: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            id,
            values: columns.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }

    pub fn value(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&NULL)
    }

    /// Cell text of `column`; NULL and blank text read as `None`.
    fn text(&self, column: &str) -> Result<Option<String>, String> {
        let text = match self.value(column) {
            Value::Null => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(f) => Some(f.to_string()),
            Value::Text(t) => Some(t.clone()),
            Value::Blob(_) => return Err("binary value is not text".to_string()),
        };
        Ok(text.filter(|t| !t.trim().is_empty()))
    }

    /// First-release rows carry `pulse` and a Fahrenheit temperature.
    fn is_first_release(&self) -> bool {
        self.has_column("pulse") && !self.has_column("heart_rate")
    }
}

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Convert one row of an older layout to the current record shape.
///
/// Every column the source shares with the current table is carried over
/// through the field parsers; renamed columns, the Fahrenheit temperature
/// and the combined blood pressure have their own rules. Missing
/// timestamps are filled with `migrated_at`. The result must validate.
pub fn upgrade_legacy_row(
    legacy: &LegacyRecord,
    migrated_at: &str,
) -> Result<HealthRecord, RowFailure> {
    let patient_id = legacy
        .text("patient_id")
        .map_err(|reason| RowFailure::new(None, "patient_id", reason))?
        .ok_or_else(|| RowFailure::new(None, "patient_id", "is missing"))?;
    let pid = Some(patient_id.as_str());
    check_patient_id(&patient_id).map_err(|e| RowFailure::new(pid, "patient_id", e.reason))?;

    for field in Field::REQUIRED {
        let column = field.columns()[0];
        let value = legacy
            .text(column)
            .map_err(|reason| RowFailure::new(pid, column, reason))?;
        if value.is_none() {
            return Err(RowFailure::new(pid, column, "is required"));
        }
    }

    let mut record = HealthRecord::empty(patient_id.clone());
    for field in Field::ALL {
        if matches!(
            field,
            Field::PatientId | Field::Temperature | Field::BloodPressure
        ) {
            continue;
        }
        let column = field.columns()[0];
        if legacy.has_column(column) {
            copy_cell(legacy, &mut record, field, column)?;
        }
    }
    for (column, field) in RENAMED_COLUMNS {
        if legacy.has_column(column) && record.cell(field).is_empty() {
            copy_cell(legacy, &mut record, field, column)?;
        }
    }

    let fahrenheit = legacy.is_first_release();
    record.temperature = numeric(legacy.value("temperature"))
        .map_err(|reason| RowFailure::new(pid, "temperature", reason))?
        .map(|t| if fahrenheit { fahrenheit_to_celsius(t) } else { t });

    let (systolic, diastolic) =
        blood_pressure(legacy).map_err(|(column, reason)| RowFailure::new(pid, column, reason))?;
    record.blood_pressure_systolic = systolic;
    record.blood_pressure_diastolic = diastolic;

    if record.created_at.is_empty() {
        record.created_at = migrated_at.to_string();
    }
    if record.updated_at.is_empty() {
        record.updated_at = migrated_at.to_string();
    }

    record.finalize().map_err(|errors| match errors.first() {
        Some(e) => RowFailure::new(pid, &column_for(&e.field), e.reason.clone()),
        None => RowFailure::new(pid, "record", "is invalid"),
    })?;
    Ok(record)
}

/// Parse `column` of the source row into `field`.
fn copy_cell(
    legacy: &LegacyRecord,
    record: &mut HealthRecord,
    field: Field,
    column: &str,
) -> Result<(), RowFailure> {
    let result = match legacy.text(column) {
        Ok(text) => record.set_cell(field, text.as_deref()).map_err(|e| e.reason),
        Err(reason) => Err(reason),
    };
    result.map_err(|reason| RowFailure::new(Some(record.patient_id.as_str()), column, reason))
}

/// Split columns when the source has them, else the combined `"120/80"` text.
fn blood_pressure(
    legacy: &LegacyRecord,
) -> Result<(Option<i64>, Option<i64>), (&'static str, String)> {
    let systolic = whole(legacy.value("blood_pressure_systolic"))
        .map_err(|reason| ("blood_pressure_systolic", reason))?;
    let diastolic = whole(legacy.value("blood_pressure_diastolic"))
        .map_err(|reason| ("blood_pressure_diastolic", reason))?;
    if systolic.is_some() || diastolic.is_some() {
        return Ok((systolic, diastolic));
    }

    match legacy
        .text("blood_pressure")
        .map_err(|reason| ("blood_pressure", reason))?
    {
        None => Ok((None, None)),
        Some(text) => parse_blood_pressure(&text)
            .map(|(s, d)| (Some(s), Some(d)))
            .ok_or_else(|| {
                (
                    "blood_pressure",
                    format!("'{}' is not systolic/diastolic", text),
                )
            }),
    }
}

/// Relational column behind a field header.
fn column_for(header: &str) -> String {
    Field::from_header(header)
        .map(|f| f.columns()[0].to_string())
        .unwrap_or_else(|| header.to_string())
}

fn numeric(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(i) => Ok(Some(*i as f64)),
        Value::Real(f) => Ok(Some(*f)),
        Value::Text(text) if text.trim().is_empty() => Ok(None),
        Value::Text(text) => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(Some)
            .ok_or_else(|| format!("'{}' is not a number", text)),
        Value::Blob(_) => Err("binary value is not a number".to_string()),
    }
}

fn whole(value: &Value) -> Result<Option<i64>, String> {
    match numeric(value)? {
        None => Ok(None),
        Some(f) if f.fract() == 0.0 => Ok(Some(f as i64)),
        Some(f) => Err(format!("{} is not a whole number", f)),
    }
}

// =========================================================================
// Version bookkeeping
// =========================================================================

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let found: Option<String> = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?",
            [table],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

struct ColumnInfo {
    name: String,
    not_null: bool,
    primary_key: bool,
}

fn table_columns(conn: &Connection, table: &str) -> DbResult<Vec<ColumnInfo>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt.query_map([], |row| {
        Ok(ColumnInfo {
            name: row.get("name")?,
            not_null: row.get("notnull")?,
            primary_key: row.get::<_, i64>("pk")? > 0,
        })
    })?;
    columns.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

/// Exactly the current columns, keyed by `patient_id`, timestamps enforced.
fn has_current_layout(columns: &[ColumnInfo]) -> bool {
    let names: BTreeSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let expected: BTreeSet<&str> = RECORD_COLUMNS.iter().copied().collect();
    let column = |name: &str| columns.iter().find(|c| c.name == name);

    names == expected
        && column("patient_id").is_some_and(|c| c.primary_key)
        && column("created_at").is_some_and(|c| c.not_null)
        && column("updated_at").is_some_and(|c| c.not_null)
}

/// A `records` table that must be rebuilt before this build can use it.
fn has_older_layout(conn: &Connection) -> DbResult<bool> {
    Ok(table_exists(conn, "records")? && !has_current_layout(&table_columns(conn, "records")?))
}

fn record_version(conn: &Connection, version: i64, source: &str) -> DbResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at, source) VALUES (?, ?, ?)",
        params![version, now_timestamp(), source],
    )?;
    Ok(())
}

/// Highest recorded schema version, 0 when nothing is recorded.
pub fn current_schema_version(conn: &Connection) -> DbResult<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(Into::into)
}

/// Make sure version bookkeeping exists and return the store's version.
///
/// A fresh store is created at the latest version. A store without
/// bookkeeping gets its version inferred from the shape of `records`: only
/// the exact current layout counts as current, any other `pulse` or
/// `heart_rate` table is an older layout awaiting [`Database::migrate`].
pub(crate) fn bootstrap_schema_version(conn: &Connection) -> DbResult<i64> {
    conn.execute_batch(CREATE_SCHEMA_MIGRATIONS)?;
    let current = current_schema_version(conn)?;

    if !table_exists(conn, "records")? {
        if current != 0 && current != LATEST_SCHEMA_VERSION {
            // Leave it for `migrate` to report.
            return Ok(current);
        }
        conn.execute_batch(&records_table("records"))?;
        conn.execute_batch(RECORD_INDEXES)?;
        for version in 1..=LATEST_SCHEMA_VERSION {
            record_version(conn, version, "created")?;
        }
        return Ok(LATEST_SCHEMA_VERSION);
    }

    if current > 0 {
        return Ok(current);
    }

    let columns = table_columns(conn, "records")?;
    if has_current_layout(&columns) {
        for version in 1..=LATEST_SCHEMA_VERSION {
            record_version(conn, version, "inferred")?;
        }
        Ok(LATEST_SCHEMA_VERSION)
    } else if columns
        .iter()
        .any(|c| c.name == "pulse" || c.name == "heart_rate")
    {
        record_version(conn, LEGACY_SCHEMA_VERSION, "inferred")?;
        tracing::warn!(
            "found records table in an older layout; run the migration before using this store"
        );
        Ok(LEGACY_SCHEMA_VERSION)
    } else {
        Err(DbError::Schema(
            "records table matches no known schema version".to_string(),
        ))
    }
}

/// Every row of `records`, each with all of the table's columns.
fn read_legacy_rows(conn: &Connection) -> DbResult<Vec<LegacyRecord>> {
    let columns: Vec<String> = table_columns(conn, "records")?
        .into_iter()
        .map(|c| c.name)
        .collect();
    let select = columns
        .iter()
        .map(|c| format!("\"{}\"", c))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT rowid, {} FROM records ORDER BY rowid", select);

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        let mut values = Vec::with_capacity(columns.len());
        for (i, column) in columns.iter().enumerate() {
            values.push((column.as_str(), row.get::<_, Value>(i + 1)?));
        }
        Ok(LegacyRecord::from_columns(row.get(0)?, values))
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

// =========================================================================
// Database API
// =========================================================================

impl Database {
    pub fn schema_status(&self) -> DbResult<SchemaStatus> {
        let current_version = current_schema_version(&self.conn)?;
        let inferred: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM schema_migrations WHERE source = 'inferred')",
            [],
            |row| row.get(0),
        )?;
        let legacy_table_present = has_older_layout(&self.conn)?;

        Ok(SchemaStatus {
            current_version,
            target_version: LATEST_SCHEMA_VERSION,
            pending_versions: ((current_version + 1)..=LATEST_SCHEMA_VERSION).collect(),
            inferred,
            legacy_table_present,
        })
    }

    /// Upgrade the store to [`LATEST_SCHEMA_VERSION`].
    ///
    /// Rows are copied into a freshly built table by column intersection and
    /// validated on the way. The whole upgrade is one transaction: on any
    /// failure the store keeps its old table and every old row.
    pub fn migrate(&mut self) -> Result<MigrationOutcome, MigrationError> {
        let from = current_schema_version(&self.conn)?;
        if from == LATEST_SCHEMA_VERSION {
            tracing::info!(version = from, "schema already current");
            return Ok(MigrationOutcome::AlreadyCurrent);
        }
        if from != LEGACY_SCHEMA_VERSION {
            return Err(MigrationError::UnsupportedVersion {
                found: from,
                expected: LEGACY_SCHEMA_VERSION,
            });
        }
        if !table_exists(&self.conn, "records")? {
            return Err(MigrationError::LegacyTableMissing { version: from });
        }

        let migrated_at = now_timestamp();
        let tx = self.conn.transaction()?;
        tx.execute_batch(&records_table("records_v2"))?;

        let legacy_rows = read_legacy_rows(&tx)?;
        let rows = legacy_rows.len();
        for (index, legacy) in legacy_rows.into_iter().enumerate() {
            let legacy_id = legacy.id;
            let record = upgrade_legacy_row(&legacy, &migrated_at).map_err(|failure| {
                tracing::warn!(row = index + 1, legacy_id, %failure, "aborting migration");
                MigrationError::Row {
                    row: index + 1,
                    legacy_id,
                    failure,
                }
            })?;
            insert_into(&tx, "records_v2", &record)?;
        }

        tx.execute_batch(REPLACE_LEGACY_TABLE)?;
        tx.execute_batch(RECORD_INDEXES)?;
        record_version(&tx, LATEST_SCHEMA_VERSION, "migrated")?;
        tx.commit()?;

        tracing::info!(from, to = LATEST_SCHEMA_VERSION, rows, "migrated health record store");
        Ok(MigrationOutcome::Migrated {
            from,
            to: LATEST_SCHEMA_VERSION,
            rows,
        })
    }
}
