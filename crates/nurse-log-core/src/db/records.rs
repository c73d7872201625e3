//! Health record database operations.

use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};

use super::{Database, DbError, DbResult};
use crate::models::{
    now_timestamp, Field, HealthRecord, PatientIdGenerator, RecordPatch, ValidationErrors,
};

/// Relational columns in the order [`record_params`] binds them.
/// `patient_id` must stay first; the UPDATE statement keys on `?1`.
pub const RECORD_COLUMNS: [&str; 64] = [
    "patient_id",
    "full_name",
    "date_of_birth",
    "age",
    "gender",
    "grade_level",
    "house_section",
    "parent_primary_name",
    "parent_primary_phone",
    "parent_secondary_name",
    "parent_secondary_phone",
    "emergency_contact_name",
    "emergency_contact_phone",
    "homeroom_teacher",
    "academic_year",
    "academic_term",
    "date_of_visit",
    "time_of_visit",
    "brought_in_by",
    "nurse_name",
    "visit_reason_category",
    "severity_level",
    "visit_details",
    "temperature",
    "heart_rate",
    "respiratory_rate",
    "oxygen_saturation",
    "blood_pressure_systolic",
    "blood_pressure_diastolic",
    "height",
    "weight",
    "bmi",
    "pain_scale",
    "pain_location",
    "presenting_complaints",
    "other_complaint_details",
    "complaint_background",
    "past_medical_history",
    "known_allergies",
    "current_medications",
    "special_medical_needs",
    "chronic_conditions_alert",
    "chronic_conditions",
    "nurse_observations",
    "interventions_provided",
    "medications_administered",
    "next_steps",
    "other_next_step_details",
    "referral_type",
    "follow_up_date",
    "admission_date",
    "admission_time",
    "condition_on_admission",
    "plan_of_care",
    "discharge_time",
    "condition_at_discharge",
    "discharge_instructions",
    "return_to_class_time",
    "parent_notified",
    "parent_notification_time",
    "incident_report_required",
    "notes",
    "created_at",
    "updated_at",
];

/// Result of an insert-or-update keyed by patient ID.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Inserted(HealthRecord),
    Updated(HealthRecord),
}

impl UpsertOutcome {
    pub fn record(&self) -> &HealthRecord {
        match self {
            UpsertOutcome::Inserted(r) | UpsertOutcome::Updated(r) => r,
        }
    }
}

/// One page of records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPage {
    pub items: Vec<HealthRecord>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub pages: usize,
}

fn record_params(r: &HealthRecord) -> [&dyn ToSql; 64] {
    [
        &r.patient_id,
        &r.full_name,
        &r.date_of_birth,
        &r.age,
        &r.gender,
        &r.grade_level,
        &r.house_section,
        &r.parent_primary_name,
        &r.parent_primary_phone,
        &r.parent_secondary_name,
        &r.parent_secondary_phone,
        &r.emergency_contact_name,
        &r.emergency_contact_phone,
        &r.homeroom_teacher,
        &r.academic_year,
        &r.academic_term,
        &r.date_of_visit,
        &r.time_of_visit,
        &r.brought_in_by,
        &r.nurse_name,
        &r.visit_reason_category,
        &r.severity_level,
        &r.visit_details,
        &r.temperature,
        &r.heart_rate,
        &r.respiratory_rate,
        &r.oxygen_saturation,
        &r.blood_pressure_systolic,
        &r.blood_pressure_diastolic,
        &r.height,
        &r.weight,
        &r.bmi,
        &r.pain_scale,
        &r.pain_location,
        &r.presenting_complaints,
        &r.other_complaint_details,
        &r.complaint_background,
        &r.past_medical_history,
        &r.known_allergies,
        &r.current_medications,
        &r.special_medical_needs,
        &r.chronic_conditions_alert,
        &r.chronic_conditions,
        &r.nurse_observations,
        &r.interventions_provided,
        &r.medications_administered,
        &r.next_steps,
        &r.other_next_step_details,
        &r.referral_type,
        &r.follow_up_date,
        &r.admission_date,
        &r.admission_time,
        &r.condition_on_admission,
        &r.plan_of_care,
        &r.discharge_time,
        &r.condition_at_discharge,
        &r.discharge_instructions,
        &r.return_to_class_time,
        &r.parent_notified,
        &r.parent_notification_time,
        &r.incident_report_required,
        &r.notes,
        &r.created_at,
        &r.updated_at,
    ]
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<HealthRecord> {
    Ok(HealthRecord {
        patient_id: row.get("patient_id")?,
        full_name: row.get("full_name")?,
        date_of_birth: row.get("date_of_birth")?,
        age: row.get("age")?,
        gender: row.get("gender")?,
        grade_level: row.get("grade_level")?,
        house_section: row.get("house_section")?,
        parent_primary_name: row.get("parent_primary_name")?,
        parent_primary_phone: row.get("parent_primary_phone")?,
        parent_secondary_name: row.get("parent_secondary_name")?,
        parent_secondary_phone: row.get("parent_secondary_phone")?,
        emergency_contact_name: row.get("emergency_contact_name")?,
        emergency_contact_phone: row.get("emergency_contact_phone")?,
        homeroom_teacher: row.get("homeroom_teacher")?,
        academic_year: row.get("academic_year")?,
        academic_term: row.get("academic_term")?,
        date_of_visit: row.get("date_of_visit")?,
        time_of_visit: row.get("time_of_visit")?,
        brought_in_by: row.get("brought_in_by")?,
        nurse_name: row.get("nurse_name")?,
        visit_reason_category: row.get("visit_reason_category")?,
        severity_level: row.get("severity_level")?,
        visit_details: row.get("visit_details")?,
        temperature: row.get("temperature")?,
        heart_rate: row.get("heart_rate")?,
        respiratory_rate: row.get("respiratory_rate")?,
        oxygen_saturation: row.get("oxygen_saturation")?,
        blood_pressure_systolic: row.get("blood_pressure_systolic")?,
        blood_pressure_diastolic: row.get("blood_pressure_diastolic")?,
        height: row.get("height")?,
        weight: row.get("weight")?,
        bmi: row.get("bmi")?,
        pain_scale: row.get("pain_scale")?,
        pain_location: row.get("pain_location")?,
        presenting_complaints: row.get("presenting_complaints")?,
        other_complaint_details: row.get("other_complaint_details")?,
        complaint_background: row.get("complaint_background")?,
        past_medical_history: row.get("past_medical_history")?,
        known_allergies: row.get("known_allergies")?,
        current_medications: row.get("current_medications")?,
        special_medical_needs: row.get("special_medical_needs")?,
        chronic_conditions_alert: row.get("chronic_conditions_alert")?,
        chronic_conditions: row.get("chronic_conditions")?,
        nurse_observations: row.get("nurse_observations")?,
        interventions_provided: row.get("interventions_provided")?,
        medications_administered: row.get("medications_administered")?,
        next_steps: row.get("next_steps")?,
        other_next_step_details: row.get("other_next_step_details")?,
        referral_type: row.get("referral_type")?,
        follow_up_date: row.get("follow_up_date")?,
        admission_date: row.get("admission_date")?,
        admission_time: row.get("admission_time")?,
        condition_on_admission: row.get("condition_on_admission")?,
        plan_of_care: row.get("plan_of_care")?,
        discharge_time: row.get("discharge_time")?,
        condition_at_discharge: row.get("condition_at_discharge")?,
        discharge_instructions: row.get("discharge_instructions")?,
        return_to_class_time: row.get("return_to_class_time")?,
        parent_notified: row.get("parent_notified")?,
        parent_notification_time: row.get("parent_notification_time")?,
        incident_report_required: row.get("incident_report_required")?,
        notes: row.get("notes")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn select_columns() -> String {
    RECORD_COLUMNS.join(", ")
}

// =========================================================================
// Connection-level operations (usable inside a transaction)
// =========================================================================

/// Insert a record as-is into `table`. No validation.
pub(crate) fn insert_into(conn: &Connection, table: &str, record: &HealthRecord) -> DbResult<()> {
    let placeholders = (1..=RECORD_COLUMNS.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        select_columns(),
        placeholders
    );
    conn.execute(&sql, &record_params(record)[..])?;
    Ok(())
}

/// Overwrite every column of the record with the same patient ID.
fn replace_record(conn: &Connection, record: &HealthRecord) -> DbResult<bool> {
    let assignments = RECORD_COLUMNS
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, col)| format!("{} = ?{}", col, i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("UPDATE records SET {} WHERE patient_id = ?1", assignments);
    let rows_affected = conn.execute(&sql, &record_params(record)[..])?;
    Ok(rows_affected > 0)
}

pub(crate) fn fetch_record(conn: &Connection, patient_id: &str) -> DbResult<Option<HealthRecord>> {
    let sql = format!(
        "SELECT {} FROM records WHERE patient_id = ?",
        select_columns()
    );
    conn.query_row(&sql, [patient_id], record_from_row)
        .optional()
        .map_err(Into::into)
}

pub(crate) fn record_exists(conn: &Connection, patient_id: &str) -> DbResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM records WHERE patient_id = ?",
            [patient_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn unique_patient_id(
    conn: &Connection,
    ids: &mut PatientIdGenerator,
    full_name: &str,
) -> DbResult<String> {
    loop {
        let candidate = ids.generate(full_name, |_| false);
        if !record_exists(conn, &candidate)? {
            return Ok(candidate);
        }
    }
}

/// Timestamps are owned by the store once a record exists.
fn without_bookkeeping(patch: &RecordPatch) -> RecordPatch {
    let mut patch = patch.clone();
    patch.remove(Field::CreatedAt);
    patch.remove(Field::UpdatedAt);
    patch
}

/// Build a validated new record from a patch, assigning an ID and
/// timestamps where the patch leaves them out.
fn new_record_from_patch(
    conn: &Connection,
    patch: &RecordPatch,
    ids: &mut PatientIdGenerator,
) -> DbResult<HealthRecord> {
    let mut record = HealthRecord::empty(String::new());
    patch.apply_to(&mut record)?;

    if record.patient_id.is_empty() {
        record.patient_id = unique_patient_id(conn, ids, &record.full_name)?;
    }
    if record.created_at.is_empty() {
        record.created_at = now_timestamp();
    }
    if record.updated_at.is_empty() {
        record.updated_at = record.created_at.clone();
    }

    record.finalize()?;
    Ok(record)
}

/// Insert-or-update keyed by patient ID.
///
/// For an existing record only the fields present in `patch` change;
/// bookkeeping timestamps are managed by the store and never taken from the
/// patch on update.
pub fn upsert_record(
    conn: &Connection,
    patch: &RecordPatch,
    ids: &mut PatientIdGenerator,
) -> DbResult<UpsertOutcome> {
    if let Some(patient_id) = patch.patient_id() {
        if let Some(mut existing) = fetch_record(conn, patient_id)? {
            let patch = without_bookkeeping(patch);
            patch.apply_to(&mut existing)?;
            existing.touch_updated();
            existing.finalize()?;
            replace_record(conn, &existing)?;
            return Ok(UpsertOutcome::Updated(existing));
        }
    }

    let record = new_record_from_patch(conn, patch, ids)?;
    insert_into(conn, "records", &record)?;
    Ok(UpsertOutcome::Inserted(record))
}

// =========================================================================
// Database API
// =========================================================================

impl Database {
    /// Create a record from a patch, generating a patient ID when absent.
    pub fn create_record(
        &self,
        patch: &RecordPatch,
        ids: &mut PatientIdGenerator,
    ) -> DbResult<HealthRecord> {
        if let Some(patient_id) = patch.patient_id() {
            if record_exists(&self.conn, patient_id)? {
                return Err(DbError::Duplicate(patient_id.to_string()));
            }
        }
        let record = new_record_from_patch(&self.conn, patch, ids)?;
        insert_into(&self.conn, "records", &record)?;
        Ok(record)
    }

    /// Insert a fully-built record after validating it.
    pub fn insert_record(&self, record: &HealthRecord) -> DbResult<HealthRecord> {
        let mut record = record.clone();
        if record.created_at.is_empty() {
            record.touch_created();
        }
        record.finalize()?;

        if record_exists(&self.conn, &record.patient_id)? {
            return Err(DbError::Duplicate(record.patient_id));
        }
        insert_into(&self.conn, "records", &record)?;
        Ok(record)
    }

    /// Get a record by patient ID.
    pub fn get_record(&self, patient_id: &str) -> DbResult<Option<HealthRecord>> {
        fetch_record(&self.conn, patient_id)
    }

    /// Merge a patch into an existing record. The patient ID cannot change.
    pub fn update_record(&self, patient_id: &str, patch: &RecordPatch) -> DbResult<HealthRecord> {
        let mut record = fetch_record(&self.conn, patient_id)?
            .ok_or_else(|| DbError::NotFound(patient_id.to_string()))?;

        patch
            .check_identity(patient_id)
            .map_err(ValidationErrors::from)?;
        let patch = without_bookkeeping(patch);
        patch.apply_to(&mut record)?;
        record.touch_updated();
        record.finalize()?;

        replace_record(&self.conn, &record)?;
        Ok(record)
    }

    /// Insert-or-update keyed by patient ID; see [`upsert_record`].
    pub fn upsert_record(
        &self,
        patch: &RecordPatch,
        ids: &mut PatientIdGenerator,
    ) -> DbResult<UpsertOutcome> {
        upsert_record(&self.conn, patch, ids)
    }

    /// Delete a record by patient ID.
    pub fn delete_record(&self, patient_id: &str) -> DbResult<()> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM records WHERE patient_id = ?", [patient_id])?;
        if rows_affected == 0 {
            return Err(DbError::NotFound(patient_id.to_string()));
        }
        Ok(())
    }

    /// All records, most recent visit first.
    pub fn list_records(&self) -> DbResult<Vec<HealthRecord>> {
        let sql = format!(
            "SELECT {} FROM records ORDER BY date_of_visit DESC, time_of_visit DESC",
            select_columns()
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], record_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_records(&self) -> DbResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// One page of all records, most recent visit first. Pages are 1-based.
    pub fn list_page(&self, page: usize, per_page: usize) -> DbResult<RecordPage> {
        self.search_records("", page, per_page)
    }

    /// Substring search over name, patient ID and nurse, paginated.
    pub fn search_records(
        &self,
        term: &str,
        page: usize,
        per_page: usize,
    ) -> DbResult<RecordPage> {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let pattern = format!("%{}%", term);
        let filter = "full_name LIKE ?1 OR patient_id LIKE ?1 OR nurse_name LIKE ?1";

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM records WHERE {}", filter),
            [&pattern],
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {} FROM records WHERE {}
             ORDER BY date_of_visit DESC, time_of_visit DESC
             LIMIT ?2 OFFSET ?3",
            select_columns(),
            filter
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let offset = (page - 1) * per_page;
        let rows = stmt.query_map(
            params![pattern, per_page as i64, offset as i64],
            record_from_row,
        )?;
        let items = rows.collect::<Result<Vec<_>, _>>()?;

        let total = total as usize;
        Ok(RecordPage {
            items,
            total,
            page,
            per_page,
            pages: total.div_ceil(per_page),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn visit(id: &str, name: &str, date: &str) -> HealthRecord {
        HealthRecord::new(
            id.into(),
            name.into(),
            date.into(),
            "09:15".into(),
            "Nurse Joy".into(),
        )
    }

    #[test]
    fn test_columns_match_field_table() {
        let from_fields: Vec<&str> = Field::ALL.iter().flat_map(|f| f.columns()).copied().collect();
        assert_eq!(from_fields, RECORD_COLUMNS.to_vec());
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut record = visit("SID1", "Ada Obi", "2024-03-01");
        record.temperature = Some(37.4);
        record.blood_pressure_systolic = Some(110);
        record.blood_pressure_diastolic = Some(70);
        record.parent_notified = true;

        db.insert_record(&record).unwrap();

        let retrieved = db.get_record("SID1").unwrap().unwrap();
        assert_eq!(retrieved, record);
    }

    #[test]
    fn test_insert_rejects_invalid() {
        let db = setup_db();
        let mut record = visit("SID1", "Ada Obi", "2024-03-01");
        record.nurse_name.clear();

        let err = db.insert_record(&record).unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        assert_eq!(db.count_records().unwrap(), 0);
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let db = setup_db();
        db.insert_record(&visit("SID1", "Ada Obi", "2024-03-01")).unwrap();

        let err = db.insert_record(&visit("SID1", "Bo Lee", "2024-03-02")).unwrap_err();
        assert!(matches!(err, DbError::Duplicate(id) if id == "SID1"));
    }

    #[test]
    fn test_create_generates_id() {
        let db = setup_db();
        let mut ids = PatientIdGenerator::new();
        let mut patch = RecordPatch::new();
        patch
            .set(Field::FullName, "Ada Obi")
            .set(Field::DateOfVisit, "2024-03-01")
            .set(Field::TimeOfVisit, "09:15")
            .set(Field::NurseName, "Nurse Joy");

        let record = db.create_record(&patch, &mut ids).unwrap();
        assert!(record.patient_id.starts_with("SID"));
        assert!(db.get_record(&record.patient_id).unwrap().is_some());
    }

    #[test]
    fn test_update_record() {
        let db = setup_db();
        db.insert_record(&visit("SID1", "Ada Obi", "2024-03-01")).unwrap();

        let mut patch = RecordPatch::new();
        patch.set(Field::Height, "60").set(Field::Weight, "100");
        let updated = db.update_record("SID1", &patch).unwrap();

        assert_eq!(updated.bmi, Some(19.53));
        assert_eq!(db.get_record("SID1").unwrap().unwrap().height, Some(60.0));
    }

    #[test]
    fn test_update_cannot_change_id() {
        let db = setup_db();
        db.insert_record(&visit("SID1", "Ada Obi", "2024-03-01")).unwrap();

        let mut patch = RecordPatch::new();
        patch.set(Field::PatientId, "SID2");
        assert!(matches!(
            db.update_record("SID1", &patch),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_update_missing() {
        let db = setup_db();
        let err = db.update_record("nope", &RecordPatch::new()).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn test_delete_record() {
        let db = setup_db();
        db.insert_record(&visit("SID1", "Ada Obi", "2024-03-01")).unwrap();
        db.insert_record(&visit("SID2", "Bo Lee", "2024-03-02")).unwrap();

        db.delete_record("SID1").unwrap();
        assert!(db.get_record("SID1").unwrap().is_none());
        assert!(db.get_record("SID2").unwrap().is_some());

        assert!(matches!(db.delete_record("SID1"), Err(DbError::NotFound(_))));
        assert_eq!(db.count_records().unwrap(), 1);
    }

    #[test]
    fn test_upsert_merges_non_blank() {
        let db = setup_db();
        let mut record = visit("SID1", "Ada Obi", "2024-03-01");
        record.known_allergies = Some("Peanuts".into());
        db.insert_record(&record).unwrap();

        let patch = RecordPatch::from_cells(vec![
            (Field::PatientId, "SID1"),
            (Field::KnownAllergies, ""),
            (Field::Notes, "Sent home"),
        ]);
        let mut ids = PatientIdGenerator::new();
        let outcome = db.upsert_record(&patch, &mut ids).unwrap();

        assert!(matches!(outcome, UpsertOutcome::Updated(_)));
        let stored = db.get_record("SID1").unwrap().unwrap();
        assert_eq!(stored.known_allergies.as_deref(), Some("Peanuts"));
        assert_eq!(stored.notes.as_deref(), Some("Sent home"));
        assert_eq!(stored.full_name, "Ada Obi");
    }

    #[test]
    fn test_list_orders_most_recent_first() {
        let db = setup_db();
        db.insert_record(&visit("SID1", "Ada Obi", "2024-03-01")).unwrap();
        db.insert_record(&visit("SID2", "Bo Lee", "2024-03-05")).unwrap();

        let records = db.list_records().unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["SID2", "SID1"]);
    }

    #[test]
    fn test_search_paginated() {
        let db = setup_db();
        for i in 0..5 {
            db.insert_record(&visit(&format!("SID{}", i), "Ada Obi", "2024-03-01"))
                .unwrap();
        }
        db.insert_record(&visit("SIDX", "Bo Lee", "2024-03-01")).unwrap();

        let page = db.search_records("ada", 2, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.pages, 3);
        assert_eq!(page.items.len(), 2);

        let all = db.list_page(1, 10).unwrap();
        assert_eq!(all.total, 6);
    }
}
