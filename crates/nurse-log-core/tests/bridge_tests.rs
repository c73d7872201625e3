//! Import/export integration tests.

use nurse_log_core::bridge::{export_to_path, import_from_path, import_from_reader, BridgeError};
use nurse_log_core::db::{Database, DbError, LEGACY_SCHEMA};
use nurse_log_core::models::{HealthRecord, PatientIdGenerator};
use rusqlite::Connection;

fn full_record(id: &str, name: &str, date: &str) -> HealthRecord {
    let mut record = HealthRecord::new(
        id.to_string(),
        name.to_string(),
        date.to_string(),
        "09:15".to_string(),
        "Nurse Joy".to_string(),
    );
    record.date_of_birth = Some("2012-05-04".to_string());
    record.age = Some(11);
    record.grade_level = Some("Grade 6".to_string());
    record.house_section = Some("Blue House".to_string());
    record.parent_secondary_name = Some("Sam Obi".to_string());
    record.homeroom_teacher = Some("Mr. Park".to_string());
    record.chronic_conditions_alert = true;
    record.visit_reason_category = Some("Illness".to_string());
    record.temperature = Some(37.8);
    record.heart_rate = Some(92);
    record.oxygen_saturation = Some(98.5);
    record.blood_pressure_systolic = Some(112);
    record.blood_pressure_diastolic = Some(72);
    record.height = Some(60.0);
    record.weight = Some(100.0);
    record.pain_scale = Some(3);
    record.known_allergies = Some("Peanuts, penicillin".to_string());
    record.special_medical_needs = true;
    record.parent_notified = true;
    record.parent_notification_time = Some("09:40".to_string());
    record.notes = Some("Line one\nline two".to_string());
    record
}

fn sorted(mut records: Vec<HealthRecord>) -> Vec<HealthRecord> {
    records.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
    records
}

#[test]
fn test_export_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.csv");

    let source = Database::open_in_memory().unwrap();
    source.insert_record(&full_record("SID1", "Ada Obi", "2024-03-01")).unwrap();
    source.insert_record(&full_record("SID2", "Bo Lee", "2024-03-02")).unwrap();
    let summary = export_to_path(&source, &path).unwrap();
    assert_eq!(summary.records, 2);

    let mut target = Database::open_in_memory().unwrap();
    let mut ids = PatientIdGenerator::new();
    let report = import_from_path(&mut target, &path, &mut ids).unwrap();
    assert_eq!(report.inserted, 2);
    assert_eq!(report.updated, 0);
    assert!(report.skipped.is_empty());

    let exported = sorted(source.list_records().unwrap());
    let imported = sorted(target.list_records().unwrap());
    assert_eq!(imported, exported);
    assert_eq!(imported[0].bmi, Some(19.53));
}

#[test]
fn test_import_blank_cells_keep_existing_values() {
    let mut db = Database::open_in_memory().unwrap();
    db.insert_record(&full_record("SID1", "Ada Obi", "2024-03-01")).unwrap();
    let before = db.get_record("SID1").unwrap().unwrap();

    let input = "Patient ID,Full Name,Known Allergies,Notes/Comments,Pulse (bpm)\n\
                 SID1,,,Sent home,101\n";
    let mut ids = PatientIdGenerator::new();
    let report = import_from_reader(&mut db, input.as_bytes(), &mut ids).unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 0);

    let after = db.get_record("SID1").unwrap().unwrap();
    assert_eq!(after.full_name, "Ada Obi");
    assert_eq!(after.known_allergies, before.known_allergies);
    assert_eq!(after.notes.as_deref(), Some("Sent home"));
    assert_eq!(after.heart_rate, Some(101));
    assert_eq!(after.created_at, before.created_at);
}

#[test]
fn test_import_invalid_update_leaves_record() {
    let mut db = Database::open_in_memory().unwrap();
    db.insert_record(&full_record("SID1", "Ada Obi", "2024-03-01")).unwrap();
    let before = db.get_record("SID1").unwrap().unwrap();

    let input = "Patient ID,Pain Scale (0-10)\nSID1,14\n";
    let mut ids = PatientIdGenerator::new();
    let report = import_from_reader(&mut db, input.as_bytes(), &mut ids).unwrap();

    assert_eq!(report.updated, 0);
    assert_eq!(report.skipped_rows(), 1);
    assert_eq!(report.skipped[0].patient_id.as_deref(), Some("SID1"));
    assert_eq!(db.get_record("SID1").unwrap().unwrap(), before);
}

#[test]
fn test_import_requires_current_schema() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(LEGACY_SCHEMA).unwrap();
    let mut db = Database::from_connection(conn).unwrap();

    let mut ids = PatientIdGenerator::new();
    let err = import_from_reader(&mut db, "Patient ID\n".as_bytes(), &mut ids).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Db(DbError::SchemaOutdated { current: 1, .. })
    ));
}
