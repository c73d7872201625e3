//! Legacy store migration integration tests.

use nurse_log_core::bridge::export_records;
use nurse_log_core::db::{
    Database, MigrationError, MigrationOutcome, LATEST_SCHEMA_VERSION, LEGACY_SCHEMA,
};
use rusqlite::{params, Connection};

/// Unversioned `heart_rate` table from the web app's second release:
/// surrogate `id` key, nullable timestamps, no sheet-only columns.
const UNVERSIONED_HEART_RATE_SCHEMA: &str = r#"
CREATE TABLE records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id TEXT UNIQUE,
    full_name TEXT NOT NULL,
    date_of_birth TEXT,
    age INTEGER,
    gender TEXT,
    grade_level TEXT,
    parent_primary_name TEXT,
    parent_primary_phone TEXT,
    date_of_visit TEXT NOT NULL,
    time_of_visit TEXT NOT NULL,
    nurse_name TEXT NOT NULL,
    visit_reason_category TEXT,
    temperature REAL,
    heart_rate INTEGER,
    blood_pressure_systolic INTEGER,
    blood_pressure_diastolic INTEGER,
    known_allergies TEXT,
    special_medical_needs BOOLEAN DEFAULT 0,
    parent_notified BOOLEAN DEFAULT 0,
    notes TEXT,
    created_at TEXT,
    updated_at TEXT
);
CREATE INDEX idx_records_patient_id ON records(patient_id);
"#;

fn legacy_connection() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(LEGACY_SCHEMA).unwrap();
    conn
}

fn insert_legacy(
    conn: &Connection,
    patient_id: &str,
    temperature: &dyn rusqlite::ToSql,
    pulse: i64,
    blood_pressure: Option<&str>,
) {
    conn.execute(
        "INSERT INTO records (patient_id, full_name, date_of_visit, time_of_visit, nurse_name,
                              visit_reason, parent_name, temperature, pulse, blood_pressure,
                              created_at, updated_at)
         VALUES (?1, 'Student ' || ?1, '2023-09-12', '10:30', 'Nurse Joy',
                 'Headache', 'Guardian', ?2, ?3, ?4, '2023-09-12 10:31:00', NULL)",
        params![patient_id, temperature, pulse, blood_pressure],
    )
    .unwrap();
}

fn column_names(db: &Database) -> Vec<String> {
    db.conn()
        .prepare("PRAGMA table_info(records)")
        .unwrap()
        .query_map([], |row| row.get::<_, String>("name"))
        .unwrap()
        .filter_map(|r| r.ok())
        .collect()
}

#[test]
fn test_migrate_converts_rows() {
    let conn = legacy_connection();
    insert_legacy(&conn, "P1", &98.6, 88, Some("120/80"));
    insert_legacy(&conn, "P2", &100.4, 95, None);
    insert_legacy(&conn, "P3", &rusqlite::types::Null, 70, Some("110/70"));

    let mut db = Database::from_connection(conn).unwrap();
    let outcome = db.migrate().unwrap();
    assert_eq!(
        outcome,
        MigrationOutcome::Migrated {
            from: 1,
            to: LATEST_SCHEMA_VERSION,
            rows: 3
        }
    );
    db.ensure_current_schema().unwrap();

    let p1 = db.get_record("P1").unwrap().unwrap();
    assert!((p1.temperature.unwrap() - 37.0).abs() < 0.01);
    assert_eq!(p1.heart_rate, Some(88));
    assert_eq!(p1.blood_pressure_systolic, Some(120));
    assert_eq!(p1.blood_pressure_diastolic, Some(80));
    assert_eq!(p1.visit_reason_category.as_deref(), Some("Headache"));
    assert_eq!(p1.parent_primary_name.as_deref(), Some("Guardian"));
    assert_eq!(p1.full_name, "Student P1");
    assert_eq!(p1.created_at, "2023-09-12 10:31:00");
    assert!(!p1.updated_at.is_empty());

    let p2 = db.get_record("P2").unwrap().unwrap();
    assert!((p2.temperature.unwrap() - 38.0).abs() < 0.01);
    assert_eq!(p2.blood_pressure_systolic, None);

    let p3 = db.get_record("P3").unwrap().unwrap();
    assert_eq!(p3.temperature, None);

    let columns = column_names(&db);
    assert!(columns.contains(&"heart_rate".to_string()));
    assert!(!columns.contains(&"pulse".to_string()));
    assert!(!columns.contains(&"id".to_string()));
}

#[test]
fn test_migrate_twice_is_noop() {
    let conn = legacy_connection();
    insert_legacy(&conn, "P1", &98.6, 88, None);

    let mut db = Database::from_connection(conn).unwrap();
    db.migrate().unwrap();
    let before = db.get_record("P1").unwrap().unwrap();

    assert_eq!(db.migrate().unwrap(), MigrationOutcome::AlreadyCurrent);
    assert_eq!(db.get_record("P1").unwrap().unwrap(), before);
}

#[test]
fn test_malformed_row_rolls_back() {
    let conn = legacy_connection();
    insert_legacy(&conn, "P1", &98.6, 88, None);
    insert_legacy(&conn, "P2", &"warm", 90, None);
    insert_legacy(&conn, "P3", &99.1, 72, None);

    let mut db = Database::from_connection(conn).unwrap();
    let err = db.migrate().unwrap_err();
    match err {
        MigrationError::Row { row, failure, .. } => {
            assert_eq!(row, 2);
            assert_eq!(failure.field, "temperature");
            assert_eq!(failure.patient_id.as_deref(), Some("P2"));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Legacy shape and every legacy row survive.
    let columns = column_names(&db);
    assert!(columns.contains(&"pulse".to_string()));
    let count: i64 = db
        .conn()
        .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 3);
    let status = db.schema_status().unwrap();
    assert_eq!(status.current_version, 1);
    let staged: i64 = db
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE name = 'records_v2'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(staged, 0);
}

#[test]
fn test_migration_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nurse_records.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(LEGACY_SCHEMA).unwrap();
        insert_legacy(&conn, "P1", &212.0, 60, Some("118/76"));
    }

    {
        let mut db = Database::open(&path).unwrap();
        assert!(!db.schema_status().unwrap().is_current());
        db.migrate().unwrap();
    }

    let mut db = Database::open(&path).unwrap();
    assert!(db.schema_status().unwrap().is_current());
    assert_eq!(db.migrate().unwrap(), MigrationOutcome::AlreadyCurrent);
    assert_eq!(db.get_record("P1").unwrap().unwrap().temperature, Some(100.0));
}

#[test]
fn test_migrate_keeps_extra_shared_columns() {
    let conn = legacy_connection();
    conn.execute_batch("ALTER TABLE records ADD COLUMN known_allergies TEXT;")
        .unwrap();
    insert_legacy(&conn, "P1", &98.6, 88, None);
    conn.execute(
        "UPDATE records SET known_allergies = 'Peanuts' WHERE patient_id = 'P1'",
        [],
    )
    .unwrap();

    let mut db = Database::from_connection(conn).unwrap();
    db.migrate().unwrap();

    let p1 = db.get_record("P1").unwrap().unwrap();
    assert_eq!(p1.known_allergies.as_deref(), Some("Peanuts"));
    assert_eq!(p1.heart_rate, Some(88));
}

#[test]
fn test_migrate_table_missing_optional_columns() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patient_id TEXT UNIQUE,
            full_name TEXT NOT NULL,
            date_of_visit TEXT NOT NULL,
            time_of_visit TEXT NOT NULL,
            nurse_name TEXT NOT NULL,
            temperature REAL,
            pulse INTEGER,
            blood_pressure TEXT
        );
        INSERT INTO records (patient_id, full_name, date_of_visit, time_of_visit, nurse_name,
                             temperature, pulse, blood_pressure)
        VALUES ('P1', 'Ada Obi', '2023-09-12', '10:30', 'Nurse Joy', 212, 70, '120/80');",
    )
    .unwrap();

    let mut db = Database::from_connection(conn).unwrap();
    assert_eq!(
        db.migrate().unwrap(),
        MigrationOutcome::Migrated {
            from: 1,
            to: LATEST_SCHEMA_VERSION,
            rows: 1
        }
    );

    let p1 = db.get_record("P1").unwrap().unwrap();
    assert_eq!(p1.date_of_birth, None);
    assert_eq!(p1.age, None);
    assert_eq!(p1.temperature, Some(100.0));
    assert!(!p1.created_at.is_empty());
}

#[test]
fn test_invalid_legacy_date_rolls_back() {
    let conn = legacy_connection();
    insert_legacy(&conn, "P1", &98.6, 88, None);
    insert_legacy(&conn, "P2", &98.6, 80, None);
    conn.execute(
        "UPDATE records SET date_of_visit = '09/12/2023' WHERE patient_id = 'P2'",
        [],
    )
    .unwrap();

    let mut db = Database::from_connection(conn).unwrap();
    match db.migrate().unwrap_err() {
        MigrationError::Row { row, failure, .. } => {
            assert_eq!(row, 2);
            assert_eq!(failure.field, "date_of_visit");
            assert_eq!(failure.patient_id.as_deref(), Some("P2"));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(column_names(&db).contains(&"pulse".to_string()));
    assert_eq!(db.schema_status().unwrap().current_version, 1);
    let date: String = db
        .conn()
        .query_row(
            "SELECT date_of_visit FROM records WHERE patient_id = 'P2'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(date, "09/12/2023");
}

#[test]
fn test_migrate_unversioned_heart_rate_layout() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(UNVERSIONED_HEART_RATE_SCHEMA).unwrap();
    conn.execute(
        "INSERT INTO records (patient_id, full_name, date_of_visit, time_of_visit, nurse_name,
                              temperature, heart_rate, blood_pressure_systolic,
                              blood_pressure_diastolic, known_allergies, parent_notified,
                              created_at, updated_at)
         VALUES ('P1', 'Bo Lee', '2024-02-01', '11:00', 'Nurse Joy',
                 37.5, 90, 118, 76, 'Peanuts', 1, NULL, NULL)",
        [],
    )
    .unwrap();

    let mut db = Database::from_connection(conn).unwrap();
    let status = db.schema_status().unwrap();
    assert_eq!(status.current_version, 1);
    assert!(status.inferred);
    assert!(status.legacy_table_present);
    assert!(db.ensure_current_schema().is_err());

    db.migrate().unwrap();
    assert!(db.schema_status().unwrap().is_current());

    let records = db.list_records().unwrap();
    assert_eq!(records.len(), 1);
    let p1 = &records[0];
    assert_eq!(p1.temperature, Some(37.5));
    assert_eq!(p1.heart_rate, Some(90));
    assert_eq!(p1.blood_pressure_systolic, Some(118));
    assert_eq!(p1.known_allergies.as_deref(), Some("Peanuts"));
    assert!(p1.parent_notified);
    assert!(!p1.created_at.is_empty());
    assert_eq!(p1.created_at, p1.updated_at);

    let columns = column_names(&db);
    assert!(!columns.contains(&"id".to_string()));
    assert!(columns.contains(&"house_section".to_string()));

    let mut out = Vec::new();
    let summary = export_records(&db, &mut out).unwrap();
    assert_eq!(summary.records, 1);
}
