//! SQLite schema definitions for every supported schema version.

/// Applied-migration bookkeeping.
pub const CREATE_SCHEMA_MIGRATIONS: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT 'applied'     -- created | inferred | migrated
);
"#;

/// Version 1 records table, as written by the first release of the web app.
///
/// Temperature is in Fahrenheit and blood pressure is a single `"120/80"` text.
pub const LEGACY_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    patient_id TEXT UNIQUE,
    full_name TEXT NOT NULL,
    date_of_birth TEXT,
    age INTEGER,
    gender TEXT,
    grade_level TEXT,
    parent_name TEXT,
    parent_phone TEXT,
    date_of_visit TEXT NOT NULL,
    time_of_visit TEXT NOT NULL,
    nurse_name TEXT NOT NULL,
    visit_reason TEXT,
    visit_details TEXT,
    temperature REAL,                            -- Fahrenheit
    pulse INTEGER,                               -- bpm
    blood_pressure TEXT,                         -- "120/80"
    notes TEXT,
    created_at TEXT,
    updated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_records_patient_id ON records(patient_id);
CREATE INDEX IF NOT EXISTS idx_records_full_name ON records(full_name);
CREATE INDEX IF NOT EXISTS idx_records_date_of_visit ON records(date_of_visit);
"#;

/// Version 2 records table body. `{table}` is substituted so the migration
/// can build the new shape beside the legacy table before swapping.
const RECORDS_TABLE_TEMPLATE: &str = r#"
CREATE TABLE IF NOT EXISTS {table} (
    -- Identification
    patient_id TEXT PRIMARY KEY NOT NULL CHECK (patient_id <> ''),

    -- Student demographics
    full_name TEXT NOT NULL CHECK (full_name <> ''),
    date_of_birth TEXT,
    age INTEGER,
    gender TEXT,
    grade_level TEXT,
    house_section TEXT,
    homeroom_teacher TEXT,

    -- Contact information
    parent_primary_name TEXT,
    parent_primary_phone TEXT,
    parent_secondary_name TEXT,
    parent_secondary_phone TEXT,
    emergency_contact_name TEXT,
    emergency_contact_phone TEXT,

    -- Visit information
    academic_year TEXT,
    academic_term TEXT,
    date_of_visit TEXT NOT NULL CHECK (date_of_visit <> ''),
    time_of_visit TEXT NOT NULL CHECK (time_of_visit <> ''),
    brought_in_by TEXT,
    nurse_name TEXT NOT NULL CHECK (nurse_name <> ''),
    visit_reason_category TEXT,
    severity_level TEXT,
    visit_details TEXT,

    -- Vital signs
    temperature REAL,                            -- Celsius
    heart_rate INTEGER,                          -- bpm
    respiratory_rate INTEGER,                    -- breaths per minute
    oxygen_saturation REAL,                      -- percent
    blood_pressure_systolic INTEGER,             -- mmHg
    blood_pressure_diastolic INTEGER,            -- mmHg
    height REAL,                                 -- inches
    weight REAL,                                 -- lbs
    bmi REAL,                                    -- kg/m2
    pain_scale INTEGER CHECK (pain_scale IS NULL OR pain_scale BETWEEN 0 AND 10),
    pain_location TEXT,

    -- Presenting complaints
    presenting_complaints TEXT,
    other_complaint_details TEXT,
    complaint_background TEXT,

    -- Medical history
    past_medical_history TEXT,
    known_allergies TEXT,
    current_medications TEXT,
    special_medical_needs INTEGER NOT NULL DEFAULT 0,
    chronic_conditions_alert INTEGER NOT NULL DEFAULT 0,
    chronic_conditions TEXT,

    -- Assessment and care
    nurse_observations TEXT,
    interventions_provided TEXT,
    medications_administered TEXT,
    next_steps TEXT,
    other_next_step_details TEXT,
    referral_type TEXT,
    follow_up_date TEXT,

    -- Sick bay admission
    admission_date TEXT,
    admission_time TEXT,
    condition_on_admission TEXT,
    plan_of_care TEXT,

    -- Discharge
    discharge_time TEXT,
    condition_at_discharge TEXT,
    discharge_instructions TEXT,
    return_to_class_time TEXT,
    parent_notified INTEGER NOT NULL DEFAULT 0,
    parent_notification_time TEXT,
    incident_report_required INTEGER NOT NULL DEFAULT 0,

    -- System fields
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

/// Lookup indexes on the version 2 records table.
pub const RECORD_INDEXES: &str = r#"
CREATE UNIQUE INDEX IF NOT EXISTS idx_records_patient_id ON records(patient_id);
CREATE INDEX IF NOT EXISTS idx_records_full_name ON records(full_name);
CREATE INDEX IF NOT EXISTS idx_records_date_of_visit ON records(date_of_visit);
CREATE INDEX IF NOT EXISTS idx_records_visit_reason ON records(visit_reason_category);
"#;

/// Swap the staged version 2 table in for the legacy one.
pub const REPLACE_LEGACY_TABLE: &str = r#"
DROP TABLE records;
ALTER TABLE records_v2 RENAME TO records;
"#;

/// `CREATE TABLE` statement for a version 2 records table named `table`.
pub fn records_table(table: &str) -> String {
    RECORDS_TABLE_TEMPLATE.replace("{table}", table)
}
