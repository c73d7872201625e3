//! Nurse Log Core Library
//!
//! Health-visit records for a school nurse's office, kept in two places:
//! a spreadsheet-style log the nurse edits directly, and a relational store.
//!
//! # Architecture
//!
//! ```text
//!   SchoolNurse_HealthLog.csv  ◄──── tabular ────  init / add / list / find / update / delete
//!              │  ▲
//!       import │  │ export          (bridge: upsert by Patient ID, one transaction)
//!              ▼  │
//!   ┌──────────────────────────┐
//!   │  SQLite store (db)       │ ◄── migrate: v1 legacy table → v2
//!   │  records + schema_migrations
//!   └──────────────────────────┘
//! ```
//!
//! Both sides share one field table ([`models::Field`]) mapping the tabular
//! headers to relational columns, and one validation path
//! ([`models::HealthRecord::validate`]).
//!
//! # Modules
//!
//! - [`models`]: HealthRecord, Field name mapping, RecordPatch, validation, patient IDs
//! - [`db`]: SQLite store, versioned schema and the legacy migration
//! - [`tabular`]: CSV health log operations
//! - [`bridge`]: Import/export between the store and tabular files

pub mod bridge;
pub mod db;
pub mod models;
pub mod tabular;

// Re-export commonly used types
pub use bridge::{BridgeError, ExportSummary, ImportReport, RowError};
pub use db::{Database, DbError, MigrationError, MigrationOutcome, SchemaStatus};
pub use models::{
    Field, FieldError, HealthRecord, PatientIdGenerator, RecordPatch, ValidationErrors,
};
pub use tabular::{SheetRow, TabularError, TabularFile};
