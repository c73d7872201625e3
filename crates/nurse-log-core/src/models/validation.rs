//! Record validation errors and rules.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::{Field, FieldKind, HealthRecord};

/// Storage format for dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Storage format for `created_at` / `updated_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One rejected field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field header (or the unknown name that was supplied)
    pub field: String,
    /// Why the value was rejected
    pub reason: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.field, self.reason)
    }
}

/// Every field error found for one record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid record: {}", join(.0))]
pub struct ValidationErrors(pub Vec<FieldError>);

fn join(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationErrors {
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// First offending field, if any.
    pub fn first(&self) -> Option<&FieldError> {
        self.0.first()
    }
}

impl From<FieldError> for ValidationErrors {
    fn from(e: FieldError) -> Self {
        ValidationErrors(vec![e])
    }
}

/// Parse a date, ignoring any trailing time portion (`2024-03-01 00:00:00`).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let date_part = value.split_whitespace().next()?;
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

/// Parse `HH:MM` or `HH:MM AM/PM`.
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let upper = value.to_uppercase();
    if upper.contains("AM") || upper.contains("PM") {
        NaiveTime::parse_from_str(&upper, "%I:%M %p").ok()
    } else {
        NaiveTime::parse_from_str(value, "%H:%M").ok()
    }
}

pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).ok()
}

/// A patient identifier must be non-empty and free of whitespace/control characters.
pub fn check_patient_id(id: &str) -> Result<(), FieldError> {
    if id.is_empty() {
        return Err(FieldError::new(Field::PatientId.header(), "is required"));
    }
    if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(FieldError::new(
            Field::PatientId.header(),
            "must not contain whitespace",
        ));
    }
    Ok(())
}

impl HealthRecord {
    /// Check every invariant a persisted record must satisfy.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = Vec::new();

        if let Err(e) = check_patient_id(&self.patient_id) {
            errors.push(e);
        }

        for field in Field::REQUIRED {
            if self.cell(field).is_empty() {
                errors.push(FieldError::new(field.header(), "is a required field"));
            }
        }

        for field in Field::ALL {
            let value = self.cell(field);
            if value.is_empty() {
                continue;
            }
            let reason = match field.kind() {
                FieldKind::Date if parse_date(&value).is_none() => "must be in YYYY-MM-DD format",
                FieldKind::Time if parse_time(&value).is_none() => {
                    "must be in HH:MM or HH:MM AM/PM format"
                }
                FieldKind::Timestamp if parse_timestamp(&value).is_none() => {
                    "must be in YYYY-MM-DD HH:MM:SS format"
                }
                _ => continue,
            };
            errors.push(FieldError::new(field.header(), reason));
        }

        if matches!(self.age, Some(age) if age < 0) {
            errors.push(FieldError::new(Field::Age.header(), "must not be negative"));
        }
        if matches!(self.pain_scale, Some(p) if !(0..=10).contains(&p)) {
            errors.push(FieldError::new(
                Field::PainScale.header(),
                "must be between 0 and 10",
            ));
        }
        if matches!(self.oxygen_saturation, Some(s) if !(0.0..=100.0).contains(&s)) {
            errors.push(FieldError::new(
                Field::OxygenSaturation.header(),
                "must be between 0 and 100",
            ));
        }
        if self.blood_pressure_systolic.is_some() != self.blood_pressure_diastolic.is_some() {
            errors.push(FieldError::new(
                Field::BloodPressure.header(),
                "systolic and diastolic must be given together",
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }
}
