//! Health visit record.

use serde::{Deserialize, Serialize};

use super::validation::{parse_date, parse_time, parse_timestamp, DATE_FORMAT, TIMESTAMP_FORMAT};
use super::{Field, FieldError, FieldKind};

/// One school-nurse visit entry for a student.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthRecord {
    /// Stable identity; immutable once assigned
    pub patient_id: String,

    // Demographics
    pub full_name: String,
    pub date_of_birth: Option<String>,
    pub age: Option<i64>,
    pub gender: Option<String>,
    pub grade_level: Option<String>,
    pub house_section: Option<String>,

    // Contact
    pub parent_primary_name: Option<String>,
    pub parent_primary_phone: Option<String>,
    pub parent_secondary_name: Option<String>,
    pub parent_secondary_phone: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub homeroom_teacher: Option<String>,

    // Visit
    pub academic_year: Option<String>,
    pub academic_term: Option<String>,
    pub date_of_visit: String,
    pub time_of_visit: String,
    pub brought_in_by: Option<String>,
    pub nurse_name: String,
    pub visit_reason_category: Option<String>,
    pub severity_level: Option<String>,
    pub visit_details: Option<String>,

    // Vital signs
    /// Degrees Celsius
    pub temperature: Option<f64>,
    /// Beats per minute
    pub heart_rate: Option<i64>,
    /// Breaths per minute
    pub respiratory_rate: Option<i64>,
    /// Percent
    pub oxygen_saturation: Option<f64>,
    /// mmHg
    pub blood_pressure_systolic: Option<i64>,
    /// mmHg
    pub blood_pressure_diastolic: Option<i64>,
    /// Inches
    pub height: Option<f64>,
    /// Pounds
    pub weight: Option<f64>,
    /// kg/m², derived from height and weight
    pub bmi: Option<f64>,
    /// 0-10
    pub pain_scale: Option<i64>,
    pub pain_location: Option<String>,

    // Complaints and history
    pub presenting_complaints: Option<String>,
    pub other_complaint_details: Option<String>,
    pub complaint_background: Option<String>,
    pub past_medical_history: Option<String>,
    pub known_allergies: Option<String>,
    pub current_medications: Option<String>,
    pub special_medical_needs: bool,
    pub chronic_conditions_alert: bool,
    pub chronic_conditions: Option<String>,

    // Assessment and care
    pub nurse_observations: Option<String>,
    pub interventions_provided: Option<String>,
    pub medications_administered: Option<String>,
    pub next_steps: Option<String>,
    pub other_next_step_details: Option<String>,
    pub referral_type: Option<String>,
    pub follow_up_date: Option<String>,

    // Sick bay admission and discharge
    pub admission_date: Option<String>,
    pub admission_time: Option<String>,
    pub condition_on_admission: Option<String>,
    pub plan_of_care: Option<String>,
    pub discharge_time: Option<String>,
    pub condition_at_discharge: Option<String>,
    pub discharge_instructions: Option<String>,
    pub return_to_class_time: Option<String>,
    pub parent_notified: bool,
    pub parent_notification_time: Option<String>,
    pub incident_report_required: bool,

    // Bookkeeping
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Current local time in storage format.
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

impl HealthRecord {
    /// Create a record with the required fields set and both timestamps at now.
    pub fn new(
        patient_id: String,
        full_name: String,
        date_of_visit: String,
        time_of_visit: String,
        nurse_name: String,
    ) -> Self {
        let mut record = Self::empty(patient_id);
        record.full_name = full_name;
        record.date_of_visit = date_of_visit;
        record.time_of_visit = time_of_visit;
        record.nurse_name = nurse_name;
        record.touch_created();
        record
    }

    /// A record with only the identifier set; required fields empty, timestamps empty.
    pub fn empty(patient_id: String) -> Self {
        Self {
            patient_id,
            full_name: String::new(),
            date_of_birth: None,
            age: None,
            gender: None,
            grade_level: None,
            house_section: None,
            parent_primary_name: None,
            parent_primary_phone: None,
            parent_secondary_name: None,
            parent_secondary_phone: None,
            emergency_contact_name: None,
            emergency_contact_phone: None,
            homeroom_teacher: None,
            academic_year: None,
            academic_term: None,
            date_of_visit: String::new(),
            time_of_visit: String::new(),
            brought_in_by: None,
            nurse_name: String::new(),
            visit_reason_category: None,
            severity_level: None,
            visit_details: None,
            temperature: None,
            heart_rate: None,
            respiratory_rate: None,
            oxygen_saturation: None,
            blood_pressure_systolic: None,
            blood_pressure_diastolic: None,
            height: None,
            weight: None,
            bmi: None,
            pain_scale: None,
            pain_location: None,
            presenting_complaints: None,
            other_complaint_details: None,
            complaint_background: None,
            past_medical_history: None,
            known_allergies: None,
            current_medications: None,
            special_medical_needs: false,
            chronic_conditions_alert: false,
            chronic_conditions: None,
            nurse_observations: None,
            interventions_provided: None,
            medications_administered: None,
            next_steps: None,
            other_next_step_details: None,
            referral_type: None,
            follow_up_date: None,
            admission_date: None,
            admission_time: None,
            condition_on_admission: None,
            plan_of_care: None,
            discharge_time: None,
            condition_at_discharge: None,
            discharge_instructions: None,
            return_to_class_time: None,
            parent_notified: false,
            parent_notification_time: None,
            incident_report_required: false,
            notes: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    /// Stamp `created_at` and `updated_at` with the current time.
    pub fn touch_created(&mut self) {
        let now = now_timestamp();
        self.created_at = now.clone();
        self.updated_at = now;
    }

    /// Stamp `updated_at` with the current time.
    pub fn touch_updated(&mut self) {
        self.updated_at = now_timestamp();
    }

    /// Recompute BMI from height (in) and weight (lbs) when both are known.
    pub fn refresh_bmi(&mut self) {
        if let (Some(height), Some(weight)) = (self.height, self.weight) {
            if height > 0.0 && weight > 0.0 {
                let bmi = 703.0 * weight / (height * height);
                self.bmi = Some((bmi * 100.0).round() / 100.0);
            }
        }
    }

    /// Derive computed fields, then validate.
    pub fn finalize(&mut self) -> Result<(), super::ValidationErrors> {
        self.refresh_bmi();
        self.validate()
    }

    /// Render one field as its tabular cell text; absent values are empty.
    pub fn cell(&self, field: Field) -> String {
        match field {
            Field::PatientId => self.patient_id.clone(),
            Field::FullName => self.full_name.clone(),
            Field::DateOfBirth => text(&self.date_of_birth),
            Field::Age => integer(self.age),
            Field::Gender => text(&self.gender),
            Field::GradeLevel => text(&self.grade_level),
            Field::HouseSection => text(&self.house_section),
            Field::ParentPrimaryName => text(&self.parent_primary_name),
            Field::ParentPrimaryPhone => text(&self.parent_primary_phone),
            Field::ParentSecondaryName => text(&self.parent_secondary_name),
            Field::ParentSecondaryPhone => text(&self.parent_secondary_phone),
            Field::EmergencyContactName => text(&self.emergency_contact_name),
            Field::EmergencyContactPhone => text(&self.emergency_contact_phone),
            Field::HomeroomTeacher => text(&self.homeroom_teacher),
            Field::AcademicYear => text(&self.academic_year),
            Field::AcademicTerm => text(&self.academic_term),
            Field::DateOfVisit => self.date_of_visit.clone(),
            Field::TimeOfVisit => self.time_of_visit.clone(),
            Field::BroughtInBy => text(&self.brought_in_by),
            Field::NurseName => self.nurse_name.clone(),
            Field::VisitReasonCategory => text(&self.visit_reason_category),
            Field::SeverityLevel => text(&self.severity_level),
            Field::VisitDetails => text(&self.visit_details),
            Field::Temperature => real(self.temperature),
            Field::HeartRate => integer(self.heart_rate),
            Field::RespiratoryRate => integer(self.respiratory_rate),
            Field::OxygenSaturation => real(self.oxygen_saturation),
            Field::BloodPressure => {
                match (self.blood_pressure_systolic, self.blood_pressure_diastolic) {
                    (Some(sys), Some(dia)) => format!("{}/{}", sys, dia),
                    _ => String::new(),
                }
            }
            Field::Height => real(self.height),
            Field::Weight => real(self.weight),
            Field::Bmi => real(self.bmi),
            Field::PainScale => integer(self.pain_scale),
            Field::PainLocation => text(&self.pain_location),
            Field::PresentingComplaints => text(&self.presenting_complaints),
            Field::OtherComplaintDetails => text(&self.other_complaint_details),
            Field::ComplaintBackground => text(&self.complaint_background),
            Field::PastMedicalHistory => text(&self.past_medical_history),
            Field::KnownAllergies => text(&self.known_allergies),
            Field::CurrentMedications => text(&self.current_medications),
            Field::SpecialMedicalNeeds => flag(self.special_medical_needs),
            Field::ChronicConditionsAlert => flag(self.chronic_conditions_alert),
            Field::ChronicConditions => text(&self.chronic_conditions),
            Field::NurseObservations => text(&self.nurse_observations),
            Field::InterventionsProvided => text(&self.interventions_provided),
            Field::MedicationsAdministered => text(&self.medications_administered),
            Field::NextSteps => text(&self.next_steps),
            Field::OtherNextStepDetails => text(&self.other_next_step_details),
            Field::ReferralType => text(&self.referral_type),
            Field::FollowUpDate => text(&self.follow_up_date),
            Field::AdmissionDate => text(&self.admission_date),
            Field::AdmissionTime => text(&self.admission_time),
            Field::ConditionOnAdmission => text(&self.condition_on_admission),
            Field::PlanOfCare => text(&self.plan_of_care),
            Field::DischargeTime => text(&self.discharge_time),
            Field::ConditionAtDischarge => text(&self.condition_at_discharge),
            Field::DischargeInstructions => text(&self.discharge_instructions),
            Field::ReturnToClassTime => text(&self.return_to_class_time),
            Field::ParentNotified => flag(self.parent_notified),
            Field::ParentNotificationTime => text(&self.parent_notification_time),
            Field::IncidentReportRequired => flag(self.incident_report_required),
            Field::Notes => text(&self.notes),
            Field::CreatedAt => self.created_at.clone(),
            Field::UpdatedAt => self.updated_at.clone(),
        }
    }

    /// All cells in tabular column order.
    pub fn cells(&self) -> Vec<String> {
        Field::ALL.iter().map(|f| self.cell(*f)).collect()
    }

    /// Parse `value` into `field`. `None` or blank clears the field
    /// (flags reset to false, required text becomes empty).
    pub fn set_cell(&mut self, field: Field, value: Option<&str>) -> Result<(), FieldError> {
        let value = value.map(str::trim).filter(|v| !v.is_empty());
        let parse_text = || value.map(str::to_string);
        let parse_required = || value.unwrap_or_default().to_string();

        match field {
            Field::PatientId => self.patient_id = parse_required(),
            Field::FullName => self.full_name = parse_required(),
            Field::DateOfBirth => self.date_of_birth = parse_checked(field, value)?,
            Field::Age => self.age = parse_integer(field, value)?,
            Field::Gender => self.gender = parse_text(),
            Field::GradeLevel => self.grade_level = parse_text(),
            Field::HouseSection => self.house_section = parse_text(),
            Field::ParentPrimaryName => self.parent_primary_name = parse_text(),
            Field::ParentPrimaryPhone => self.parent_primary_phone = parse_text(),
            Field::ParentSecondaryName => self.parent_secondary_name = parse_text(),
            Field::ParentSecondaryPhone => self.parent_secondary_phone = parse_text(),
            Field::EmergencyContactName => self.emergency_contact_name = parse_text(),
            Field::EmergencyContactPhone => self.emergency_contact_phone = parse_text(),
            Field::HomeroomTeacher => self.homeroom_teacher = parse_text(),
            Field::AcademicYear => self.academic_year = parse_text(),
            Field::AcademicTerm => self.academic_term = parse_text(),
            Field::DateOfVisit => {
                self.date_of_visit = parse_checked(field, value)?.unwrap_or_default()
            }
            Field::TimeOfVisit => {
                self.time_of_visit = parse_checked(field, value)?.unwrap_or_default()
            }
            Field::BroughtInBy => self.brought_in_by = parse_text(),
            Field::NurseName => self.nurse_name = parse_required(),
            Field::VisitReasonCategory => self.visit_reason_category = parse_text(),
            Field::SeverityLevel => self.severity_level = parse_text(),
            Field::VisitDetails => self.visit_details = parse_text(),
            Field::Temperature => self.temperature = parse_real(field, value)?,
            Field::HeartRate => self.heart_rate = parse_integer(field, value)?,
            Field::RespiratoryRate => self.respiratory_rate = parse_integer(field, value)?,
            Field::OxygenSaturation => self.oxygen_saturation = parse_real(field, value)?,
            Field::BloodPressure => {
                let (sys, dia) = match value {
                    Some(v) => parse_blood_pressure(v)
                        .map(|(s, d)| (Some(s), Some(d)))
                        .ok_or_else(|| {
                            FieldError::new(field.header(), "must be written as systolic/diastolic")
                        })?,
                    None => (None, None),
                };
                self.blood_pressure_systolic = sys;
                self.blood_pressure_diastolic = dia;
            }
            Field::Height => self.height = parse_real(field, value)?,
            Field::Weight => self.weight = parse_real(field, value)?,
            Field::Bmi => self.bmi = parse_real(field, value)?,
            Field::PainScale => self.pain_scale = parse_integer(field, value)?,
            Field::PainLocation => self.pain_location = parse_text(),
            Field::PresentingComplaints => self.presenting_complaints = parse_text(),
            Field::OtherComplaintDetails => self.other_complaint_details = parse_text(),
            Field::ComplaintBackground => self.complaint_background = parse_text(),
            Field::PastMedicalHistory => self.past_medical_history = parse_text(),
            Field::KnownAllergies => self.known_allergies = parse_text(),
            Field::CurrentMedications => self.current_medications = parse_text(),
            Field::SpecialMedicalNeeds => self.special_medical_needs = parse_flag(field, value)?,
            Field::ChronicConditionsAlert => {
                self.chronic_conditions_alert = parse_flag(field, value)?
            }
            Field::ChronicConditions => self.chronic_conditions = parse_text(),
            Field::NurseObservations => self.nurse_observations = parse_text(),
            Field::InterventionsProvided => self.interventions_provided = parse_text(),
            Field::MedicationsAdministered => self.medications_administered = parse_text(),
            Field::NextSteps => self.next_steps = parse_text(),
            Field::OtherNextStepDetails => self.other_next_step_details = parse_text(),
            Field::ReferralType => self.referral_type = parse_text(),
            Field::FollowUpDate => self.follow_up_date = parse_checked(field, value)?,
            Field::AdmissionDate => self.admission_date = parse_checked(field, value)?,
            Field::AdmissionTime => self.admission_time = parse_checked(field, value)?,
            Field::ConditionOnAdmission => self.condition_on_admission = parse_text(),
            Field::PlanOfCare => self.plan_of_care = parse_text(),
            Field::DischargeTime => self.discharge_time = parse_checked(field, value)?,
            Field::ConditionAtDischarge => self.condition_at_discharge = parse_text(),
            Field::DischargeInstructions => self.discharge_instructions = parse_text(),
            Field::ReturnToClassTime => self.return_to_class_time = parse_checked(field, value)?,
            Field::ParentNotified => self.parent_notified = parse_flag(field, value)?,
            Field::ParentNotificationTime => {
                self.parent_notification_time = parse_checked(field, value)?
            }
            Field::IncidentReportRequired => {
                self.incident_report_required = parse_flag(field, value)?
            }
            Field::Notes => self.notes = parse_text(),
            Field::CreatedAt => self.created_at = parse_checked(field, value)?.unwrap_or_default(),
            Field::UpdatedAt => self.updated_at = parse_checked(field, value)?.unwrap_or_default(),
        }

        Ok(())
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn integer(value: Option<i64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn real(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn flag(value: bool) -> String {
    let text = if value { "Yes" } else { "No" };
    text.to_string()
}

/// Dates are normalized to `YYYY-MM-DD`; times and timestamps are kept as written.
fn parse_checked(field: Field, value: Option<&str>) -> Result<Option<String>, FieldError> {
    let Some(value) = value else {
        return Ok(None);
    };

    match field.kind() {
        FieldKind::Date => parse_date(value)
            .map(|d| Some(d.format(DATE_FORMAT).to_string()))
            .ok_or_else(|| FieldError::new(field.header(), "must be in YYYY-MM-DD format")),
        FieldKind::Time => parse_time(value)
            .map(|_| Some(value.to_string()))
            .ok_or_else(|| {
                FieldError::new(field.header(), "must be in HH:MM or HH:MM AM/PM format")
            }),
        FieldKind::Timestamp => parse_timestamp(value)
            .map(|_| Some(value.to_string()))
            .ok_or_else(|| {
                FieldError::new(field.header(), "must be in YYYY-MM-DD HH:MM:SS format")
            }),
        _ => Ok(Some(value.to_string())),
    }
}

fn parse_integer(field: Field, value: Option<&str>) -> Result<Option<i64>, FieldError> {
    let Some(value) = value else {
        return Ok(None);
    };
    if let Ok(v) = value.parse::<i64>() {
        return Ok(Some(v));
    }
    // Spreadsheets often hand back whole numbers as "72.0"
    match value.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && v.is_finite() => Ok(Some(v as i64)),
        _ => Err(FieldError::new(field.header(), "must be a whole number")),
    }
}

fn parse_real(field: Field, value: Option<&str>) -> Result<Option<f64>, FieldError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(FieldError::new(field.header(), "must be a numeric value")),
    }
}

fn parse_flag(field: Field, value: Option<&str>) -> Result<bool, FieldError> {
    let Some(value) = value else {
        return Ok(false);
    };
    match value.to_lowercase().as_str() {
        "yes" | "y" | "true" | "1" => Ok(true),
        "no" | "n" | "false" | "0" => Ok(false),
        _ => Err(FieldError::new(field.header(), "must be Yes or No")),
    }
}

/// Split `"120/80"` (or `"120 over 80"`) into systolic and diastolic readings.
pub fn parse_blood_pressure(value: &str) -> Option<(i64, i64)> {
    let mut parts = value
        .split(|c: char| !c.is_ascii_digit())
        .filter(|p| !p.is_empty());
    let systolic = parts.next()?.parse().ok()?;
    let diastolic = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((systolic, diastolic))
}
