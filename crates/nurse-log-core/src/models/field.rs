//! Logical record fields and the name-mapping table between the tabular
//! file headers and the relational columns.

use std::fmt;

use super::FieldError;

/// How a field's text value is parsed and rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Record identity; never empty once persisted
    Identifier,
    /// Free text that must be present
    RequiredText,
    /// Optional free text
    Text,
    /// Whole number
    Integer,
    /// Decimal number
    Real,
    /// Yes/No flag, stored as 0/1
    Flag,
    /// `YYYY-MM-DD`
    Date,
    /// `HH:MM` or `HH:MM AM/PM`
    Time,
    /// `YYYY-MM-DD HH:MM:SS`
    Timestamp,
    /// `systolic/diastolic`, spread over two columns
    BloodPressure,
}

/// One logical field of a health record.
///
/// Ordering follows the column order of the tabular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    PatientId,
    FullName,
    DateOfBirth,
    Age,
    Gender,
    GradeLevel,
    HouseSection,
    ParentPrimaryName,
    ParentPrimaryPhone,
    ParentSecondaryName,
    ParentSecondaryPhone,
    EmergencyContactName,
    EmergencyContactPhone,
    HomeroomTeacher,
    AcademicYear,
    AcademicTerm,
    DateOfVisit,
    TimeOfVisit,
    BroughtInBy,
    NurseName,
    VisitReasonCategory,
    SeverityLevel,
    VisitDetails,
    Temperature,
    HeartRate,
    RespiratoryRate,
    OxygenSaturation,
    BloodPressure,
    Height,
    Weight,
    Bmi,
    PainScale,
    PainLocation,
    PresentingComplaints,
    OtherComplaintDetails,
    ComplaintBackground,
    PastMedicalHistory,
    KnownAllergies,
    CurrentMedications,
    SpecialMedicalNeeds,
    ChronicConditionsAlert,
    ChronicConditions,
    NurseObservations,
    InterventionsProvided,
    MedicationsAdministered,
    NextSteps,
    OtherNextStepDetails,
    ReferralType,
    FollowUpDate,
    AdmissionDate,
    AdmissionTime,
    ConditionOnAdmission,
    PlanOfCare,
    DischargeTime,
    ConditionAtDischarge,
    DischargeInstructions,
    ReturnToClassTime,
    ParentNotified,
    ParentNotificationTime,
    IncidentReportRequired,
    Notes,
    CreatedAt,
    UpdatedAt,
}

/// Header text, relational column(s) and kind of one field.
struct FieldSpec {
    header: &'static str,
    columns: &'static [&'static str],
    kind: FieldKind,
}

const fn spec(
    header: &'static str,
    columns: &'static [&'static str],
    kind: FieldKind,
) -> FieldSpec {
    FieldSpec {
        header,
        columns,
        kind,
    }
}

impl Field {
    /// Every field, in tabular column order.
    pub const ALL: [Field; 63] = [
        Field::PatientId,
        Field::FullName,
        Field::DateOfBirth,
        Field::Age,
        Field::Gender,
        Field::GradeLevel,
        Field::HouseSection,
        Field::ParentPrimaryName,
        Field::ParentPrimaryPhone,
        Field::ParentSecondaryName,
        Field::ParentSecondaryPhone,
        Field::EmergencyContactName,
        Field::EmergencyContactPhone,
        Field::HomeroomTeacher,
        Field::AcademicYear,
        Field::AcademicTerm,
        Field::DateOfVisit,
        Field::TimeOfVisit,
        Field::BroughtInBy,
        Field::NurseName,
        Field::VisitReasonCategory,
        Field::SeverityLevel,
        Field::VisitDetails,
        Field::Temperature,
        Field::HeartRate,
        Field::RespiratoryRate,
        Field::OxygenSaturation,
        Field::BloodPressure,
        Field::Height,
        Field::Weight,
        Field::Bmi,
        Field::PainScale,
        Field::PainLocation,
        Field::PresentingComplaints,
        Field::OtherComplaintDetails,
        Field::ComplaintBackground,
        Field::PastMedicalHistory,
        Field::KnownAllergies,
        Field::CurrentMedications,
        Field::SpecialMedicalNeeds,
        Field::ChronicConditionsAlert,
        Field::ChronicConditions,
        Field::NurseObservations,
        Field::InterventionsProvided,
        Field::MedicationsAdministered,
        Field::NextSteps,
        Field::OtherNextStepDetails,
        Field::ReferralType,
        Field::FollowUpDate,
        Field::AdmissionDate,
        Field::AdmissionTime,
        Field::ConditionOnAdmission,
        Field::PlanOfCare,
        Field::DischargeTime,
        Field::ConditionAtDischarge,
        Field::DischargeInstructions,
        Field::ReturnToClassTime,
        Field::ParentNotified,
        Field::ParentNotificationTime,
        Field::IncidentReportRequired,
        Field::Notes,
        Field::CreatedAt,
        Field::UpdatedAt,
    ];

    /// Fields that must be non-empty on every persisted record.
    pub const REQUIRED: [Field; 4] = [
        Field::FullName,
        Field::DateOfVisit,
        Field::TimeOfVisit,
        Field::NurseName,
    ];

    fn spec(self) -> FieldSpec {
        use FieldKind::*;

        match self {
            Field::PatientId => spec("Patient ID", &["patient_id"], Identifier),
            Field::FullName => spec("Full Name", &["full_name"], RequiredText),
            Field::DateOfBirth => spec("Date of Birth", &["date_of_birth"], Date),
            Field::Age => spec("Age", &["age"], Integer),
            Field::Gender => spec("Gender", &["gender"], Text),
            Field::GradeLevel => spec("Grade/Year Level", &["grade_level"], Text),
            Field::HouseSection => spec("House/Section", &["house_section"], Text),
            Field::ParentPrimaryName => spec(
                "Parent/Guardian Primary Contact Name",
                &["parent_primary_name"],
                Text,
            ),
            Field::ParentPrimaryPhone => spec(
                "Parent/Guardian Primary Contact Number",
                &["parent_primary_phone"],
                Text,
            ),
            Field::ParentSecondaryName => spec(
                "Parent/Guardian Secondary Contact Name",
                &["parent_secondary_name"],
                Text,
            ),
            Field::ParentSecondaryPhone => spec(
                "Parent/Guardian Secondary Contact Number",
                &["parent_secondary_phone"],
                Text,
            ),
            Field::EmergencyContactName => {
                spec("Emergency Contact Name", &["emergency_contact_name"], Text)
            }
            Field::EmergencyContactPhone => {
                spec("Emergency Contact Number", &["emergency_contact_phone"], Text)
            }
            Field::HomeroomTeacher => spec(
                "Student's Class/Homeroom Teacher",
                &["homeroom_teacher"],
                Text,
            ),
            Field::AcademicYear => spec("Academic Year", &["academic_year"], Text),
            Field::AcademicTerm => spec("Academic Term", &["academic_term"], Text),
            Field::DateOfVisit => spec("Date of Visit", &["date_of_visit"], Date),
            Field::TimeOfVisit => spec("Time of Visit", &["time_of_visit"], Time),
            Field::BroughtInBy => spec("Brought in by", &["brought_in_by"], Text),
            Field::NurseName => spec("Nurse Name/ID", &["nurse_name"], RequiredText),
            Field::VisitReasonCategory => spec(
                "Visit Reason Category",
                &["visit_reason_category"],
                Text,
            ),
            Field::SeverityLevel => spec("Severity Level", &["severity_level"], Text),
            Field::VisitDetails => spec("Visit Details", &["visit_details"], Text),
            Field::Temperature => spec("Temperature (°C)", &["temperature"], Real),
            Field::HeartRate => spec("Pulse (bpm)", &["heart_rate"], Integer),
            Field::RespiratoryRate => {
                spec("Respiratory rate (cpm)", &["respiratory_rate"], Integer)
            }
            Field::OxygenSaturation => {
                spec("Oxygen saturation (%)", &["oxygen_saturation"], Real)
            }
            Field::BloodPressure => spec(
                "Blood pressure (mmHg)",
                &["blood_pressure_systolic", "blood_pressure_diastolic"],
                BloodPressure,
            ),
            Field::Height => spec("Height (in)", &["height"], Real),
            Field::Weight => spec("Weight (lbs)", &["weight"], Real),
            Field::Bmi => spec("BMI", &["bmi"], Real),
            Field::PainScale => spec("Pain Scale (0-10)", &["pain_scale"], Integer),
            Field::PainLocation => spec("Pain Location", &["pain_location"], Text),
            Field::PresentingComplaints => spec(
                "Presenting Complaint(s)",
                &["presenting_complaints"],
                Text,
            ),
            Field::OtherComplaintDetails => spec(
                "Other Complaint Details",
                &["other_complaint_details"],
                Text,
            ),
            Field::ComplaintBackground => spec(
                "Background to Presenting Complaint(s)",
                &["complaint_background"],
                Text,
            ),
            Field::PastMedicalHistory => {
                spec("Past Medical History", &["past_medical_history"], Text)
            }
            Field::KnownAllergies => spec("Known Allergies", &["known_allergies"], Text),
            Field::CurrentMedications => {
                spec("Current Medications", &["current_medications"], Text)
            }
            Field::SpecialMedicalNeeds => spec(
                "Special Medical Needs Flag",
                &["special_medical_needs"],
                Flag,
            ),
            Field::ChronicConditionsAlert => spec(
                "Chronic Conditions Alert",
                &["chronic_conditions_alert"],
                Flag,
            ),
            Field::ChronicConditions => {
                spec("Chronic Conditions", &["chronic_conditions"], Text)
            }
            Field::NurseObservations => {
                spec("Nurse Observations", &["nurse_observations"], Text)
            }
            Field::InterventionsProvided => spec(
                "Interventions Provided",
                &["interventions_provided"],
                Text,
            ),
            Field::MedicationsAdministered => spec(
                "Medications Administered (during visit)",
                &["medications_administered"],
                Text,
            ),
            Field::NextSteps => spec("Next Step(s)", &["next_steps"], Text),
            Field::OtherNextStepDetails => spec(
                "Other Next Step Details",
                &["other_next_step_details"],
                Text,
            ),
            Field::ReferralType => spec("Referral Type", &["referral_type"], Text),
            Field::FollowUpDate => spec("Follow-up Date", &["follow_up_date"], Date),
            Field::AdmissionDate => spec(
                "Date of Admission (Sick Bay)",
                &["admission_date"],
                Date,
            ),
            Field::AdmissionTime => spec(
                "Time of Admission (Sick Bay)",
                &["admission_time"],
                Time,
            ),
            Field::ConditionOnAdmission => spec(
                "Student's Condition on Admission (Sick Bay)",
                &["condition_on_admission"],
                Text,
            ),
            Field::PlanOfCare => spec("Plan of Care (Sick Bay)", &["plan_of_care"], Text),
            Field::DischargeTime => spec("Time of Discharge", &["discharge_time"], Time),
            Field::ConditionAtDischarge => spec(
                "Student's Condition at Discharge",
                &["condition_at_discharge"],
                Text,
            ),
            Field::DischargeInstructions => spec(
                "Discharge Instructions",
                &["discharge_instructions"],
                Text,
            ),
            Field::ReturnToClassTime => {
                spec("Return to Class Time", &["return_to_class_time"], Time)
            }
            Field::ParentNotified => spec(
                "Parent Notification (Yes/No)",
                &["parent_notified"],
                Flag,
            ),
            Field::ParentNotificationTime => spec(
                "Parent Notification Time",
                &["parent_notification_time"],
                Time,
            ),
            Field::IncidentReportRequired => spec(
                "Incident Report Required (Yes/No)",
                &["incident_report_required"],
                Flag,
            ),
            Field::Notes => spec("Notes/Comments", &["notes"], Text),
            Field::CreatedAt => spec("Created At", &["created_at"], Timestamp),
            Field::UpdatedAt => spec("Updated At", &["updated_at"], Timestamp),
        }
    }

    /// Column header in the tabular file.
    pub fn header(self) -> &'static str {
        self.spec().header
    }

    /// Relational column(s) backing this field.
    pub fn columns(self) -> &'static [&'static str] {
        self.spec().columns
    }

    pub fn kind(self) -> FieldKind {
        self.spec().kind
    }

    /// Position of this field's column in the tabular file.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Exact header lookup.
    pub fn from_header(header: &str) -> Option<Field> {
        Self::ALL.iter().copied().find(|f| f.header() == header)
    }

    /// Header lookup that reports the closest known header on a miss.
    pub fn lookup(header: &str) -> Result<Field, FieldError> {
        Self::from_header(header).ok_or_else(|| {
            let reason = match Self::closest_header(header) {
                Some(suggestion) => format!("unknown field, did you mean '{}'?", suggestion),
                None => "unknown field".to_string(),
            };
            FieldError::new(header, reason)
        })
    }

    /// Closest known header by normalized Levenshtein similarity.
    fn closest_header(header: &str) -> Option<&'static str> {
        let needle = header.to_lowercase();
        Self::ALL
            .iter()
            .map(|f| {
                let score = strsim::normalized_levenshtein(&needle, &f.header().to_lowercase());
                (f.header(), score)
            })
            .filter(|(_, score)| *score >= 0.6)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(h, _)| h)
    }

    /// All fixed headers, in column order.
    pub fn headers() -> Vec<&'static str> {
        Self::ALL.iter().map(|f| f.header()).collect()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}
