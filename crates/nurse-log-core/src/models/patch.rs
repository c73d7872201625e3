//! Partial updates keyed by field.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{Field, FieldError, HealthRecord, ValidationErrors};

/// A validated set of field assignments.
///
/// `Some(value)` sets the field, `None` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    values: BTreeMap<Field, Option<String>>,
}

impl RecordPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a value. Blank text counts as a clear.
    pub fn set(&mut self, field: Field, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        let trimmed = value.trim();
        let value = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self.values.insert(field, value);
        self
    }

    pub fn clear(&mut self, field: Field) -> &mut Self {
        self.values.insert(field, None);
        self
    }

    /// `None` when the field is not part of the patch; `Some(None)` when it clears.
    pub fn get(&self, field: Field) -> Option<Option<&str>> {
        self.values.get(&field).map(|v| v.as_deref())
    }

    pub fn contains(&self, field: Field) -> bool {
        self.values.contains_key(&field)
    }

    pub fn remove(&mut self, field: Field) -> Option<Option<String>> {
        self.values.remove(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, Option<&str>)> {
        self.values.iter().map(|(f, v)| (*f, v.as_deref()))
    }

    /// Identifier carried by the patch, if it sets one.
    pub fn patient_id(&self) -> Option<&str> {
        self.get(Field::PatientId).flatten()
    }

    /// Build from a JSON object keyed by tabular headers.
    ///
    /// Strings, numbers and booleans are accepted; `null` clears.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationErrors> {
        let value: Value = serde_json::from_str(json)
            .map_err(|e| FieldError::new("data", format!("invalid JSON: {}", e)))?;
        Self::from_json(&value)
    }

    pub fn from_json(value: &Value) -> Result<Self, ValidationErrors> {
        let Value::Object(map) = value else {
            return Err(FieldError::new("data", "expected a JSON object of field: value pairs").into());
        };

        let mut patch = Self::new();
        let mut errors = Vec::new();

        for (key, value) in map {
            let field = match Field::lookup(key) {
                Ok(f) => f,
                Err(e) => {
                    errors.push(e);
                    continue;
                }
            };
            match value {
                Value::Null => {
                    patch.clear(field);
                }
                Value::String(s) => {
                    patch.set(field, s.as_str());
                }
                Value::Number(n) => {
                    patch.set(field, n.to_string());
                }
                Value::Bool(b) => {
                    patch.set(field, if *b { "Yes" } else { "No" });
                }
                Value::Array(_) | Value::Object(_) => {
                    errors.push(FieldError::new(key.as_str(), "expected a single value"));
                }
            }
        }

        if errors.is_empty() {
            Ok(patch)
        } else {
            Err(ValidationErrors(errors))
        }
    }

    /// Build from header/cell pairs, keeping only non-blank cells so that
    /// blank cells never erase anything.
    pub fn from_cells<'a, I>(cells: I) -> Self
    where
        I: IntoIterator<Item = (Field, &'a str)>,
    {
        let mut patch = Self::new();
        for (field, cell) in cells {
            if !cell.trim().is_empty() {
                patch.set(field, cell);
            }
        }
        patch
    }

    /// Apply every assignment, collecting all parse failures.
    ///
    /// On error the record may be partially updated; callers work on a copy.
    pub fn apply_to(&self, record: &mut HealthRecord) -> Result<(), ValidationErrors> {
        let errors: Vec<FieldError> = self
            .iter()
            .filter_map(|(field, value)| record.set_cell(field, value).err())
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(errors))
        }
    }

    /// Reject any attempt to change the identifier of an existing record.
    pub fn check_identity(&self, patient_id: &str) -> Result<(), FieldError> {
        match self.get(Field::PatientId) {
            Some(Some(id)) if id == patient_id => Ok(()),
            Some(_) => Err(FieldError::new(
                Field::PatientId.header(),
                "is immutable once assigned",
            )),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json() {
        let patch = RecordPatch::from_json_str(
            r#"{"Full Name": "Ada Obi", "Age": 11, "Parent Notification (Yes/No)": true, "Notes/Comments": null}"#,
        )
        .unwrap();

        assert_eq!(patch.len(), 4);
        assert_eq!(patch.get(Field::FullName), Some(Some("Ada Obi")));
        assert_eq!(patch.get(Field::Age), Some(Some("11")));
        assert_eq!(patch.get(Field::ParentNotified), Some(Some("Yes")));
        assert_eq!(patch.get(Field::Notes), Some(None));
        assert_eq!(patch.get(Field::Gender), None);
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let errors = RecordPatch::from_json_str(r#"{"Ful Name": "Ada", "Age": [1]}"#).unwrap_err();
        assert_eq!(errors.errors().len(), 2);
        assert!(errors
            .errors()
            .iter()
            .any(|e| e.field == "Ful Name" && e.reason.contains("'Full Name'")));
    }

    #[test]
    fn test_from_json_requires_object() {
        assert!(RecordPatch::from_json_str("[1, 2]").is_err());
        assert!(RecordPatch::from_json_str("not json").is_err());
    }

    #[test]
    fn test_from_cells_skips_blank() {
        let patch = RecordPatch::from_cells(vec![
            (Field::FullName, "Ada"),
            (Field::Notes, ""),
            (Field::Gender, "   "),
        ]);
        assert_eq!(patch.len(), 1);
        assert!(!patch.contains(Field::Notes));
    }

    #[test]
    fn test_apply_collects_all_errors() {
        let mut record = HealthRecord::empty("SID1".into());
        let mut patch = RecordPatch::new();
        patch
            .set(Field::Temperature, "hot")
            .set(Field::HeartRate, "fast")
            .set(Field::FullName, "Ada");

        let errors = patch.apply_to(&mut record).unwrap_err();
        assert_eq!(errors.errors().len(), 2);
        assert_eq!(record.full_name, "Ada");
    }

    #[test]
    fn test_check_identity() {
        let mut patch = RecordPatch::new();
        assert!(patch.check_identity("SID1").is_ok());

        patch.set(Field::PatientId, "SID1");
        assert!(patch.check_identity("SID1").is_ok());

        patch.set(Field::PatientId, "SID2");
        assert!(patch.check_identity("SID1").is_err());
    }
}
