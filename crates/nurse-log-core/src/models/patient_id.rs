//! Patient identifier generation.

use chrono::NaiveDateTime;
use sha2::{Digest, Sha256};

/// Generates `SID<yyyymmddHHMMSSmmm>-<hex6>` identifiers.
///
/// The suffix hashes the student's name together with a per-generator
/// sequence number, so two rows imported within the same millisecond (even
/// for the same name) still get distinct identifiers.
#[derive(Debug, Default)]
pub struct PatientIdGenerator {
    sequence: u64,
}

impl PatientIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate an identifier at the current local time.
    pub fn generate<F>(&mut self, full_name: &str, is_taken: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        self.generate_at(chrono::Local::now().naive_local(), full_name, is_taken)
    }

    /// Generate an identifier for a given instant, skipping any candidate `is_taken` reports.
    pub fn generate_at<F>(&mut self, now: NaiveDateTime, full_name: &str, is_taken: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        loop {
            let candidate = format_id(now, full_name, self.sequence);
            self.sequence += 1;
            if !is_taken(&candidate) {
                return candidate;
            }
        }
    }
}

fn format_id(now: NaiveDateTime, full_name: &str, sequence: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_name.trim().to_lowercase().as_bytes());
    hasher.update(sequence.to_be_bytes());
    let digest = hex::encode(hasher.finalize());

    format!("SID{}-{}", now.format("%Y%m%d%H%M%S%3f"), &digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;

    fn instant() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_milli_opt(9, 15, 30, 250)
            .unwrap()
    }

    #[test]
    fn test_format() {
        let mut ids = PatientIdGenerator::new();
        let id = ids.generate_at(instant(), "Ada Obi", |_| false);

        assert!(id.starts_with("SID20240301091530250-"), "{}", id);
        assert_eq!(id.len(), "SID20240301091530250-".len() + 6);
    }

    #[test]
    fn test_deterministic_for_fresh_generator() {
        let a = PatientIdGenerator::new().generate_at(instant(), "Ada Obi", |_| false);
        let b = PatientIdGenerator::new().generate_at(instant(), "ada obi ", |_| false);
        assert_eq!(a, b);
    }

    #[test]
    fn test_same_instant_same_name_unique() {
        let mut ids = PatientIdGenerator::new();
        let generated: HashSet<_> = (0..100)
            .map(|_| ids.generate_at(instant(), "Ada Obi", |_| false))
            .collect();
        assert_eq!(generated.len(), 100);
    }

    #[test]
    fn test_skips_taken() {
        let taken = PatientIdGenerator::new().generate_at(instant(), "Ada Obi", |_| false);

        let mut ids = PatientIdGenerator::new();
        let id = ids.generate_at(instant(), "Ada Obi", |c| c == taken);
        assert_ne!(id, taken);
    }
}
