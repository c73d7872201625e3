//! Runtime settings from the environment (and `.env`).

use std::path::PathBuf;

pub const DB_ENV: &str = "NURSE_LOG_DB";
pub const SHEET_ENV: &str = "NURSE_LOG_SHEET";

pub const DEFAULT_DB_PATH: &str = "instance/nurse_records.db";
pub const DEFAULT_SHEET_PATH: &str = "SchoolNurse_HealthLog.csv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub db_path: PathBuf,
    pub sheet_path: PathBuf,
}

impl Settings {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through `lookup`; unset or blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default))
        };
        Self {
            db_path: resolve(DB_ENV, DEFAULT_DB_PATH),
            sheet_path: resolve(SHEET_ENV, DEFAULT_SHEET_PATH),
        }
    }

    /// Command-line flags win over the environment.
    pub fn with_overrides(mut self, db: Option<PathBuf>, sheet: Option<PathBuf>) -> Self {
        if let Some(db) = db {
            self.db_path = db;
        }
        if let Some(sheet) = sheet {
            self.sheet_path = sheet;
        }
        self
    }
}
