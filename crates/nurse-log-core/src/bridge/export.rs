//! Store → tabular export.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::BridgeResult;
use crate::db::Database;
use crate::models::{Field, HealthRecord};

/// What an export wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSummary {
    /// Destination file, when exporting to a path
    pub path: Option<PathBuf>,
    /// Number of data rows
    pub records: usize,
    /// SHA-256 of the written bytes, hex encoded
    pub sha256: String,
}

/// Render records as CSV bytes: header row, then one row per record.
pub fn render_records(records: &[HealthRecord]) -> BridgeResult<Vec<u8>> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(Field::headers())?;
    for record in records {
        writer.write_record(record.cells())?;
    }
    writer.into_inner().map_err(|e| e.into_error().into())
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Write every stored record to `writer`.
pub fn export_records<W: Write>(db: &Database, mut writer: W) -> BridgeResult<ExportSummary> {
    db.ensure_current_schema()?;
    let records = db.list_records()?;
    let bytes = render_records(&records)?;

    writer.write_all(&bytes)?;
    writer.flush()?;

    Ok(ExportSummary {
        path: None,
        records: records.len(),
        sha256: digest(&bytes),
    })
}

/// Write every stored record to a file, creating parent directories.
pub fn export_to_path(db: &Database, path: &Path) -> BridgeResult<ExportSummary> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut bytes = Vec::new();
    let summary = export_records(db, &mut bytes)?;
    fs::write(path, &bytes)?;

    tracing::info!(
        path = %path.display(),
        records = summary.records,
        sha256 = %summary.sha256,
        "exported health records"
    );
    Ok(ExportSummary {
        path: Some(path.to_path_buf()),
        ..summary
    })
}
