//! Spreadsheet export download.
//!
//! The back office renders the report; this side only names the file and
//! writes the bytes.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use crate::error::{RegisterError, Result};

pub const EXPORT_FORMAT: &str = "xlsx";

pub fn report_file_name(date: NaiveDate) -> String {
    format!("cash_register_report_{}.{EXPORT_FORMAT}", date.format("%Y-%m-%d"))
}

/// Write a downloaded report into `dir`, creating the directory if needed.
pub async fn write_report(dir: &Path, date: NaiveDate, bytes: &[u8]) -> Result<PathBuf> {
    if bytes.is_empty() {
        return Err(RegisterError::Decode("export returned an empty file".into()));
    }
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(report_file_name(date));
    tokio::fs::write(&path, bytes).await?;
    info!(path = %path.display(), size = bytes.len(), "Report exported");
    Ok(path)
}
