use crate::types::ScanReport;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::path::Path;
use ::time::{format_description::well_known, OffsetDateTime};

/// File the result lines go to when saving is requested without an explicit path.
pub const DEFAULT_OUTPUT_FILE: &str = "scan_output.txt";

/// Write result lines as plain text, one per line.
pub fn write_lines(path: impl AsRef<Path>, lines: &[String]) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, lines.join("\n"))
        .with_context(|| format!("failed to write results to {}", path.display()))
}

/// Write a run report as pretty JSON.
pub fn write_report_json(path: impl AsRef<Path>, report: &ScanReport) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("failed to create report file {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)
        .with_context(|| format!("failed to serialize report to {}", path.display()))?;
    Ok(())
}

/// RFC 3339 UTC timestamp for report headers.
pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
