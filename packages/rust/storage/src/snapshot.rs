//! Non-incremental output: the whole projected table written once.
//!
//! Every writer goes through a temp file and a rename, so a crash leaves
//! either the previous file or the complete new one.

use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, XlsxError};
use tracing::{info, instrument};

use leadfill_shared::{LeadfillError, Record, Result};

use crate::writer::ProjectedRecord;

/// Write all records as one pretty-printed JSON list.
#[instrument(skip_all, fields(path = %path.display(), records = records.len()))]
pub fn write_json_snapshot(path: &Path, columns: &[String], records: &[Record]) -> Result<()> {
    let projected: Vec<ProjectedRecord<'_>> = records
        .iter()
        .map(|record| ProjectedRecord::new(columns, record))
        .collect();

    let json = serde_json::to_string_pretty(&projected)
        .map_err(|e| LeadfillError::Serialization(e.to_string()))?;

    write_atomic(path, json.as_bytes())?;
    info!("JSON snapshot written");
    Ok(())
}

/// Write all records as a CSV table with a header row.
#[instrument(skip_all, fields(path = %path.display(), records = records.len()))]
pub fn write_table(path: &Path, columns: &[String], records: &[Record]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(columns)
        .map_err(|e| LeadfillError::Serialization(e.to_string()))?;
    for record in records {
        writer
            .write_record(columns.iter().map(|c| record.get(c)))
            .map_err(|e| LeadfillError::Serialization(e.to_string()))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| LeadfillError::Serialization(e.to_string()))?;

    write_atomic(path, &bytes)?;
    info!("table written");
    Ok(())
}

/// Write all records as a one-sheet Excel workbook: a bold header row, then
/// one row per record in `columns` order. Empty values are left as blank cells.
#[instrument(skip_all, fields(path = %path.display(), records = records.len()))]
pub fn write_xlsx(path: &Path, columns: &[String], records: &[Record]) -> Result<()> {
    let column_count = u16::try_from(columns.len())
        .map_err(|_| LeadfillError::validation(format!("too many columns: {}", columns.len())))?;
    let row_count = u32::try_from(records.len())
        .ok()
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| LeadfillError::validation(format!("too many rows: {}", records.len())))?;

    let bytes = build_workbook(columns, records, column_count, row_count)
        .map_err(|e| LeadfillError::Serialization(e.to_string()))?;

    write_atomic(path, &bytes)?;
    info!("workbook written");
    Ok(())
}

fn build_workbook(
    columns: &[String],
    records: &[Record],
    column_count: u16,
    row_count: u32,
) -> std::result::Result<Vec<u8>, XlsxError> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("records")?;

    for (col, name) in (0..column_count).zip(columns) {
        sheet.write_string_with_format(0, col, name, &header)?;
    }
    for (row, record) in (1..row_count).zip(records) {
        for (col, name) in (0..column_count).zip(columns) {
            let value = record.get(name);
            if !value.is_empty() {
                sheet.write_string(row, col, value)?;
            }
        }
    }

    workbook.save_to_buffer()
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LeadfillError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| LeadfillError::validation(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    // Write to temp file first
    std::fs::write(&temp, bytes).map_err(|e| LeadfillError::io(&temp, e))?;

    // Atomic rename
    std::fs::rename(&temp, path).map_err(|e| LeadfillError::io(path, e))?;
    Ok(())
}
