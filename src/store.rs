//! Persisted record store: one CSV row per [`LossRecord`].
//!
//! Columns are exactly `equipment_type, category, loss_type, link_type,
//! link, date, manually_changed`. Stores written before the lock flag
//! existed load with every row unlocked. Saves go to a sibling temp file
//! that is renamed over the store, so readers never see a partial row.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classify::classify_link;
use crate::models::{DateState, LinkType, LossRecord};

pub const COLUMNS: [&str; 7] = [
    "equipment_type",
    "category",
    "loss_type",
    "link_type",
    "link",
    "date",
    "manually_changed",
];

#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    equipment_type: String,
    category: String,
    loss_type: String,
    link_type: String,
    link: String,
    #[serde(default)]
    date: String,
    #[serde(default)]
    manually_changed: String,
}

/// Load the store. A missing file is an empty store, not an error.
pub fn load_records(path: &Path) -> Result<Vec<LossRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .from_path(path)
        .with_context(|| format!("Failed to open record store: {}", path.display()))?;

    let mut records = Vec::new();
    for (i, row) in reader.deserialize::<StoredRow>().enumerate() {
        // +2: header line, 1-based
        let line = i + 2;
        let row = row.with_context(|| format!("{}:{}: malformed row", path.display(), line))?;
        records.push(
            from_row(row).with_context(|| format!("{}:{}: invalid row", path.display(), line))?,
        );
    }
    Ok(records)
}

/// Raw `(line, link, date)` cells, without interpreting the date.
///
/// Lets diagnostics inspect a store whose dates would fail [`load_records`].
pub fn read_date_cells(path: &Path) -> Result<Vec<(usize, String, String)>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Fields)
        .from_path(path)
        .with_context(|| format!("Failed to open record store: {}", path.display()))?;

    let mut cells = Vec::new();
    for (i, row) in reader.deserialize::<StoredRow>().enumerate() {
        let line = i + 2;
        let row = row.with_context(|| format!("{}:{}: malformed row", path.display(), line))?;
        cells.push((line, row.link, row.date));
    }
    Ok(cells)
}

/// Replace the store with `records`.
pub fn save_records(path: &Path, records: &[LossRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp = temp_path(path);
    {
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("Failed to write record store: {}", tmp.display()))?;
        for record in records {
            writer.serialize(to_row(record))?;
        }
        if records.is_empty() {
            writer.write_record(COLUMNS)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace record store: {}", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn from_row(row: StoredRow) -> Result<LossRecord> {
    let link_type = row
        .link_type
        .parse::<LinkType>()
        .unwrap_or_else(|_| classify_link(&row.link));
    let date = DateState::from_cell(&row.date).map_err(anyhow::Error::msg)?;
    let manually_changed = parse_flag(&row.manually_changed)
        .ok_or_else(|| anyhow::anyhow!("bad manually_changed value: '{}'", row.manually_changed))?;

    Ok(LossRecord {
        equipment_type: row.equipment_type,
        category: row.category,
        loss_type: row.loss_type,
        link_type,
        link: row.link,
        date,
        manually_changed,
    })
}

fn to_row(record: &LossRecord) -> StoredRow {
    StoredRow {
        equipment_type: record.equipment_type.clone(),
        category: record.category.clone(),
        loss_type: record.loss_type.clone(),
        link_type: record.link_type.as_str().to_string(),
        link: record.link.clone(),
        date: record.date.as_cell().to_string(),
        manually_changed: record.manually_changed.to_string(),
    }
}

/// Booleans as written by this tool and by earlier spreadsheet tooling.
fn parse_flag(cell: &str) -> Option<bool> {
    match cell.trim().to_ascii_lowercase().as_str() {
        "" | "false" | "0" | "no" => Some(false),
        "true" | "1" | "yes" => Some(true),
        _ => None,
    }
}
