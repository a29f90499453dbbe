// 📦 Hand-off files - deletion_plan.json and entry CSV export
// The plan file is the contract between `investigate` and `cleanup`

use crate::extractor::Entry;
use crate::resolver::PlanItem;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

pub const DEFAULT_PLAN_FILE: &str = "deletion_plan.json";

pub fn write_plan(path: &Path, items: &[PlanItem]) -> Result<()> {
    let json = serde_json::to_string_pretty(items)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write deletion plan: {}", path.display()))?;
    Ok(())
}

pub fn read_plan(path: &Path) -> Result<Vec<PlanItem>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read deletion plan: {}", path.display()))?;
    serde_json::from_str(&json).context("Failed to parse deletion plan JSON")
}

// ============================================================================
// CSV EXPORT
// ============================================================================

/// Flat CSV shape of an Entry
#[derive(Debug, Serialize)]
struct EntryRow<'a> {
    last_name: &'a str,
    first_name: &'a str,
    section: &'a str,
    events: String,
    email: &'a str,
    status: &'a str,
    gross_amount: Option<f64>,
    net_amount: Option<f64>,
    notes: String,
}

impl<'a> From<&'a Entry> for EntryRow<'a> {
    fn from(entry: &'a Entry) -> Self {
        EntryRow {
            last_name: &entry.last_name,
            first_name: &entry.first_name,
            section: entry.section.as_deref().unwrap_or(""),
            events: entry
                .events
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<_>>()
                .join(";"),
            email: entry.email.as_deref().unwrap_or(""),
            status: entry.status.as_str(),
            gross_amount: entry.gross_amount,
            net_amount: entry.net_amount,
            notes: entry.notes.join(" | "),
        }
    }
}

pub fn write_entries_csv<W: Write>(writer: W, entries: &[Entry]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    for entry in entries {
        wtr.serialize(EntryRow::from(entry))
            .with_context(|| format!("Failed to write CSV row for {}", entry.full_name()))?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn export_entries_csv(path: &Path, entries: &[Entry]) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    write_entries_csv(file, entries)
}
