// 💾 Backup - full-table JSON snapshot of the store
// Taken before any destructive cleanup; checksum guards against hand edits

use crate::db::TABLES;
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub timestamp: DateTime<Utc>,
    pub database: String,
    pub tables: BTreeMap<String, Vec<Row>>,
    /// SHA-256 of the serialized `tables`
    pub checksum: String,
}

impl Backup {
    pub fn total_records(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }

    pub fn compute_checksum(tables: &BTreeMap<String, Vec<Row>>) -> Result<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(tables)?);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// True when the table contents still match the stored checksum
    pub fn verify(&self) -> Result<bool> {
        Ok(Self::compute_checksum(&self.tables)? == self.checksum)
    }
}

fn value_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(b.iter().map(|byte| format!("{:02x}", byte)).collect()),
    }
}

/// Every row of one known table as a JSON object keyed by column name
pub fn table_rows(conn: &Connection, table: &str) -> Result<Vec<Row>> {
    if !TABLES.contains(&table) {
        anyhow::bail!("Unknown table: {}", table);
    }

    let mut stmt = conn.prepare(&format!("SELECT * FROM {} ORDER BY rowid", table))?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        let mut object = Map::new();
        for (i, name) in columns.iter().enumerate() {
            object.insert(name.clone(), value_to_json(row.get_ref(i)?));
        }
        out.push(object);
    }

    Ok(out)
}

pub fn create_backup(conn: &Connection, database: &str) -> Result<Backup> {
    let mut tables = BTreeMap::new();

    for table in TABLES {
        let rows = table_rows(conn, table)
            .with_context(|| format!("Failed to back up table {}", table))?;
        info!(table, records = rows.len(), "table backed up");
        tables.insert(table.to_string(), rows);
    }

    let checksum = Backup::compute_checksum(&tables)?;

    Ok(Backup {
        timestamp: Utc::now(),
        database: database.to_string(),
        tables,
        checksum,
    })
}

pub fn write_backup(path: &Path, backup: &Backup) -> Result<()> {
    let json = serde_json::to_string_pretty(backup)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write backup: {}", path.display()))?;
    Ok(())
}

pub fn read_backup(path: &Path) -> Result<Backup> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read backup: {}", path.display()))?;
    serde_json::from_str(&json).context("Failed to parse backup JSON")
}

/// `photography_backup_YYYYMMDD_HHMMSS.json`
pub fn default_backup_name(now: &NaiveDateTime) -> String {
    format!("photography_backup_{}.json", now.format("%Y%m%d_%H%M%S"))
}
