use crate::config::MetadataConfig;
use crate::error::{AppError, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Markers left by the original database export; any line containing one
/// is a header or footer, not data.
const EXPORT_MARKERS: [&str; 3] = ["[", "SQL", "Oracle"];

/// One loaded reference table: named columns plus raw comma-delimited rows.
#[derive(Debug, Clone)]
pub struct RefTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<String>,
}

impl RefTable {
    pub fn load(name: &str, data_file: &Path, columns_file: &Path) -> Result<Self> {
        let columns = read_column_names(columns_file)?;
        let data = fs::read_to_string(data_file)?;
        let rows = clean_rows(&data);

        debug!(
            "Loaded table {}: {} columns, {} rows",
            name,
            columns.len(),
            rows.len()
        );

        Ok(Self {
            name: name.to_string(),
            columns,
            rows,
        })
    }

    /// Index of a named column, exact match. A missing column means the
    /// column file and the export disagree, which is fatal.
    pub fn column_index(&self, column: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|c| c == column)
            .ok_or_else(|| AppError::Schema {
                column: column.to_string(),
                table: self.name.clone(),
            })
    }

    /// Splits a raw row into trimmed cells.
    pub fn cells(row: &str) -> Vec<&str> {
        row.split(',').map(str::trim).collect()
    }
}

fn read_column_names(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Strips export headers/footers and keeps only comma-containing data lines.
fn clean_rows(data: &str) -> Vec<String> {
    data.lines()
        .map(str::trim)
        .filter(|line| !EXPORT_MARKERS.iter().any(|m| line.contains(m)))
        .filter(|line| line.contains(','))
        .map(str::to_string)
        .collect()
}

/// Immutable snapshot of the three reference tables, loaded once per
/// resolution request and passed by reference afterwards.
#[derive(Debug, Clone)]
pub struct TableSnapshot {
    pub source: RefTable,
    pub geog_areas: RefTable,
    pub capabilities: RefTable,
}

impl TableSnapshot {
    pub fn load(metadata: &MetadataConfig) -> Result<Self> {
        Ok(Self {
            source: RefTable::load(
                "SOURCE",
                &metadata.source_file,
                &metadata.source_columns_file,
            )?,
            geog_areas: RefTable::load(
                "GEOG",
                &metadata.geog_area_file,
                &metadata.geog_area_columns_file,
            )?,
            capabilities: RefTable::load(
                "SRCC",
                &metadata.capability_file,
                &metadata.capability_columns_file,
            )?,
        })
    }
}
