use crate::bbox::BoundingBox;
use crate::catalog::{list_partitions, resolve_table_identity, row_headers, Region};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::output::finalize;
use crate::stations::{resolve_stations, StationQuery};
use crate::subset::{ColumnSelection, Condition, ExtractOptions, Extractor};
use crate::tables::TableSnapshot;
use crate::timewindow::{parse_time_long, TimeWindow};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn};

/// A one-shot job description, loaded from a YAML file. The date-range
/// chunk splitter lives upstream; an extraction job covers one window and
/// the orchestration layer submits one job per sub-window.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "job", rename_all = "snake_case")]
pub enum JobRequest {
    Stations(StationJob),
    Extract(ExtractJob),
}

/// Raw bounding box as submitted; validated into a `BoundingBox` at run
/// time so malformed boxes fail with a range error, not a parse error.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BBoxSpec {
    pub north: f64,
    pub west: f64,
    pub south: f64,
    pub east: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StationJob {
    #[serde(default)]
    pub counties: Vec<String>,
    pub bbox: Option<BBoxSpec>,
    #[serde(default)]
    pub data_types: Vec<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractJob {
    pub table: String,
    pub start: String,
    pub end: String,
    /// 1-based column indices; omitted means all columns.
    pub columns: Option<Vec<usize>>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub station_ids: Option<Vec<String>>,
    /// File with one station ID per line, merged with `station_ids`.
    pub station_id_file: Option<PathBuf>,
    pub region: Option<Region>,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    pub output: PathBuf,
}

fn default_delimiter() -> String {
    "default".to_string()
}

impl JobRequest {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read request file: {}", e)))?;
        serde_yaml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse request: {}", e)))
    }
}

/// Runs a station search job: resolves matching src_ids and writes them,
/// sorted, one per line to the job's output file.
pub fn run_stations(config: &Config, job: &StationJob) -> Result<Vec<String>> {
    let query = StationQuery {
        counties: job.counties.clone(),
        bbox: job
            .bbox
            .map(|b| BoundingBox::new(b.north, b.west, b.south, b.east))
            .transpose()?,
        data_types: job.data_types.clone(),
        start: job.start.as_deref().map(parse_time_long).transpose()?,
        end: job.end.as_deref().map(parse_time_long).transpose()?,
    };

    let tables = TableSnapshot::load(&config.metadata)?;
    let mut stations = resolve_stations(&tables, &query)?;
    stations.sort();

    let mut out = fs::File::create(&job.output)?;
    for src_id in &stations {
        writeln!(out, "{}", src_id)?;
    }
    info!(
        "Wrote {} station ID(s) to {}",
        stations.len(),
        job.output.display()
    );

    Ok(stations)
}

/// Runs an extraction job over one time window, returning the number of
/// records written.
pub fn run_extract(
    config: &Config,
    job: &ExtractJob,
    shutdown_rx: Option<watch::Receiver<bool>>,
) -> Result<usize> {
    let table = resolve_table_identity(&job.table.to_uppercase())?;
    let window = TimeWindow::parse(&job.start, &job.end)?;
    let headers = row_headers(&config.metadata, &table)?;

    let region = if job.region.is_some() && !table.is_global() {
        warn!(
            "Region filter only applies to the global table; ignoring for {}",
            table.canonical_name
        );
        None
    } else {
        job.region
    };

    let partitions = list_partitions(&config.data, &table, &window, region)?;

    let options = ExtractOptions {
        columns: match &job.columns {
            Some(indices) if !indices.is_empty() => ColumnSelection::Indices(indices.clone()),
            _ => ColumnSelection::All,
        },
        conditions: job.conditions.clone(),
        station_ids: load_station_ids(job)?,
    };

    let mut extractor = Extractor::new(&config.data);
    if let Some(rx) = shutdown_rx {
        extractor = extractor.with_shutdown(rx);
    }

    let mut report = |percent: u8| {
        info!("Station data being extracted: {}% complete", percent);
    };
    let buffer = extractor.extract(
        &table,
        &headers,
        &partitions,
        &window,
        &options,
        Some(&mut report),
    )?;

    finalize(buffer, &headers, &job.output, &job.delimiter)
}

/// Merges the inline station-ID list with the optional one-per-line file.
fn load_station_ids(job: &ExtractJob) -> Result<Option<HashSet<String>>> {
    let mut ids: HashSet<String> = job
        .station_ids
        .clone()
        .unwrap_or_default()
        .into_iter()
        .collect();

    if let Some(path) = &job.station_id_file {
        let content = fs::read_to_string(path)?;
        ids.extend(
            content
                .split_whitespace()
                .map(str::to_string)
                .filter(|s| !s.is_empty()),
        );
    }

    if job.station_ids.is_none() && job.station_id_file.is_none() {
        Ok(None)
    } else {
        Ok(Some(ids))
    }
}
