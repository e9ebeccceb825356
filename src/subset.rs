use crate::catalog::{header_index, PartitionFile, TableIdentity};
use crate::config::DataConfig;
use crate::error::{AppError, Result};
use crate::timewindow::{date_field_to_long, TimeWindow};
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing::{info, warn};

/// Line-count logging granularity inside a partition file.
const PROGRESS_LINE_INTERVAL: u64 = 100_000;

/// Candidate date columns, tried in order against the table headers.
const DATE_COLUMNS: [&str; 3] = ["ob_time", "ob_date", "ob_end_time"];

const SRC_ID_COLUMN: &str = "src_id";

/// Which columns of each matching row are written out.
#[derive(Debug, Clone, Default)]
pub enum ColumnSelection {
    #[default]
    All,
    /// 1-based column indices, projected in the order given.
    Indices(Vec<usize>),
}

impl ColumnSelection {
    pub fn is_all(&self) -> bool {
        matches!(self, ColumnSelection::All)
    }
}

/// A value condition on one named column. Numeric predicates parse the
/// cell as a float and reject the row when it does not parse.
#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub column: String,
    #[serde(flatten)]
    pub predicate: Predicate,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Range { low: f64, high: f64 },
    GreaterThan { value: f64 },
    LessThan { value: f64 },
    Exact { value: String },
    Pattern { value: String },
}

/// A condition bound to a column index, with its pattern compiled.
struct BoundCondition {
    index: usize,
    test: BoundTest,
}

enum BoundTest {
    Range { low: f64, high: f64 },
    GreaterThan(f64),
    LessThan(f64),
    Exact(String),
    Pattern(Regex),
}

impl BoundCondition {
    fn bind(condition: &Condition, headers: &[String], table: &TableIdentity) -> Result<Self> {
        let index = header_index(headers, table, &condition.column)?;
        let test = match &condition.predicate {
            Predicate::Range { low, high } => BoundTest::Range {
                low: *low,
                high: *high,
            },
            Predicate::GreaterThan { value } => BoundTest::GreaterThan(*value),
            Predicate::LessThan { value } => BoundTest::LessThan(*value),
            Predicate::Exact { value } => BoundTest::Exact(value.clone()),
            Predicate::Pattern { value } => {
                let regex = Regex::new(value).map_err(|e| {
                    AppError::Parse(format!("Bad condition pattern '{}': {}", value, e))
                })?;
                BoundTest::Pattern(regex)
            }
        };
        Ok(Self { index, test })
    }

    fn matches(&self, cells: &[&str]) -> bool {
        let Some(cell) = cells.get(self.index) else {
            return false;
        };
        match &self.test {
            BoundTest::Range { low, high } => cell
                .parse::<f64>()
                .map(|v| *low <= v && v <= *high)
                .unwrap_or(false),
            BoundTest::GreaterThan(value) => {
                cell.parse::<f64>().map(|v| v > *value).unwrap_or(false)
            }
            BoundTest::LessThan(value) => {
                cell.parse::<f64>().map(|v| v < *value).unwrap_or(false)
            }
            BoundTest::Exact(value) => cell == value,
            BoundTest::Pattern(regex) => regex.is_match(cell),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    pub columns: ColumnSelection,
    pub conditions: Vec<Condition>,
    /// When set, only rows whose src_id is a member qualify.
    pub station_ids: Option<HashSet<String>>,
}

/// Temporary buffer holding extracted rows. The backing file is removed
/// when the buffer is dropped, so every exit path cleans up.
#[derive(Debug)]
pub struct TempBuffer {
    path: PathBuf,
    pub records: u64,
}

impl TempBuffer {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempBuffer {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove temp buffer {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Streams the selected partitions in order, filtering rows by time window,
/// station membership and value conditions.
pub struct Extractor<'a> {
    data: &'a DataConfig,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl<'a> Extractor<'a> {
    pub fn new(data: &'a DataConfig) -> Self {
        Self {
            data,
            shutdown_rx: None,
        }
    }

    /// Attaches a shutdown channel checked between partitions.
    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Extracts matching rows into a temp buffer. `headers` are the
    /// table's lowercase column names; `progress` (if given) receives a
    /// percent-complete after each partition.
    pub fn extract(
        &self,
        table: &TableIdentity,
        headers: &[String],
        partitions: &[PartitionFile],
        window: &TimeWindow,
        options: &ExtractOptions,
        mut progress: Option<&mut dyn FnMut(u8)>,
    ) -> Result<TempBuffer> {
        let time_index = date_column_index(table, headers)?;
        let src_id_index = if options.station_ids.is_some() {
            Some(header_index(headers, table, SRC_ID_COLUMN)?)
        } else {
            None
        };
        let conditions = options
            .conditions
            .iter()
            .map(|c| BoundCondition::bind(c, headers, table))
            .collect::<Result<Vec<_>>>()?;

        std::fs::create_dir_all(&self.data.temp_dir)?;
        let stamp = chrono::Local::now().format("%Y%m%d.%H%M%S");
        let temp = tempfile::Builder::new()
            .prefix(&format!("temp_{}.", stamp))
            .tempfile_in(&self.data.temp_dir)?;
        let (file, temp_path) = temp.keep().map_err(|e| AppError::Io(e.error))?;
        let mut buffer = TempBuffer {
            path: temp_path,
            records: 0,
        };

        if options.columns.is_all() && conditions.is_empty() {
            info!(
                "Extracting all rows of {} from {} file(s) between {} and {}",
                table.canonical_name,
                partitions.len(),
                window.start,
                window.end
            );
        } else {
            info!(
                "Extracting row subsets of {} from {} file(s) between {} and {}",
                table.canonical_name,
                partitions.len(),
                window.start,
                window.end
            );
        }

        let mut writer = BufWriter::new(file);
        let total = partitions.len();

        for (done, partition) in partitions.iter().enumerate() {
            if let Some(rx) = &self.shutdown_rx {
                if *rx.borrow() {
                    warn!(
                        "Shutdown requested; stopping extraction after {} of {} partition(s)",
                        done, total
                    );
                    break;
                }
            }

            buffer.records += self.scan_partition(
                partition,
                time_index,
                src_id_index,
                &conditions,
                window,
                options,
                &mut writer,
            )?;

            if let Some(report) = progress.as_mut() {
                let percent = ((done + 1) * 100 / total.max(1)) as u8;
                report(percent);
            }
        }

        writer.flush()?;
        info!("Extracted {} matching line(s)", buffer.records);
        Ok(buffer)
    }

    #[allow(clippy::too_many_arguments)]
    fn scan_partition(
        &self,
        partition: &PartitionFile,
        time_index: usize,
        src_id_index: Option<usize>,
        conditions: &[BoundCondition],
        window: &TimeWindow,
        options: &ExtractOptions,
        writer: &mut BufWriter<File>,
    ) -> Result<u64> {
        info!("Filtering file '{}'", partition.path.display());

        let file = File::open(&partition.path)?;
        let reader = BufReader::new(file);

        let mut line_count: u64 = 0;
        let mut written: u64 = 0;

        for line in reader.lines() {
            let line = line?;
            line_count += 1;
            if line_count % PROGRESS_LINE_INTERVAL == 0 {
                info!("\tRead {} lines...", line_count);
            }

            let line = line.trim();
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();

            // Rows without a readable date at the expected column are
            // skipped; they never terminate the scan.
            let Some(time) = cells.get(time_index).and_then(|c| date_field_to_long(c)) else {
                continue;
            };

            // Partition rows are assumed time-ordered, so the first row
            // past the window end terminates this file. An out-of-order
            // partition would silently lose later rows here.
            if time > window.end {
                info!(
                    "Stopping read of '{}' at line {}: time {} past window end",
                    partition.path.display(),
                    line_count,
                    time
                );
                break;
            }

            if !window.contains(time) {
                continue;
            }

            if let (Some(index), Some(ids)) = (src_id_index, &options.station_ids) {
                let member = cells.get(index).map(|c| ids.contains(*c)).unwrap_or(false);
                if !member {
                    continue;
                }
            }

            if !conditions.iter().all(|c| c.matches(&cells)) {
                continue;
            }

            match &options.columns {
                ColumnSelection::All => {
                    writer.write_all(line.as_bytes())?;
                    writer.write_all(b"\n")?;
                }
                ColumnSelection::Indices(indices) => {
                    let projected: Vec<&str> = indices
                        .iter()
                        .filter_map(|i| i.checked_sub(1).and_then(|i| cells.get(i).copied()))
                        .collect();
                    writer.write_all(projected.join(", ").as_bytes())?;
                    writer.write_all(b"\n")?;
                }
            }
            written += 1;
        }

        Ok(written)
    }
}

/// Resolves the table's date column, trying each known name in turn.
fn date_column_index(table: &TableIdentity, headers: &[String]) -> Result<usize> {
    for candidate in DATE_COLUMNS {
        if let Ok(index) = header_index(headers, table, candidate) {
            return Ok(index);
        }
    }
    Err(AppError::Schema {
        column: DATE_COLUMNS.join("|"),
        table: table.structure_id().to_string(),
    })
}
