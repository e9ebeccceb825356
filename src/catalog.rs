use crate::config::{DataConfig, MetadataConfig};
use crate::error::{AppError, Result};
use crate::timewindow::TimeWindow;
use regex_lite::Regex;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::debug;

/// Short code to canonical observation table name.
const NAME_MAP: [(&str, &str); 14] = [
    ("STXX", "SOIL_TEMP_OB"),
    ("SRCC", "SRC_CAPABILITY"),
    ("GLXX", "GBL_WX_OB"),
    ("SRCE", "SOURCE"),
    ("TMSL", "TEMP_MIN_SOIL_OB"),
    ("MRXX", "MARINE_OB"),
    ("ROXX", "RADT_OB_V2"),
    ("TDXX", "TEMP_DRNL_OB"),
    ("WDXX", "WEATHER_DRNL_OB"),
    ("RDXX", "RAIN_DRNL_OB"),
    ("RSXX", "RAIN_SUBHRLY_OB"),
    ("RHXX", "RAIN_HRLY_OB"),
    ("WMXX", "WIND_MEAN_OB"),
    ("WHXX", "WEATHER_HRLY_OB"),
];

/// World regions used to partition the global weather table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    Africa,
    Asia,
    SouthAmerica,
    NorthCentralAmerica,
    SouthWestPacific,
    Europe,
    Antarctic,
}

impl Region {
    const ALL: [Region; 7] = [
        Region::Africa,
        Region::Asia,
        Region::SouthAmerica,
        Region::NorthCentralAmerica,
        Region::SouthWestPacific,
        Region::Europe,
        Region::Antarctic,
    ];

    /// Token embedded in global-table partition filenames.
    pub fn token(&self) -> &'static str {
        match self {
            Region::Africa => "glblwx-africa",
            Region::Asia => "glblwx-asia",
            Region::SouthAmerica => "glblwx-south-america",
            Region::NorthCentralAmerica => "glblwx-north-central-america",
            Region::SouthWestPacific => "glblwx-south-west-pacific",
            Region::Europe => "glblwx-europe",
            Region::Antarctic => "glblwx-antarctic",
        }
    }

    fn all_tokens() -> [&'static str; 7] {
        Self::ALL.map(|region| region.token())
    }
}

/// Canonical identity of an observation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableIdentity {
    /// Four-character short code, e.g. "RHXX".
    pub short_code: String,
    /// Canonical table name, e.g. "RAIN_HRLY_OB".
    pub canonical_name: String,
}

impl TableIdentity {
    /// Two-character ID keying the `<ID>TB.txt` column-structure file.
    pub fn structure_id(&self) -> &str {
        &self.short_code[..2]
    }

    /// Token embedded in this table's partition filenames; the global
    /// table uses region tokens instead.
    pub fn partition_token(&self) -> String {
        self.short_code.to_lowercase()
    }

    pub fn is_global(&self) -> bool {
        self.short_code == "GLXX"
    }
}

/// Resolves a short code or canonical name to a table identity. A code
/// shorter than the full four characters is tried as-is and then with an
/// "XX" suffix, so "RH" and "RHXX" are equivalent.
pub fn resolve_table_identity(name: &str) -> Result<TableIdentity> {
    let unknown = || AppError::UnknownTable(name.to_string());

    if name.len() < 5 {
        let found = NAME_MAP
            .iter()
            .find(|(short, _)| *short == name)
            .or_else(|| {
                let suffixed = format!("{}XX", name);
                NAME_MAP.iter().find(|(short, _)| *short == suffixed)
            })
            .ok_or_else(unknown)?;

        Ok(TableIdentity {
            short_code: found.0.to_string(),
            canonical_name: found.1.to_string(),
        })
    } else {
        let found = NAME_MAP
            .iter()
            .find(|(_, long)| *long == name)
            .ok_or_else(unknown)?;

        Ok(TableIdentity {
            short_code: found.0.to_string(),
            canonical_name: found.1.to_string(),
        })
    }
}

/// One on-disk partition file and the month range embedded in its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionFile {
    pub path: PathBuf,
    pub token: String,
    pub start_month: i64,
    pub end_month: i64,
}

fn partition_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([a-zA-Z\-]+)_(\d{6})-(\d{6})\.txt$").unwrap())
}

/// Enumerates the partition files covering a time window.
///
/// Filenames are `<prefix>_<token>_<YYYYMM>-<YYYYMM>.txt`; anything else in
/// the partition directory is skipped silently. A partition is kept when
/// its month range intersects the window. For the global table the token
/// is a region name and an optional region filter excludes the rest.
pub fn list_partitions(
    data: &DataConfig,
    table: &TableIdentity,
    window: &TimeWindow,
    region: Option<Region>,
) -> Result<Vec<PartitionFile>> {
    let pattern = data.partition_dir.join("*.txt");
    let entries = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| AppError::Config(format!("Bad partition directory pattern: {}", e)))?;

    let mut paths: Vec<PathBuf> = entries.filter_map(|entry| entry.ok()).collect();
    paths.sort();

    let name_prefix = format!("{}_", data.file_prefix);
    let table_token = table.partition_token();
    let region_tokens = Region::all_tokens();

    let mut partitions = Vec::new();
    for path in paths {
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
            continue;
        };
        let Some(rest) = file_name.strip_prefix(&name_prefix) else {
            continue;
        };
        let Some(caps) = partition_name_pattern().captures(rest) else {
            continue;
        };

        let token = caps[1].to_string();
        let matches_table = if table.is_global() {
            region_tokens.contains(&token.as_str())
        } else {
            token == table_token
        };
        if !matches_table {
            continue;
        }

        if let Some(region) = region {
            if token != region.token() {
                continue;
            }
        }

        // Digits guaranteed by the pattern.
        let start_month: i64 = caps[2].parse().unwrap();
        let end_month: i64 = caps[3].parse().unwrap();

        if end_month < window.start_month() || start_month > window.end_month() {
            continue;
        }

        partitions.push(PartitionFile {
            path,
            token,
            start_month,
            end_month,
        });
    }

    debug!(
        "Selected {} partition(s) for table {} in {}-{}",
        partitions.len(),
        table.canonical_name,
        window.start_month(),
        window.end_month()
    );
    Ok(partitions)
}

/// Reads the lowercase column headers for a table from its structure file.
pub fn row_headers(metadata: &MetadataConfig, table: &TableIdentity) -> Result<Vec<String>> {
    let path = metadata
        .table_structures_dir
        .join(format!("{}TB.txt", table.structure_id()));
    let content = fs::read_to_string(&path)?;
    Ok(content
        .lines()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect())
}

/// Index of a named column within a table's row headers.
pub fn header_index(headers: &[String], table: &TableIdentity, column: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| AppError::Schema {
            column: column.to_string(),
            table: table.structure_id().to_string(),
        })
}
