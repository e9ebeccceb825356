use crate::error::{AppError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub metadata: MetadataConfig,
    pub data: DataConfig,
}

/// Locations of the reference metadata tables. Each table is a
/// comma-delimited export with a sibling file listing its column names,
/// one per line, index-aligned with the data columns.
#[derive(Debug, Deserialize, Clone)]
pub struct MetadataConfig {
    pub source_file: PathBuf,
    pub source_columns_file: PathBuf,
    pub geog_area_file: PathBuf,
    pub geog_area_columns_file: PathBuf,
    pub capability_file: PathBuf,
    pub capability_columns_file: PathBuf,
    /// Directory holding one `<ID>TB.txt` column-name file per table.
    pub table_structures_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    /// Directory holding the time-partitioned observation files.
    pub partition_dir: PathBuf,
    /// Leading token of every partition filename.
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    /// Where extraction temp buffers are created.
    pub temp_dir: PathBuf,
}

fn default_file_prefix() -> String {
    "midas-data".to_string()
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| AppError::Config(format!("Failed to read config file: {}", e)))?;

        // Substitute environment variables
        let expanded = expand_env_vars(&content)?;

        let config: Config = serde_yaml::from_str(&expanded)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Checks for unexpanded environment variables, empty paths and an
    /// invalid partition prefix.
    fn validate(&self) -> Result<()> {
        let paths = [
            ("metadata.source_file", &self.metadata.source_file),
            (
                "metadata.source_columns_file",
                &self.metadata.source_columns_file,
            ),
            ("metadata.geog_area_file", &self.metadata.geog_area_file),
            (
                "metadata.geog_area_columns_file",
                &self.metadata.geog_area_columns_file,
            ),
            ("metadata.capability_file", &self.metadata.capability_file),
            (
                "metadata.capability_columns_file",
                &self.metadata.capability_columns_file,
            ),
            (
                "metadata.table_structures_dir",
                &self.metadata.table_structures_dir,
            ),
            ("data.partition_dir", &self.data.partition_dir),
            ("data.temp_dir", &self.data.temp_dir),
        ];

        for (field, path) in &paths {
            let text = path.to_string_lossy();
            if text.is_empty() {
                return Err(AppError::Config(format!("{} cannot be empty", field)));
            }
            if text.contains("${") {
                return Err(AppError::Config(format!(
                    "{} contains an unexpanded environment variable: '{}'. \
                     Please set it or create a .env file.",
                    field, text
                )));
            }
        }

        if self.data.file_prefix.is_empty() {
            return Err(AppError::Config(
                "data.file_prefix cannot be empty".to_string(),
            ));
        }

        // The prefix is embedded in a filename pattern; an underscore would
        // shift the token boundaries.
        if self.data.file_prefix.contains('_') {
            return Err(AppError::Config(format!(
                "data.file_prefix '{}' cannot contain '_'",
                self.data.file_prefix
            )));
        }

        Ok(())
    }
}

fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = content.to_string();
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}").unwrap();

    let mut missing_vars = Vec::new();

    for cap in re.captures_iter(content) {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => {
                result = result.replace(&cap[0], &value);
            }
            Err(_) => {
                missing_vars.push(var_name.to_string());
            }
        }
    }

    if !missing_vars.is_empty() {
        return Err(AppError::Config(format!(
            "Missing required environment variable{}: {}",
            if missing_vars.len() > 1 { "s" } else { "" },
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}
