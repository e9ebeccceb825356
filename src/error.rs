use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Bounding box range error: {0}")]
    Range(String),

    #[error("Table name not known: {0}")]
    UnknownTable(String),

    #[error("Cannot find column name '{column}' in table '{table}'")]
    Schema { column: String, table: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
