use std::fmt;

use thiserror::Error;

/// A problem with a single spreadsheet row, reported by its sheet row number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.message)
    }
}

/// Structured error types for the spreadsheet importer
#[derive(Error, Debug, Clone)]
pub enum ImportError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Authentication errors
    #[error("Authentication error: {service} authentication failed: {message}")]
    Authentication { service: String, message: String },

    /// API call errors
    #[error("API error: {service} API call failed: {message}")]
    Api { service: String, message: String },

    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// File system errors
    #[error("File system error: {operation} failed for path '{path}': {message}")]
    FileSystem {
        operation: String,
        path: String,
        message: String,
    },

    /// Parsing errors (JSON, TOML, etc.)
    #[error("Parsing error: Failed to parse {format}: {message}")]
    Parsing { format: String, message: String },

    /// Workbook could not be opened or read
    #[error("Spreadsheet error: {path}: {message}")]
    Spreadsheet { path: String, message: String },

    /// One or more rows cannot be turned into events
    #[error("{} invalid row(s): {}", .0.len(), join_rows(.0))]
    InvalidRows(Vec<RowError>),
}

fn join_rows(rows: &[RowError]) -> String {
    rows.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type alias using ImportError
pub type ImportResult<T> = std::result::Result<T, ImportError>;

impl From<std::io::Error> for ImportError {
    fn from(error: std::io::Error) -> Self {
        Self::FileSystem {
            operation: "unknown".to_string(),
            path: "unknown".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for ImportError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parsing {
            format: "JSON".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<toml::de::Error> for ImportError {
    fn from(error: toml::de::Error) -> Self {
        Self::Parsing {
            format: "TOML".to_string(),
            message: error.to_string(),
        }
    }
}

impl From<reqwest::Error> for ImportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::Network {
                message: format!("Connection failed: {}", error),
            }
        } else {
            Self::Api {
                service: "HTTP".to_string(),
                message: error.to_string(),
            }
        }
    }
}

impl From<calamine::Error> for ImportError {
    fn from(error: calamine::Error) -> Self {
        Self::Spreadsheet {
            path: "unknown".to_string(),
            message: error.to_string(),
        }
    }
}
