use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by every entry point of the application
///
/// Ingestion, query and chart operations all return this type so the
/// presentation layer can map each condition onto a response without
/// inspecting library-specific errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The SQLite database could not be opened or a statement failed
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The spreadsheet used for a full load does not exist
    #[error("source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// Required columns are absent from the header row
    #[error("schema mismatch: missing column(s) {}", .missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    /// An upload request carried no file, or an empty one
    #[error("no file was supplied")]
    EmptyPayload,

    /// The payload could not be read as a rectangular table
    #[error("parse error: {0}")]
    ParseError(String),

    /// A chart was requested for a record set it cannot be drawn from
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// The plotting or image encoding step failed
    #[error("render error: {0}")]
    Render(String),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}
