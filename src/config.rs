use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// File looked up in the working directory at startup
pub const CONFIG_FILE: &str = "eurostats.toml";

/// Runtime settings for the web application
///
/// Every field has a default so a missing file, or a file that only sets
/// some keys, still yields a complete configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file holding the `country` table
    pub database_path: PathBuf,

    /// Workbook read by a full load
    pub spreadsheet_path: PathBuf,

    /// Directory the static chart images are written to and served from
    pub static_dir: PathBuf,

    /// Address the HTTP server listens on
    pub bind_addr: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data.db"),
            spreadsheet_path: PathBuf::from("programmesana.xlsx"),
            static_dir: PathBuf::from("static"),
            bind_addr: "127.0.0.1:5000".to_string(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Config> {
        Ok(toml::from_str(content)?)
    }

    /// Read `path` if it exists, otherwise fall back to the defaults
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        Config::from_toml(&content)
    }
}
