#![cfg(not(tarpaulin_include))]

use eurostats::app;
use eurostats::config::{CONFIG_FILE, Config};

/// Main entry point for the web application
///
/// Reads `eurostats.toml` from the working directory when it exists, otherwise
/// runs with the defaults (`data.db`, `programmesana.xlsx`, port 5000).
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::load_or_default(CONFIG_FILE)?;
    log::info!("Using database {}", config.database_path.display());

    app::run(config).await
}
