//! CLI configuration -- thin wrapper around `pixelpi_config`.
//!
//! Adds `--config` awareness on top of the shared loading functions.

use std::path::PathBuf;

use pixelpi_core::EngineConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use pixelpi_config::{Config, PlanSection, load_config_from, save_config, store_passphrase};

/// The file this invocation reads: `--config` / `PIXELPI_CONFIG`, else the
/// system default.
pub fn path(global: &GlobalOpts) -> PathBuf {
    global.config.clone().unwrap_or_else(pixelpi_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(load_config_from(&path(global))?)
}

/// Load the file and translate it for the engine.
pub fn engine_config(global: &GlobalOpts) -> Result<EngineConfig, CliError> {
    Ok(load(global)?.to_engine_config()?)
}
