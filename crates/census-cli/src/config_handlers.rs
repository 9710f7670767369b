//! Handler functions for config CLI commands.

use std::path::{Path, PathBuf};

use census_core::{CensusConfig, Error, Result};

use crate::cli::ConfigAction;

/// Shown in place of a configured API key.
const MASKED_KEY: &str = "********";

/// Handle a config subcommand.
pub fn handle_config_command(config_path: Option<&str>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Path => cmd_config_path(config_path),
        ConfigAction::Init { file, force } => {
            let target = file.as_deref().or(config_path);
            cmd_config_init(target, force).map(|_| ())
        }
        ConfigAction::Show => cmd_config_show(config_path),
    }
}

/// Show the resolved config file path.
pub fn cmd_config_path(config_path: Option<&str>) -> Result<()> {
    match CensusConfig::resolve_config_path(config_path) {
        Some(path) => {
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("(file does not exist; run `census config init` to create it)");
            }
            Ok(())
        }
        None => Err(Error::config(
            "Could not determine config directory for this platform",
        )),
    }
}

/// Create a default configuration file, returning its path.
pub fn cmd_config_init(file: Option<&str>, force: bool) -> Result<PathBuf> {
    let path = match file {
        Some(p) => PathBuf::from(p),
        None => CensusConfig::default_config_path()
            .ok_or_else(|| Error::config("Could not determine config directory"))?,
    };
    write_default_config(&path, force)?;
    println!("Config file created at {}", path.display());
    Ok(path)
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::config(format!(
            "Config file already exists at {}. Use --force to overwrite.",
            path.display()
        )));
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io_with_path(e, parent))?;
    }

    let toml_str = CensusConfig::default().to_toml_string()?;
    std::fs::write(path, toml_str).map_err(|e| Error::io_with_path(e, path))
}

/// Print the effective configuration with the API key masked.
pub fn cmd_config_show(config_path: Option<&str>) -> Result<()> {
    let config = CensusConfig::load(config_path)?;
    print!("{}", render_masked(config)?);
    Ok(())
}

fn render_masked(mut config: CensusConfig) -> Result<String> {
    if !config.api_key.is_empty() {
        config.api_key = MASKED_KEY.to_string();
    }
    config.to_toml_string()
}

// ============================================================================
// Tests
// ============================================================================
