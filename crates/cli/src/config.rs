use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracepanel_local_store::PREFERENCES_FILE_NAME;
use tracepanel_runtime_config::{CONFIG_FILE_NAME, PanelConfig, load_from_path};

/// Get the config directory path (~/.config/tracepanel/)
pub fn config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home).join(".config").join("tracepanel"))
}

/// Canonical config file path.
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

pub fn preferences_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(PREFERENCES_FILE_NAME))
}

/// Load the engine config. An explicit path must exist; the default path
/// falls back to built-in defaults when absent.
pub fn load_config(explicit: Option<&Path>) -> Result<PanelConfig> {
    if let Some(path) = explicit {
        return load_from_path(path)
            .with_context(|| format!("Failed to load config at {}", path.display()));
    }

    let path = config_path()?;
    if !path.exists() {
        tracing::debug!("No config at {}, using defaults", path.display());
        return Ok(PanelConfig::default());
    }
    load_from_path(&path).with_context(|| format!("Failed to load config at {}", path.display()))
}
