use crate::config;
use anyhow::{Context, Result};
use tracepanel_local_store::{FilterPreferences, JsonFileStore};
use tracepanel_runtime_config::PanelConfig;
use tracepanel_timeline::ObjectiveFilter;

fn open(config: &PanelConfig) -> Result<FilterPreferences<JsonFileStore>> {
    let store = JsonFileStore::new(config::preferences_path()?);
    Ok(FilterPreferences::new(store, &config.preferences))
}

pub fn run_get(session: Option<&str>, config: &PanelConfig) -> Result<()> {
    let prefs = open(config)?;
    println!("{}", prefs.load(session));
    Ok(())
}

pub fn run_set(session: Option<&str>, filter: ObjectiveFilter, config: &PanelConfig) -> Result<()> {
    let mut prefs = open(config)?;
    prefs.record(session, filter, std::time::Instant::now());
    prefs.flush().context("Failed to save filter preference")?;
    println!("Filter for {} set to {filter}", session.unwrap_or("all sessions"));
    Ok(())
}
