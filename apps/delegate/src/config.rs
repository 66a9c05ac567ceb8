use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "delegate.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub owner_address: Option<String>,
    pub explorer_url: String,
    pub accept_delay_ms: u64,
    pub confirm_delay_ms: u64,
    pub wait_timeout_ms: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            owner_address: None,
            explorer_url: "https://etherscan.io".into(),
            accept_delay_ms: 200,
            confirm_delay_ms: 1500,
            wait_timeout_ms: 5000,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn accept_delay(&self) -> Duration {
        Duration::from_millis(self.accept_delay_ms)
    }

    pub fn confirm_delay(&self) -> Duration {
        Duration::from_millis(self.confirm_delay_ms)
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    owner_address: Option<String>,
    explorer_url: Option<String>,
    accept_delay_ms: Option<u64>,
    confirm_delay_ms: Option<u64>,
    wait_timeout_ms: Option<u64>,
    log_filter: Option<String>,
}

/// Defaults, then `path` if it exists, then `APP__*` environment variables.
pub fn load_settings(path: &Path) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();
    if path.exists() {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file '{}'", path.display()))?;
        apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?;
    }
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file_cfg: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file_cfg.owner_address {
        settings.owner_address = Some(v);
    }
    if let Some(v) = file_cfg.explorer_url {
        settings.explorer_url = v;
    }
    if let Some(v) = file_cfg.accept_delay_ms {
        settings.accept_delay_ms = v;
    }
    if let Some(v) = file_cfg.confirm_delay_ms {
        settings.confirm_delay_ms = v;
    }
    if let Some(v) = file_cfg.wait_timeout_ms {
        settings.wait_timeout_ms = v;
    }
    if let Some(v) = file_cfg.log_filter {
        settings.log_filter = v;
    }
    Ok(())
}

fn apply_env_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("APP__OWNER_ADDRESS") {
        settings.owner_address = Some(v);
    }
    if let Some(v) = lookup("APP__EXPLORER_URL") {
        settings.explorer_url = v;
    }
    // Unparseable numbers keep the previous value.
    if let Some(v) = lookup("APP__ACCEPT_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.accept_delay_ms = v;
    }
    if let Some(v) = lookup("APP__CONFIRM_DELAY_MS").and_then(|v| v.parse().ok()) {
        settings.confirm_delay_ms = v;
    }
    if let Some(v) = lookup("APP__WAIT_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
        settings.wait_timeout_ms = v;
    }
    if let Some(v) = lookup("APP__LOG_FILTER") {
        settings.log_filter = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
