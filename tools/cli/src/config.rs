//! CLI configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use budgetsync_remote::ProbeConfig;
use budgetsync_sync::SyncConfig;

/// Settings read from the JSON config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Base URL of the sync service.
    pub endpoint: Option<String>,
    /// Bearer token for the sync service.
    pub token: Option<String>,
    /// SQLite database holding records and preferences.
    pub database: Option<PathBuf>,
    /// `host:port` probed for connectivity.
    pub probe_address: Option<String>,
    /// Engine settings.
    pub sync: SyncConfig,
}

impl CliConfig {
    /// Load from `path`, or from the default location.
    ///
    /// A missing default file yields defaults; a missing explicit file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config
            .sync
            .validate()
            .with_context(|| format!("Invalid sync settings in {}", path.display()))?;
        Ok(config)
    }

    /// Database path, falling back to the per-user data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database {
            return Ok(path.clone());
        }
        let dir = data_dir().context("Could not determine a data directory; set `database`")?;
        Ok(dir.join("budgetsync.db"))
    }

    /// Endpoint, required for anything that talks to the service.
    pub fn endpoint(&self) -> Result<&str> {
        self.endpoint
            .as_deref()
            .context("No `endpoint` configured for the sync service")
    }

    pub fn probe(&self) -> ProbeConfig {
        let mut probe = ProbeConfig::default();
        if let Some(address) = &self.probe_address {
            probe.address = address.clone();
        }
        probe
    }
}

fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("budgetsync"))
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("budgetsync").join("config.json"))
}
