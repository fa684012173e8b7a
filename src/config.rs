use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

/// Runtime configuration, persisted as JSON next to the app data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Binary used to obtain the privileged session.
    pub su_binary: String,
    /// Deadline for a single shell command.
    pub shell_timeout_secs: u64,
    /// Process-writable directory where artifacts are staged between the
    /// privileged filesystem and the backup location.
    pub staging_location: String,
    /// Default backup location root.
    pub backups_location: String,
    /// Force-stop the app before touching its data.
    pub stop_before_action: bool,
}

impl Default for Config {
    fn default() -> Self {
        let staging = std::env::temp_dir().join("rootbak-staging");
        let backups = dirs::document_dir()
            .map(|dir| dir.join("rootbak-backups"))
            .unwrap_or_else(|| std::env::temp_dir().join("rootbak-backups"));
        Self {
            su_binary: "su".to_string(),
            shell_timeout_secs: 120,
            staging_location: staging.to_string_lossy().into_owned(),
            backups_location: backups.to_string_lossy().into_owned(),
            stop_before_action: true,
        }
    }
}

impl Config {
    pub fn shell_timeout(&self) -> Duration {
        Duration::from_secs(self.shell_timeout_secs)
    }

    /// Loads the configuration, falling back to defaults when the file is
    /// missing or unparseable.
    #[instrument]
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Failed to load config, using defaults");
                Self::default()
            }
        }
    }

    #[instrument(err)]
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Self =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        debug!("Loaded configuration successfully");
        Ok(config)
    }

    #[instrument(skip(self), err)]
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            info!(path = %parent.display(), "Creating config directory");
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        fs::write(path, json).context("Failed to write config file")?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}
