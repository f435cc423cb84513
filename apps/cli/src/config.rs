//! CLI configuration.
//!
//! Stored as JSON at `$XDG_CONFIG_HOME/bigup/config.json` (falling back to
//! `~/.config/bigup/config.json`), or at the path given with `--config`.

use std::path::{Path, PathBuf};

use bigup_uploader::UploaderConfig;
use serde::{Deserialize, Serialize};

/// Settings read from the config file. Command-line flags override them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Base URL of the upload server.
    pub server: Option<String>,

    /// Local directory used as upload target instead of a server.
    pub target: Option<PathBuf>,

    /// File where in-flight sessions are recorded.
    pub state_file: Option<PathBuf>,

    pub uploader: UploaderConfig,
}

impl CliConfig {
    /// Loads the configuration from `path`, or from the default location.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => config_path(),
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: CliConfig = serde_json::from_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

/// Returns the default configuration file path.
fn config_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
            PathBuf::from(home).join(".config")
        });
    base.join("bigup").join("config.json")
}
