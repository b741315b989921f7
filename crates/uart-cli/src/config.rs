//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use uart_core::{ReconnectOptions, ScanOptions, SessionOptions, SupervisorOptions};

use crate::cli::OutputFormat;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Scan window in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_timeout: Option<u64>,

    /// Connection timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout: Option<u64>,

    /// Default output format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,

    /// Reconnection attempts after the link drops (unset = no reconnect)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect_attempts: Option<u32>,
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("uart-ble")
            .join("config.toml")
    }

    /// Config path in effect: the override if given, else the default.
    pub fn path(override_path: Option<&Path>) -> PathBuf {
        override_path.map_or_else(Self::default_path, Path::to_path_buf)
    }

    /// Load config from `path`, or return default if the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Load config, falling back to defaults with a warning on errors
    pub fn load(override_path: Option<&Path>) -> Self {
        let path = Self::path(override_path);
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{:#}", e);
                Self::default()
            }
        }
    }

    /// Save config to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// The config written by `config init`: every setting at its default.
    pub fn initial() -> Self {
        Self {
            scan_timeout: Some(ScanOptions::default().duration.as_secs()),
            connect_timeout: Some(SessionOptions::default().connect_timeout.as_secs()),
            format: Some(OutputFormat::Text),
            reconnect_attempts: None,
        }
    }

    /// Build supervisor options, letting explicit arguments override the file.
    pub fn supervisor_options(
        &self,
        scan_timeout: Option<u64>,
        reconnect_attempts: Option<u32>,
    ) -> SupervisorOptions {
        let mut options = SupervisorOptions::new().scan(self.scan_options(scan_timeout));
        if let Some(secs) = self.connect_timeout {
            options = options.session(SessionOptions::new().connect_timeout(Duration::from_secs(secs)));
        }
        match reconnect_attempts.or(self.reconnect_attempts) {
            Some(0) | None => options,
            Some(attempts) => options.reconnect(ReconnectOptions::new().max_attempts(attempts)),
        }
    }

    /// Build scan options, letting an explicit timeout override the file.
    pub fn scan_options(&self, scan_timeout: Option<u64>) -> ScanOptions {
        match scan_timeout.or(self.scan_timeout) {
            Some(secs) => ScanOptions::new().duration_secs(secs),
            None => ScanOptions::default(),
        }
    }

    /// Resolve the output format: explicit flag, then config, then text.
    pub fn resolve_format(&self, format: Option<OutputFormat>) -> OutputFormat {
        format.or(self.format).unwrap_or_default()
    }
}
