//! Application configuration loaded from an optional YAML file.
//!
//! A missing or unreadable config is never fatal at startup; the server
//! continues with defaults and the failure is logged.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Startup configuration for a Pagoda application.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Emit wildcard CORS headers on every response.
    pub cors: bool,
    /// Directory loaded into the static file store.
    pub static_dir: Option<PathBuf>,
    /// Directory loaded into the template store.
    pub templates_dir: Option<PathBuf>,
    /// JSON or YAML file loaded as the process-wide container value.
    pub container: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7070,
            cors: false,
            static_dir: None,
            templates_dir: None,
            container: None,
        }
    }
}

impl AppConfig {
    /// Parse a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: AppConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Parse a YAML config file, falling back to defaults on any failure.
    /// The failure is logged as informational; startup continues.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path.as_ref()) {
            Ok(config) => config,
            Err(e) => {
                tracing::info!(
                    path = %path.as_ref().display(),
                    error = %e,
                    "config not loaded, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Bind address string (`host:port`).
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
