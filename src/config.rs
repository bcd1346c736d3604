//! Runtime configuration.
//!
//! Loaded from an optional TOML file; every field has a default so an empty
//! or missing file is valid. The binary layers command-line flags on top.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PLATFORM_DOMAIN: &str = "bandcamp.com";
pub const DEFAULT_STORE_LOCATION: &str = "bandcamp.db";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite file holding artists, releases and tracks
    pub store_location: PathBuf,
    /// Catalog pages live at `https://{nickname}.{platform_domain}/`
    pub platform_domain: String,
    pub request_timeout_secs: u64,
    pub user_agent: String,
    /// Release pages fetched concurrently per artist (1 = sequential)
    pub workers: usize,
    /// Draw a progress bar during batch updates; off for tail-friendly logs
    pub progress: bool,
    /// Fallback filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_location: PathBuf::from(DEFAULT_STORE_LOCATION),
            platform_domain: DEFAULT_PLATFORM_DOMAIN.to_string(),
            request_timeout_secs: 30,
            user_agent: concat!("release-tracker/", env!("CARGO_PKG_VERSION")).to_string(),
            workers: 1,
            progress: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
