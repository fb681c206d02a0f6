//! Configuration management for flingdeck
//!
//! Handles config file loading/saving. Config is stored at
//! ~/.config/flingdeck/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::ItemKind;

/// Environment override for the catalog endpoint
pub const CATALOG_URL_ENV: &str = "FLINGDECK_CATALOG_URL";

const DEFAULT_CATALOG_URL: &str = "http://127.0.0.1:8008/catalog.json";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Discovery catalog endpoint
    pub catalog_url: Option<String>,
    /// Which catalogue to list (app or media)
    pub kind: Option<ItemKind>,
    /// Seconds between catalog polls
    pub poll_interval_secs: Option<u64>,
    /// Per-request timeout for catalog and icon fetches
    pub fetch_timeout_secs: Option<u64>,
    /// Device to target by default (id or name)
    pub default_device: Option<String>,
}

impl Config {
    /// Get config file path (~/.config/flingdeck/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("flingdeck").join("config.toml"))
    }

    /// Load config from the default location, or defaults if not found
    pub fn load() -> Self {
        Self::path().map(|p| Self::load_from(&p)).unwrap_or_default()
    }

    /// Load config from an explicit path, or defaults if missing or invalid
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => toml::from_str(&s).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), "ignoring invalid config: {}", e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Catalog URL with fallback chain:
    /// 1. Environment variable FLINGDECK_CATALOG_URL
    /// 2. Config file
    /// 3. Local default
    pub fn catalog_url(&self) -> String {
        if let Ok(url) = std::env::var(CATALOG_URL_ENV) {
            if !url.trim().is_empty() {
                return url;
            }
        }
        self.catalog_url
            .clone()
            .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string())
    }

    pub fn kind(&self) -> ItemKind {
        self.kind.unwrap_or(ItemKind::App)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.unwrap_or(DEFAULT_POLL_INTERVAL_SECS).max(1))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS).max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(config.catalog_url.is_none());
        assert!(config.default_device.is_none());
        assert_eq!(config.kind(), ItemKind::App);
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_toml() {
        let config: Config = toml::from_str(
            r#"
            catalog_url = "http://tv.local:8008/catalog.json"
            kind = "media"
            poll_interval_secs = 0
            default_device = "Living Room TV"
            "#,
        )
        .unwrap();

        assert_eq!(config.kind(), ItemKind::Media);
        // Zero would spin the poller
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.default_device.as_deref(), Some("Living Room TV"));
    }

    #[test]
    fn test_save_and_load_roundtrip_on_disk() {
        let dir = std::env::temp_dir().join(format!("flingdeck-config-{}", std::process::id()));
        let path = dir.join("config.toml");
        let config = Config {
            catalog_url: Some("http://10.0.0.5/catalog.json".into()),
            kind: Some(ItemKind::Media),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/flingdeck/config.toml"));
        assert_eq!(config, Config::default());
    }
}
