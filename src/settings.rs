//! Pool settings persisted as `reelpool.json`
//!
//! Missing fields fall back to defaults (`#[serde(default)]`), so an old or
//! partial file keeps working after new knobs are added.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{HttpSettings, LoadControl, MAX_CAPACITY};
use crate::paths::{self, PathConfig};

pub const SETTINGS_FILE: &str = "reelpool.json";
pub const CACHE_DIR: &str = "media_cache";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Disk cache directory (None = `<data dir>/media_cache`)
    pub dir: Option<PathBuf>,
    pub max_bytes: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: None,
            max_bytes: 256 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum live player sessions
    pub max_capacity: usize,
    /// Page offsets pre-loaded around the current page
    pub preload_offsets: Vec<i64>,
    /// Page must stay current this long before neighbours are pre-loaded
    pub preload_delay_ms: u64,
    /// Loader threads (0 = auto)
    pub workers_override: usize,
    pub load_control: LoadControl,
    pub http: HttpSettings,
    pub cache: CacheSettings,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_capacity: MAX_CAPACITY,
            preload_offsets: vec![1, 2, -1],
            preload_delay_ms: 0,
            workers_override: 0,
            load_control: LoadControl::default(),
            http: HttpSettings::default(),
            cache: CacheSettings::default(),
        }
    }
}

impl PoolSettings {
    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: PoolSettings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn to_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        info!("Saved settings to {}", path.display());
        Ok(())
    }

    /// Load `reelpool.json` from the config dir, or defaults if it does not exist
    pub fn load_or_default(config: &PathConfig) -> Result<Self> {
        let path = paths::config_file(SETTINGS_FILE, config);
        if path.exists() {
            Self::from_json(&path)
        } else {
            debug!("No settings at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Resolved disk cache directory
    pub fn cache_dir(&self, config: &PathConfig) -> PathBuf {
        self.cache
            .dir
            .clone()
            .unwrap_or_else(|| paths::data_file(CACHE_DIR, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = PoolSettings::default();
        assert_eq!(s.max_capacity, 5);
        assert_eq!(s.preload_offsets, vec![1, 2, -1]);
        assert_eq!(s.load_control, LoadControl::default());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let s: PoolSettings =
            serde_json::from_str(r#"{"max_capacity": 3, "load_control": {"max_buffer_ms": 10000}}"#)
                .unwrap();
        assert_eq!(s.max_capacity, 3);
        assert_eq!(s.load_control.max_buffer_ms, 10_000);
        assert_eq!(s.load_control.min_buffer_ms, 1_500);
        assert_eq!(s.http, HttpSettings::default());
    }

    #[test]
    fn test_json_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let mut s = PoolSettings::default();
        s.preload_delay_ms = 250;
        s.cache.dir = Some(dir.path().join("c"));

        s.to_json(&path).unwrap();
        assert_eq!(PoolSettings::from_json(&path).unwrap(), s);
    }

    #[test]
    fn test_load_or_default_and_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = PathConfig {
            config_dir: Some(dir.path().to_path_buf()),
        };

        let s = PoolSettings::load_or_default(&config).unwrap();
        assert_eq!(s, PoolSettings::default());
        assert_eq!(s.cache_dir(&config), dir.path().join(CACHE_DIR));
    }

    #[test]
    fn test_bad_json_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let err = PoolSettings::from_json(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));
    }
}
