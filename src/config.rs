//! Persisted platform selection.
//!
//! The config is loaded once per run and passed explicitly to the engine; no
//! component looks it up on its own.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;
use crate::skill::{builtin_platforms, Platform};

/// Config file location, relative to the project root.
pub const CONFIG_FILE: &str = ".agents-common/config.json";

pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub version: u32,
    pub enabled_platforms: Vec<String>,
}

impl SyncConfig {
    pub fn new(enabled_platforms: Vec<String>) -> Self {
        Self {
            version: CONFIG_VERSION,
            enabled_platforms,
        }
    }

    /// Resolve enabled names to platforms in config order, optionally
    /// restricted to `only`.
    ///
    /// Unknown names are logged and ignored.
    pub fn platforms(&self, only: Option<&[String]>) -> Vec<Platform> {
        let known = builtin_platforms();
        for name in only.unwrap_or_default() {
            if !self.enabled_platforms.contains(name) {
                warn!(platform = %name, "ignoring platform that is not enabled");
            }
        }

        let mut platforms: Vec<Platform> = Vec::new();
        for name in &self.enabled_platforms {
            if only.is_some_and(|names| !names.contains(name)) {
                continue;
            }
            match known.iter().find(|platform| &platform.name == name) {
                Some(platform) if !platforms.contains(platform) => platforms.push(platform.clone()),
                Some(_) => {}
                None => warn!(platform = %name, "ignoring unknown platform"),
            }
        }
        platforms
    }
}

/// Reads and writes [`SyncConfig`] as JSON.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(root: &Path) -> Self {
        Self {
            path: root.join(CONFIG_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the config. Missing, unreadable or corrupt files count as absent.
    pub fn read(&self) -> Option<SyncConfig> {
        match self.try_read() {
            Ok(config) => config,
            Err(err) => {
                warn!(error = %err, "ignoring config");
                None
            }
        }
    }

    fn try_read(&self) -> Result<Option<SyncConfig>, ConfigError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    pub fn write(&self, config: &SyncConfig) -> Result<(), ConfigError> {
        let mut content = serde_json::to_string_pretty(config)?;
        content.push('\n');
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&self.path, content).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Names of built-in platforms whose assistant directory exists under `root`.
pub fn detect_platforms(root: &Path) -> Vec<String> {
    builtin_platforms()
        .into_iter()
        .filter(|platform| root.join(platform.config_root()).is_dir())
        .map(|platform| platform.name)
        .collect()
}
