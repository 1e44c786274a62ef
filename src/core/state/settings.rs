use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::launch::SupervisorConfig;
use crate::core::mods::DEFAULT_MOD_EXTENSIONS;
use crate::core::release::DEFAULT_RELEASE_FEED_URL;
use crate::core::status::PollerConfig;

const APP_DIR_NAME: &str = "PLauncher";
const SETTINGS_FILE: &str = "launcher_settings.json";
pub const DATA_DIR_ENV: &str = "PLAUNCHER_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub release_feed_url: String,
    pub poll_interval_ms: u64,
    pub stale_after_secs: u64,
    pub kill_timeout_ms: u64,
    pub mod_extensions: Vec<String>,
    /// Where downloaded builds land; `<data dir>/downloads` when unset.
    pub downloads_dir: Option<PathBuf>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            release_feed_url: DEFAULT_RELEASE_FEED_URL.to_string(),
            poll_interval_ms: 1000,
            stale_after_secs: 5,
            kill_timeout_ms: 1000,
            mod_extensions: DEFAULT_MOD_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            downloads_dir: None,
        }
    }
}

impl LauncherSettings {
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            poller: PollerConfig {
                interval: Duration::from_millis(self.poll_interval_ms.max(1)),
                stale_after: Duration::from_secs(self.stale_after_secs),
            },
            kill_timeout: Duration::from_millis(self.kill_timeout_ms),
            ..SupervisorConfig::default()
        }
    }

    /// Missing or unreadable settings fall back to defaults.
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(_) => return Self::default(),
        };
        match serde_json::from_str(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Corrupt settings at {:?}, using defaults: {}", path, e);
                Self::default()
            }
        }
    }

    /// Like `load`, but writes the defaults out on first run so there is a
    /// file to edit.
    pub fn load_or_init(data_dir: &Path) -> Self {
        let settings = Self::load(data_dir);
        if !data_dir.join(SETTINGS_FILE).exists() {
            match settings.save(data_dir) {
                Ok(()) => info!("Wrote default settings to {:?}", data_dir.join(SETTINGS_FILE)),
                Err(e) => warn!("Could not write default settings in {:?}: {}", data_dir, e),
            }
        }
        settings
    }

    pub fn save(&self, data_dir: &Path) -> std::io::Result<()> {
        std::fs::create_dir_all(data_dir)?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(data_dir.join(SETTINGS_FILE), json)
    }
}

/// `$PLAUNCHER_DATA_DIR`, else `<platform data dir>/PLauncher`.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}
