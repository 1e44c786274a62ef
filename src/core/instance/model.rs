use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// A user-configured installation of the game.
///
/// `path` points at the executable or script to launch. Everything the core
/// manages lives next to it:
/// - `data/`              — passed to the game via `--data-dir`
/// - `data/status.json`   — written by the game, polled by the launcher
/// - `data/settings.txt`  — `key=value` game settings
/// - `mods/`              — plugin files, toggled via the `.disabled` suffix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub icon_path: Option<PathBuf>,
    /// Extra arguments placed before `--data-dir`.
    #[serde(default)]
    pub game_args: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_played: Option<DateTime<Utc>>,
}

impl Instance {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            path: path.into(),
            icon_path: None,
            game_args: Vec::new(),
            created_at: Utc::now(),
            last_played: None,
        }
    }

    /// Directory containing the executable; the child's working directory.
    pub fn working_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.working_dir().join("data")
    }

    pub fn status_path(&self) -> PathBuf {
        status_path_in(&self.data_dir())
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir().join("settings.txt")
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.working_dir().join("mods")
    }
}

pub fn status_path_in(data_dir: &Path) -> PathBuf {
    data_dir.join("status.json")
}
