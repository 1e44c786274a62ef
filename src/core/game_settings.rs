// ─── Game Settings ───
// Line-oriented `key=value` file in the instance data directory.

use std::path::Path;

use crate::core::error::{LauncherError, LauncherResult};

/// Ordered key/value pairs; order is preserved on write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameSettings {
    entries: Vec<(String, String)>,
}

impl GameSettings {
    /// Blank lines, `#` comments and lines without `=` are skipped.
    pub fn parse(raw: &str) -> Self {
        let mut settings = Self::default();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                settings.set(key.trim(), value.trim());
            }
        }
        settings
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect()
    }

    /// Absent file reads as empty settings.
    pub async fn load(path: &Path) -> LauncherResult<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Ok(Self::parse(&raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(LauncherError::io(path, e)),
        }
    }

    pub async fn save(&self, path: &Path) -> LauncherResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LauncherError::io(parent, e))?;
        }
        tokio::fs::write(path, self.render())
            .await
            .map_err(|e| LauncherError::io(path, e))
    }
}
