use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::core::error::{LauncherError, LauncherResult};

/// Suffix that marks a mod as disabled on disk.
pub const DISABLED_SUFFIX: &str = ".disabled";

pub const DEFAULT_MOD_EXTENSIONS: &[&str] = &["lua", "py", "zip", "dll", "so", "dylib"];

/// One mod file. `enabled` and `display_name` are derived from the on-disk
/// name, which is the only source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModEntry {
    pub display_name: String,
    pub on_disk_filename: String,
    pub enabled: bool,
}

/// Enables and disables mods by renaming them. No background activity.
#[derive(Debug, Clone)]
pub struct ModToggleStore {
    extensions: Vec<String>,
}

impl Default for ModToggleStore {
    fn default() -> Self {
        Self::new(DEFAULT_MOD_EXTENSIONS.iter().copied())
    }
}

impl ModToggleStore {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    /// Model `file_name` as a mod, or `None` if its extension is not recognized.
    pub fn entry_for(&self, file_name: &str) -> Option<ModEntry> {
        let (display_name, enabled) = match file_name.strip_suffix(DISABLED_SUFFIX) {
            Some(base) => (base, false),
            None => (file_name, true),
        };

        let ext = Path::new(display_name).extension()?.to_str()?.to_ascii_lowercase();
        if !self.extensions.iter().any(|known| *known == ext) {
            return None;
        }

        Some(ModEntry {
            display_name: display_name.to_string(),
            on_disk_filename: file_name.to_string(),
            enabled,
        })
    }

    /// Mods in `dir` sorted by on-disk name. Creates `dir` if missing.
    pub fn list(&self, dir: &Path) -> LauncherResult<Vec<ModEntry>> {
        fs::create_dir_all(dir).map_err(|e| LauncherError::io(dir, e))?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(dir).map_err(|e| LauncherError::io(dir, e))? {
            let entry = entry.map_err(|e| LauncherError::io(dir, e))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                debug!("Skipping non UTF-8 file name in {:?}", dir);
                continue;
            };
            if let Some(entry) = self.entry_for(&name) {
                entries.push(entry);
            }
        }

        entries.sort_by(|a, b| a.on_disk_filename.cmp(&b.on_disk_filename));
        Ok(entries)
    }

    /// Flip `entry` by adding or stripping the disabled suffix.
    ///
    /// The file is re-checked first. On error the caller should `list` again
    /// instead of trusting its copy.
    pub fn toggle(&self, dir: &Path, entry: &ModEntry) -> LauncherResult<ModEntry> {
        let current = self
            .entry_for(&entry.on_disk_filename)
            .ok_or_else(|| LauncherError::UnsupportedMod(entry.on_disk_filename.clone()))?;
        let source = self.existing_file(dir, &current.on_disk_filename)?;

        let target_name = if current.enabled {
            format!("{}{}", current.display_name, DISABLED_SUFFIX)
        } else {
            current.display_name.clone()
        };
        let target = dir.join(&target_name);
        if target.exists() {
            return Err(LauncherError::io(
                &target,
                std::io::Error::new(std::io::ErrorKind::AlreadyExists, "target name is taken"),
            ));
        }

        fs::rename(&source, &target).map_err(|e| LauncherError::io(&source, e))?;
        info!(
            "{} mod {}",
            if current.enabled { "Disabled" } else { "Enabled" },
            current.display_name
        );

        Ok(ModEntry {
            display_name: current.display_name,
            on_disk_filename: target_name,
            enabled: !current.enabled,
        })
    }

    /// Copy `source` into `dir` unmodified, as an enabled mod.
    pub fn add(&self, dir: &Path, source: &Path) -> LauncherResult<ModEntry> {
        let name = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| LauncherError::UnsupportedMod(source.display().to_string()))?;
        let entry = self
            .entry_for(name)
            .ok_or_else(|| LauncherError::UnsupportedMod(name.to_string()))?;

        fs::create_dir_all(dir).map_err(|e| LauncherError::io(dir, e))?;
        // Either state of the same mod counts as a duplicate.
        for taken in [
            entry.display_name.clone(),
            format!("{}{}", entry.display_name, DISABLED_SUFFIX),
        ] {
            let path = dir.join(&taken);
            if path.exists() {
                return Err(LauncherError::io(
                    &path,
                    std::io::Error::new(std::io::ErrorKind::AlreadyExists, "mod already installed"),
                ));
            }
        }

        let dest = dir.join(&entry.on_disk_filename);
        fs::copy(source, &dest).map_err(|e| LauncherError::io(source, e))?;
        info!("Added mod {} from {:?}", entry.display_name, source);
        Ok(entry)
    }

    /// Delete the mod file. Confirmation is the caller's business.
    pub fn remove(&self, dir: &Path, entry: &ModEntry) -> LauncherResult<()> {
        let path = self.existing_file(dir, &entry.on_disk_filename)?;
        fs::remove_file(&path).map_err(|e| LauncherError::io(&path, e))?;
        info!("Removed mod {}", entry.on_disk_filename);
        Ok(())
    }

    fn existing_file(&self, dir: &Path, file_name: &str) -> LauncherResult<PathBuf> {
        let path = dir.join(file_name);
        match fs::symlink_metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(LauncherError::ModNotFound(file_name.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(LauncherError::ModNotFound(file_name.to_string()))
            }
            Err(e) => Err(LauncherError::io(&path, e)),
        }
    }
}
