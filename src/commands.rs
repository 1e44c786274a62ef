// ─── Commands ───
// Foreground handlers driving the core: each one owns a `Launcher`, starts
// the requested work and renders the event stream for the terminal.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::core::downloader::{DownloadEvent, DownloadProgress};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{LauncherEvent, OutputStream, ProcessEvent, ProcessOutcome};
use crate::core::game_settings::GameSettings;
use crate::core::instance::Instance;
use crate::core::mods::ModEntry;
use crate::core::state::Launcher;

/// Launch the game and stay attached until it exits. Ctrl-C kills the
/// whole process group. Returns the game's exit code (1 for a crash).
pub async fn launch_instance(path: PathBuf, game_args: Vec<String>) -> LauncherResult<i32> {
    let (mut launcher, mut events) = Launcher::new()?;

    let name = path
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "instance".into());
    let mut instance = Instance::new(name, path);
    instance.game_args = game_args;

    println!("Launching...");
    let ack = match launcher.launch(&mut instance).await {
        Ok(ack) => ack,
        Err(LauncherError::FailedToStart { reason, .. }) => {
            println!("Error: Binary not found or failed to start ({reason})");
            return Ok(127);
        }
        Err(e) => return Err(e),
    };
    info!("Data directory: {:?}", ack.data_dir);

    let mut last_status = String::new();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(LauncherEvent::Process { event, .. }) = event else {
                    continue;
                };
                match event {
                    ProcessEvent::Started { pid } => println!("Running (pid {pid})"),
                    ProcessEvent::Output { stream: OutputStream::Stdout, line } => println!("{line}"),
                    ProcessEvent::Output { stream: OutputStream::Stderr, line } => eprintln!("{line}"),
                    ProcessEvent::Status { report } => {
                        let text = report.to_string();
                        if text != last_status {
                            println!("[status] {text}");
                            last_status = text;
                        }
                    }
                    ProcessEvent::Finished { outcome } => {
                        return Ok(match outcome {
                            ProcessOutcome::CrashExit => {
                                println!("Crashed");
                                1
                            }
                            ProcessOutcome::NormalExit { code } => {
                                println!("Finished (Exit Code: {code})");
                                code
                            }
                            ProcessOutcome::FailedToStart { reason } => {
                                println!("Error: Binary not found or failed to start ({reason})");
                                127
                            }
                        });
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping instance {}", instance.id);
                if let Err(e) = launcher.kill().await {
                    error!("Kill failed: {}", e);
                }
            }
        }
    }
}

/// Download the newest release asset for this platform, printing progress.
/// Ctrl-C abandons the download.
pub async fn download_latest(dest_dir: Option<PathBuf>) -> LauncherResult<PathBuf> {
    let (launcher, _events) = Launcher::new()?;

    let selected = launcher.latest_release_asset().await?;
    println!("Latest release {}: {}", selected.tag_name, selected.asset.name);
    let mut task = launcher.download_asset(&selected, dest_dir.as_deref());

    loop {
        tokio::select! {
            event = task.next_event() => match event {
                Some(DownloadEvent::Progress { progress: DownloadProgress::Percent { value } }) => {
                    println!("Downloading... {value}%");
                }
                Some(DownloadEvent::Progress { progress: DownloadProgress::Indeterminate { bytes } }) => {
                    println!("Downloading... {bytes} bytes");
                }
                Some(DownloadEvent::Done { path }) => {
                    println!("Downloaded to {}", path.display());
                    return Ok(path);
                }
                Some(DownloadEvent::Failed { reason }) => {
                    return Err(LauncherError::Other(format!("Download failed: {reason}")));
                }
                None => {
                    return Err(LauncherError::Other("Download ended without a result".into()));
                }
            },
            _ = tokio::signal::ctrl_c() => {
                let id = task.id.clone();
                task.cancel();
                return Err(LauncherError::Other(format!("Download {id} cancelled")));
            }
        }
    }
}

/// Apply `key=value` assignments (if any) and print the resulting settings.
pub async fn game_settings(path: PathBuf, assignments: Vec<String>) -> LauncherResult<GameSettings> {
    let (launcher, _events) = Launcher::new()?;
    let instance = Instance::new("instance", path);

    let mut settings = launcher.game_settings(&instance).await?;
    if !assignments.is_empty() {
        for assignment in &assignments {
            let Some((key, value)) = assignment.split_once('=') else {
                return Err(LauncherError::Other(format!(
                    "Expected key=value, got '{assignment}'"
                )));
            };
            settings.set(key.trim(), value.trim());
        }
        launcher.save_game_settings(&instance, &settings).await?;
    }

    for (key, value) in settings.iter() {
        println!("{key}={value}");
    }
    Ok(settings)
}

pub fn list_mods(dir: &Path) -> LauncherResult<Vec<ModEntry>> {
    let (launcher, _events) = Launcher::new()?;
    let entries = launcher.mod_store().list(dir)?;
    for entry in &entries {
        let mark = if entry.enabled { "x" } else { " " };
        println!("[{mark}] {}", entry.display_name);
    }
    Ok(entries)
}

pub fn toggle_mod(dir: &Path, name: &str) -> LauncherResult<ModEntry> {
    let (launcher, _events) = Launcher::new()?;
    let entry = find_mod(&launcher, dir, name)?;
    let toggled = launcher.mod_store().toggle(dir, &entry)?;
    println!(
        "{} {}",
        toggled.display_name,
        if toggled.enabled { "enabled" } else { "disabled" }
    );
    Ok(toggled)
}

pub fn add_mod(dir: &Path, source: &Path) -> LauncherResult<ModEntry> {
    let (launcher, _events) = Launcher::new()?;
    let entry = launcher.mod_store().add(dir, source)?;
    println!("Added {}", entry.display_name);
    Ok(entry)
}

/// `confirmed` stands in for the UI's confirmation dialog.
pub fn remove_mod(dir: &Path, name: &str, confirmed: bool) -> LauncherResult<()> {
    if !confirmed {
        return Err(LauncherError::Other(format!(
            "Refusing to delete {name} without --yes"
        )));
    }
    let (launcher, _events) = Launcher::new()?;
    let entry = find_mod(&launcher, dir, name)?;
    launcher.mod_store().remove(dir, &entry)?;
    println!("Removed {}", entry.display_name);
    Ok(())
}

/// Look a mod up by display or on-disk name in a fresh listing.
fn find_mod(launcher: &Launcher, dir: &Path, name: &str) -> LauncherResult<ModEntry> {
    launcher
        .mod_store()
        .list(dir)?
        .into_iter()
        .find(|e| e.display_name == name || e.on_disk_filename == name)
        .ok_or_else(|| LauncherError::ModNotFound(name.to_string()))
}
