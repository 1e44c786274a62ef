use std::path::{Path, PathBuf};

use reqwest::Client;
use tracing::info;

use super::settings::{default_data_dir, LauncherSettings};
use crate::core::downloader::{DownloadTask, Downloader};
use crate::core::error::LauncherResult;
use crate::core::events::{event_channel, EventReceiver};
use crate::core::game_settings::GameSettings;
use crate::core::http::build_http_client;
use crate::core::instance::Instance;
use crate::core::launch::{LaunchAck, ProcessState, ProcessSupervisor};
use crate::core::mods::{ModEntry, ModToggleStore};
use crate::core::release::{self, platform_keywords, SelectedAsset};

/// Single owner of the launcher's moving parts: one supervisor, one
/// downloader, one event stream.
pub struct Launcher {
    pub data_dir: PathBuf,
    pub settings: LauncherSettings,
    http_client: Client,
    supervisor: ProcessSupervisor,
    downloader: Downloader,
    mods: ModToggleStore,
}

impl Launcher {
    /// Build a launcher rooted at the default data directory.
    pub fn new() -> LauncherResult<(Self, EventReceiver)> {
        Self::with_data_dir(default_data_dir())
    }

    pub fn with_data_dir(data_dir: PathBuf) -> LauncherResult<(Self, EventReceiver)> {
        let settings = LauncherSettings::load_or_init(&data_dir);
        let http_client = build_http_client()?;
        let (events, receiver) = event_channel();

        let supervisor = ProcessSupervisor::new(events.clone(), settings.supervisor_config());
        let downloader = Downloader::new(http_client.clone(), Some(events));
        let mods = ModToggleStore::new(&settings.mod_extensions);

        info!("Launcher data directory: {:?}", data_dir);
        Ok((
            Self {
                data_dir,
                settings,
                http_client,
                supervisor,
                downloader,
                mods,
            },
            receiver,
        ))
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.settings
            .downloads_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("downloads"))
    }

    // ── Process lifecycle ───────────────────────────────

    pub async fn launch(&mut self, instance: &mut Instance) -> LauncherResult<LaunchAck> {
        let ack = self.supervisor.launch(instance).await?;
        instance.last_played = Some(chrono::Utc::now());
        Ok(ack)
    }

    pub async fn kill(&mut self) -> LauncherResult<()> {
        self.supervisor.kill().await
    }

    pub fn process_state(&mut self) -> ProcessState {
        self.supervisor.state()
    }

    // ── Downloads ───────────────────────────────────────

    /// Resolve the newest release asset for this platform.
    pub async fn latest_release_asset(&self) -> LauncherResult<SelectedAsset> {
        let releases =
            release::fetch_releases(&self.http_client, &self.settings.release_feed_url).await?;
        release::select_asset(&releases, platform_keywords())
    }

    /// Start downloading `asset` into `dest_dir` (the downloads directory by default).
    pub fn download_asset(&self, asset: &SelectedAsset, dest_dir: Option<&Path>) -> DownloadTask {
        let dest_dir = dest_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.downloads_dir());
        let dest = dest_dir.join(&asset.tag_name).join(&asset.asset.name);
        info!(
            "Downloading {} ({}) to {:?}",
            asset.asset.name, asset.tag_name, dest
        );
        self.downloader.download(
            asset.asset.browser_download_url.clone(),
            dest,
            asset.asset.sha256(),
        )
    }

    pub fn cancel_download(&self, task_id: &str) -> bool {
        self.downloader.cancel(task_id)
    }

    // ── Mods ────────────────────────────────────────────

    pub fn list_mods(&self, instance: &Instance) -> LauncherResult<Vec<ModEntry>> {
        self.mods.list(&instance.mods_dir())
    }

    pub fn toggle_mod(&self, instance: &Instance, entry: &ModEntry) -> LauncherResult<ModEntry> {
        self.mods.toggle(&instance.mods_dir(), entry)
    }

    pub fn add_mod(&self, instance: &Instance, source: &Path) -> LauncherResult<ModEntry> {
        self.mods.add(&instance.mods_dir(), source)
    }

    pub fn remove_mod(&self, instance: &Instance, entry: &ModEntry) -> LauncherResult<()> {
        self.mods.remove(&instance.mods_dir(), entry)
    }

    pub fn mod_store(&self) -> &ModToggleStore {
        &self.mods
    }

    // ── Game settings ───────────────────────────────────

    pub async fn game_settings(&self, instance: &Instance) -> LauncherResult<GameSettings> {
        GameSettings::load(&instance.settings_path()).await
    }

    pub async fn save_game_settings(
        &self,
        instance: &Instance,
        settings: &GameSettings,
    ) -> LauncherResult<()> {
        let path = instance.settings_path();
        settings.save(&path).await?;
        info!("Saved game settings for {} to {:?}", instance.id, path);
        Ok(())
    }
}
