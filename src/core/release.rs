// ─── Release Feed ───
// Fetches the GitHub-style release list and picks the asset for this platform.

use serde::Deserialize;
use tracing::info;

use crate::core::error::{LauncherError, LauncherResult};

pub const DEFAULT_RELEASE_FEED_URL: &str =
    "https://api.github.com/repos/skakavi-krompir/skakavi-krompir/releases";

#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
    /// `sha256:<hex>` when the feed publishes one.
    #[serde(default)]
    pub digest: Option<String>,
}

impl ReleaseAsset {
    pub fn sha256(&self) -> Option<String> {
        self.digest
            .as_deref()?
            .strip_prefix("sha256:")
            .map(str::to_ascii_lowercase)
    }
}

/// The `(release, asset)` pair handed to the downloader.
#[derive(Debug, Clone)]
pub struct SelectedAsset {
    pub tag_name: String,
    pub asset: ReleaseAsset,
}

/// Fetch the release list. Single attempt, no retry.
pub async fn fetch_releases(client: &reqwest::Client, url: &str) -> LauncherResult<Vec<Release>> {
    info!("Fetching release feed {}", url);

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(LauncherError::DownloadFailed {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let releases: Vec<Release> = response.json().await?;
    info!("Loaded {} releases from feed", releases.len());
    Ok(releases)
}

/// Name fragments identifying an asset for the running OS.
pub fn platform_keywords() -> &'static [&'static str] {
    if cfg!(target_os = "windows") {
        &["windows", "win64", "win"]
    } else if cfg!(target_os = "macos") {
        &["macos", "darwin", "mac"]
    } else {
        &["linux"]
    }
}

/// Newest release first (feed order); prefer an asset naming this platform,
/// else its first asset.
pub fn select_asset(releases: &[Release], keywords: &[&str]) -> LauncherResult<SelectedAsset> {
    let release = releases
        .first()
        .ok_or_else(|| LauncherError::ReleaseNotFound("release feed is empty".into()))?;

    let asset = release
        .assets
        .iter()
        .find(|asset| {
            let name = asset.name.to_ascii_lowercase();
            keywords.iter().any(|k| name.contains(k))
        })
        .or_else(|| release.assets.first())
        .ok_or_else(|| {
            LauncherError::ReleaseNotFound(format!("release {} has no assets", release.tag_name))
        })?;

    Ok(SelectedAsset {
        tag_name: release.tag_name.clone(),
        asset: asset.clone(),
    })
}
