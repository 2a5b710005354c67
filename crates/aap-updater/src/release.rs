//! GitHub-style release feed client and release selection.

use std::time::Duration;

use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ReleaseError;

pub const DEFAULT_API_BASE: &str = "https://api.github.com";
/// Overrides the feed base URL.
pub const RELEASE_API_ENV: &str = "AAP_RELEASE_API";
pub const REPO_OWNER: &str = "AdbAutoPlayer";
pub const REPO_NAME: &str = "AdbAutoPlayer";

/// Page size when looking for the newest release, pre-releases included.
pub const PRERELEASE_PAGE: u32 = 30;
/// Page size when enumerating releases for changelogs.
pub const CHANGELOG_PAGE: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Release {
    pub tag_name: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl Release {
    /// Tag parsed as semver, tolerating a leading `v`.
    pub fn version(&self) -> Option<Version> {
        parse_tag(&self.tag_name).ok()
    }
}

pub fn parse_tag(tag: &str) -> Result<Version, semver::Error> {
    let trimmed = tag.trim();
    Version::parse(trimmed.strip_prefix('v').unwrap_or(trimmed))
}

/// Operating system an update is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetOs {
    Windows,
    MacOs,
}

impl TargetOs {
    pub fn current() -> Self {
        if cfg!(windows) {
            TargetOs::Windows
        } else {
            TargetOs::MacOs
        }
    }

    pub fn asset_marker(self) -> &'static str {
        match self {
            TargetOs::Windows => "windows",
            TargetOs::MacOs => "macos",
        }
    }
}

/// Asset whose name mentions the target OS.
pub fn usable_asset(release: &Release, os: TargetOs) -> Option<&Asset> {
    let marker = os.asset_marker();
    release
        .assets
        .iter()
        .find(|a| a.name.to_lowercase().contains(marker))
}

/// OS asset, else the first asset.
pub fn find_asset(release: &Release, os: TargetOs) -> Option<&Asset> {
    usable_asset(release, os).or_else(|| release.assets.first())
}

/// First release carrying a usable asset, else the first release.
pub fn pick_newest(releases: &[Release], os: TargetOs) -> Option<&Release> {
    releases
        .iter()
        .find(|r| usable_asset(r, os).is_some())
        .or_else(|| releases.first())
}

/// Releases with `start < version < end`, newest first. Unparseable tags are skipped.
pub fn releases_between(releases: &[Release], start: &Version, end: &Version) -> Vec<Release> {
    let mut between: Vec<(Version, Release)> = releases
        .iter()
        .filter_map(|r| match r.version() {
            Some(v) => Some((v, r.clone())),
            None => {
                debug!(tag = %r.tag_name, "skipping release with non-semver tag");
                None
            }
        })
        .filter(|(v, _)| v > start && v < end)
        .collect();
    between.sort_by(|a, b| b.0.cmp(&a.0));
    between.into_iter().map(|(_, r)| r).collect()
}

#[derive(Clone)]
pub struct ReleaseClient {
    http: reqwest::Client,
    base: String,
    owner: String,
    repo: String,
}

impl ReleaseClient {
    /// Client for the project feed; honors `AAP_RELEASE_API`.
    pub fn new() -> Result<Self, ReleaseError> {
        let base = std::env::var(RELEASE_API_ENV)
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self::with_base_url(base)
    }

    pub fn with_base_url(base: impl Into<String>) -> Result<Self, ReleaseError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("aap-updater/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            owner: REPO_OWNER.to_string(),
            repo: REPO_NAME.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/releases{}",
            self.base, self.owner, self.repo, tail
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T, ReleaseError> {
        let resp = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ReleaseError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json().await?)
    }

    /// First page of releases, newest first as served by the feed.
    pub async fn list_releases(&self, per_page: u32) -> Result<Vec<Release>, ReleaseError> {
        self.get_json(&self.url(&format!("?per_page={per_page}")))
            .await
    }

    /// The feed's latest stable release.
    pub async fn latest(&self) -> Result<Release, ReleaseError> {
        self.get_json(&self.url("/latest")).await
    }

    pub async fn latest_including_prerelease(&self, os: TargetOs) -> Result<Release, ReleaseError> {
        let releases = self.list_releases(PRERELEASE_PAGE).await?;
        pick_newest(&releases, os)
            .cloned()
            .ok_or(ReleaseError::NoReleases)
    }
}
