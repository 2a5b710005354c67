//! Update check, changelog aggregation, download and self-replacement.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use parking_lot::Mutex;
use semver::Version;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use aap_core::{util, FrontendLog};
use aap_events::Bus;
use aap_supervisor::Supervisor;
use aap_topics::{TOPIC_DOWNLOAD_PROGRESS, TOPIC_QUIT_REQUESTED};

use crate::apply::{self, AUXILIARY_PROCESSES};
use crate::error::UpdateError;
use crate::release::{
    find_asset, parse_tag, releases_between, Release, ReleaseClient, TargetOs, CHANGELOG_PAGE,
};

/// Wait after killing auxiliary processes so their file locks drop.
const KILL_SETTLE: Duration = Duration::from_secs(5);
const RESTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "releaseURL", default, skip_serializing_if = "Option::is_none")]
    pub release_url: Option<String>,
    #[serde(rename = "downloadURL", default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    pub auto_update: bool,
    pub disabled: bool,
    pub redirect_to_git_hub: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Changelog {
    pub version: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadProgress {
    pub percent: f64,
}

pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug, Clone)]
struct ReleaseCache {
    latest: Release,
    between: Vec<Release>,
}

pub struct UpdateEngine {
    client: ReleaseClient,
    http: reqwest::Client,
    current_version: String,
    os: TargetOs,
    dev: bool,
    bus: Bus,
    log: FrontendLog,
    supervisor: Option<Supervisor>,
    cache: Mutex<Option<ReleaseCache>>,
    progress: Mutex<Option<ProgressCallback>>,
}

impl UpdateEngine {
    pub fn new(
        client: ReleaseClient,
        current_version: impl Into<String>,
        bus: Bus,
        log: FrontendLog,
    ) -> Self {
        Self {
            client,
            http: reqwest::Client::new(),
            current_version: current_version.into(),
            os: TargetOs::current(),
            dev: util::is_dev(),
            bus,
            log,
            supervisor: None,
            cache: Mutex::new(None),
            progress: Mutex::new(None),
        }
    }

    pub fn with_target(mut self, os: TargetOs) -> Self {
        self.os = os;
        self
    }

    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    /// Supervisor to shut down before binaries are replaced.
    pub fn with_supervisor(mut self, supervisor: Supervisor) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    pub fn set_progress_callback<F>(&self, callback: F)
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        *self.progress.lock() = Some(Arc::new(callback));
    }

    fn disabled(&self, auto_update: bool) -> UpdateInfo {
        UpdateInfo {
            auto_update,
            disabled: true,
            redirect_to_git_hub: self.os != TargetOs::Windows,
            ..UpdateInfo::default()
        }
    }

    fn parse_current(&self) -> Result<Version, UpdateError> {
        parse_tag(&self.current_version).map_err(|source| UpdateError::SemverParse {
            what: "current",
            raw: self.current_version.clone(),
            source,
        })
    }

    pub async fn check_for_updates(
        &self,
        auto_update: bool,
        include_prerelease: bool,
    ) -> Result<UpdateInfo, UpdateError> {
        if self.dev {
            debug!("update check disabled in dev mode");
            return Ok(self.disabled(auto_update));
        }
        if self.os != TargetOs::Windows {
            debug!("self-update only applies on Windows");
            return Ok(self.disabled(auto_update));
        }

        let current = self.parse_current()?;
        let latest = if include_prerelease || !current.pre.is_empty() {
            self.client.latest_including_prerelease(self.os).await?
        } else {
            self.client.latest().await?
        };
        let latest_version =
            parse_tag(&latest.tag_name).map_err(|source| UpdateError::SemverParse {
                what: "latest",
                raw: latest.tag_name.clone(),
                source,
            })?;

        let not_available = UpdateInfo {
            auto_update,
            ..UpdateInfo::default()
        };
        if latest_version <= current {
            debug!(current = %current, latest = %latest_version, "already up to date");
            return Ok(not_available);
        }
        let Some(asset) = find_asset(&latest, self.os).cloned() else {
            warn!(tag = %latest.tag_name, "release has no downloadable asset");
            return Ok(not_available);
        };

        let feed = self.client.list_releases(CHANGELOG_PAGE).await?;
        let between = releases_between(&feed, &current, &latest_version);
        info!(
            current = %current,
            latest = %latest_version,
            between = between.len(),
            "update available"
        );
        let info = UpdateInfo {
            available: true,
            version: Some(latest.tag_name.clone()),
            release_url: Some(latest.html_url.clone()),
            download_url: Some(asset.browser_download_url),
            size: Some(asset.size),
            auto_update,
            disabled: false,
            redirect_to_git_hub: false,
        };
        *self.cache.lock() = Some(ReleaseCache { latest, between });
        Ok(info)
    }

    /// Latest release notes first, then the cached in-between releases.
    /// Releases without a body are skipped; an empty body is still listed.
    pub fn get_changelogs(&self) -> Vec<Changelog> {
        let cache = self.cache.lock();
        let Some(cache) = cache.as_ref() else {
            return Vec::new();
        };
        let mut out = Vec::new();
        if let Some(body) = cache.latest.body.as_deref() {
            out.push(Changelog {
                version: cache.latest.tag_name.clone(),
                body: body.to_string(),
            });
        }
        let include_pre = cache.latest.prerelease;
        for release in &cache.between {
            if release.prerelease && !include_pre {
                continue;
            }
            if let Some(body) = release.body.as_deref() {
                out.push(Changelog {
                    version: release.tag_name.clone(),
                    body: body.to_string(),
                });
            }
        }
        out
    }

    fn report_progress(&self, percent: f64) {
        let callback = self.progress.lock().clone();
        if let Some(callback) = callback {
            callback(percent);
        }
        self.bus
            .publish(TOPIC_DOWNLOAD_PROGRESS, &DownloadProgress { percent });
    }

    /// Stream `url` into `dest`, reporting progress when the size is known.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, UpdateError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if status.as_u16() != 200 {
            return Err(UpdateError::BadStatus(status.as_u16()));
        }
        let total = resp.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        let mut received: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            received += chunk.len() as u64;
            if total > 0 {
                self.report_progress(received as f64 / total as f64 * 100.0);
            }
        }
        file.flush().await?;
        debug!(bytes = received, path = %dest.display(), "download complete");
        Ok(received)
    }

    /// Download the archive at `url`, replace the running binary set and
    /// schedule a restart. Windows only.
    pub async fn download_and_apply(&self, url: &str) -> Result<(), UpdateError> {
        if self.os != TargetOs::Windows {
            return Err(UpdateError::Unsupported);
        }
        let current_exe = std::env::current_exe()?;
        let result = self.download_and_install(url, &current_exe).await;
        if let Err(err) = &result {
            error!(%err, "update failed");
            self.log.error(format!("Update failed: {err}"));
        }
        result
    }

    async fn download_and_install(&self, url: &str, current_exe: &Path) -> Result<(), UpdateError> {
        let temp = tempfile::Builder::new().prefix("app-update-").tempdir()?;
        let archive = temp.path().join("update.zip");
        self.download(url, &archive).await?;

        let extract_dir = temp.path().join("extracted");
        let (src, dst) = (archive.clone(), extract_dir.clone());
        tokio::task::spawn_blocking(move || apply::extract_zip(&src, &dst))
            .await
            .map_err(|err| std::io::Error::other(err.to_string()))??;

        if let Some(supervisor) = &self.supervisor {
            supervisor.cleanup().await;
        }
        let app_dir = current_exe
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let targeted = tokio::task::spawn_blocking(move || {
            apply::kill_auxiliary_processes(&app_dir, AUXILIARY_PROCESSES)
        })
        .await
        .unwrap_or_else(|err| {
            warn!(%err, "auxiliary process cleanup panicked");
            0
        });
        if targeted > 0 {
            tokio::time::sleep(KILL_SETTLE).await;
        }

        let exe = current_exe.to_path_buf();
        let old = tokio::task::spawn_blocking(move || apply::install_extracted(&extract_dir, &exe))
            .await
            .map_err(|err| std::io::Error::other(err.to_string()))??;

        let script = apply::write_restart_script(&std::env::temp_dir(), &old, current_exe)?;
        info!(script = %script.display(), "update installed, restarting");
        let bus = self.bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RESTART_DELAY).await;
            if let Err(err) = spawn_detached_script(&script) {
                error!(%err, "failed to execute restart script");
                return;
            }
            tokio::time::sleep(RESTART_DELAY).await;
            bus.emit(TOPIC_QUIT_REQUESTED);
        });
        Ok(())
    }
}

fn spawn_detached_script(script: &Path) -> std::io::Result<()> {
    let mut cmd = tokio::process::Command::new("cmd");
    cmd.arg("/C").arg(script);
    #[cfg(windows)]
    {
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
    cmd.spawn().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_info_uses_frontend_field_names() {
        let info = UpdateInfo {
            available: true,
            version: Some("8.1.0".into()),
            release_url: Some("https://example.invalid/r".into()),
            download_url: Some("https://example.invalid/a.zip".into()),
            size: Some(42),
            auto_update: true,
            disabled: false,
            redirect_to_git_hub: false,
        };
        let value = serde_json::to_value(&info).unwrap();
        for key in [
            "available",
            "version",
            "releaseURL",
            "downloadURL",
            "size",
            "autoUpdate",
            "disabled",
            "redirectToGitHub",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
