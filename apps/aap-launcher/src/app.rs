use std::sync::Arc;

use aap_core::{util, FrontendLog, SettingsStore};
use aap_events::Bus;
use aap_supervisor::{resolve_worker_command, Supervisor};
use aap_updater::{ReleaseClient, UpdateEngine};
use anyhow::Context;
use tracing::{info, warn};

/// Process-wide services, built once in dependency order.
pub struct App {
    pub bus: Bus,
    pub log: FrontendLog,
    pub settings: Arc<SettingsStore>,
    pub supervisor: Supervisor,
    pub updater: UpdateEngine,
}

impl App {
    pub fn build() -> anyhow::Result<Self> {
        let bus = Bus::default();
        let log = FrontendLog::new(bus.clone());
        let settings = Arc::new(SettingsStore::open(bus.clone(), log.clone()));

        let cwd = std::env::current_dir().context("resolving working directory")?;
        let command = match resolve_worker_command(util::is_dev(), &cwd) {
            Ok(cmd) => Some(cmd),
            Err(err) => {
                warn!(%err, "worker launch command unavailable");
                None
            }
        };
        let supervisor = Supervisor::new(settings.clone(), log.clone(), bus.clone(), command)
            .context("creating supervisor")?;

        let client = ReleaseClient::new().context("creating release client")?;
        let updater = UpdateEngine::new(
            client,
            env!("CARGO_PKG_VERSION"),
            bus.clone(),
            log.clone(),
        )
        .with_supervisor(supervisor.clone());

        info!(settings = %settings.path().display(), "services initialized");
        Ok(Self {
            bus,
            log,
            settings,
            supervisor,
            updater,
        })
    }

    /// Startup update check; installs right away when auto-update is on.
    pub async fn check_updates(&self) -> anyhow::Result<()> {
        let prefs = self.settings.get().update;
        let info = self
            .updater
            .check_for_updates(prefs.auto_update, prefs.enable_alpha_updates)
            .await
            .context("checking for updates")?;
        if info.disabled || !info.available {
            return Ok(());
        }
        let version = info.version.clone().unwrap_or_default();
        self.log.info(format!("Update available: {version}"));
        for entry in self.updater.get_changelogs() {
            tracing::debug!(version = %entry.version, "changelog entry");
        }
        if !info.auto_update {
            return Ok(());
        }
        let Some(url) = info.download_url.as_deref() else {
            return Ok(());
        };
        self.updater
            .download_and_apply(url)
            .await
            .with_context(|| format!("installing update {version}"))
    }

    pub async fn shutdown(&self) {
        info!("shutting down");
        self.supervisor.cleanup().await;
    }
}
