//! Reacts to bus events that need a service-side action.

use aap_events::Bus;
use aap_supervisor::Supervisor;
use aap_topics::{
    TOPIC_GAME_SETTINGS_UPDATED, TOPIC_GENERAL_SETTINGS_UPDATED, TOPIC_QUIT_REQUESTED,
    TOPIC_SERVER_ADDRESS_CHANGED,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Reinitialize,
    NotifyWorker(&'static str),
    Quit,
}

pub fn route(kind: &str) -> Option<Route> {
    match kind {
        TOPIC_SERVER_ADDRESS_CHANGED => Some(Route::Reinitialize),
        TOPIC_GENERAL_SETTINGS_UPDATED => Some(Route::NotifyWorker("/general-settings-updated")),
        TOPIC_GAME_SETTINGS_UPDATED => Some(Route::NotifyWorker("/game-settings-updated")),
        TOPIC_QUIT_REQUESTED => Some(Route::Quit),
        _ => None,
    }
}

/// Why the router stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterExit {
    Quit,
    BusClosed,
}

pub fn spawn(bus: &Bus, supervisor: Supervisor) -> JoinHandle<RouterExit> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            let env = match rx.recv().await {
                Ok(env) => env,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event router lagged");
                    continue;
                }
                Err(RecvError::Closed) => return RouterExit::BusClosed,
            };
            match route(&env.kind) {
                Some(Route::Reinitialize) => {
                    info!("server address changed, reinitializing supervisor");
                    supervisor.reinitialize().await;
                }
                Some(Route::NotifyWorker(path)) => supervisor.notify_worker(path).await,
                Some(Route::Quit) => {
                    debug!("quit requested");
                    return RouterExit::Quit;
                }
                None => {}
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use aap_core::{FrontendLog, SettingsStore};
    use aap_topics::{TOPIC_LOG_MESSAGE, TOPIC_TASK_STOPPED};

    #[test]
    fn routes_settings_events() {
        assert_eq!(route(TOPIC_SERVER_ADDRESS_CHANGED), Some(Route::Reinitialize));
        assert_eq!(
            route(TOPIC_GENERAL_SETTINGS_UPDATED),
            Some(Route::NotifyWorker("/general-settings-updated"))
        );
        assert_eq!(
            route(TOPIC_GAME_SETTINGS_UPDATED),
            Some(Route::NotifyWorker("/game-settings-updated"))
        );
        assert_eq!(route(TOPIC_QUIT_REQUESTED), Some(Route::Quit));
        assert_eq!(route(TOPIC_LOG_MESSAGE), None);
        assert_eq!(route(TOPIC_TASK_STOPPED), None);
    }

    #[tokio::test]
    async fn router_stops_on_quit_request() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Bus::new(64);
        let log = FrontendLog::new(bus.clone());
        let settings = Arc::new(SettingsStore::at_path(
            dir.path().join("config.toml"),
            bus.clone(),
            log.clone(),
        ));
        let supervisor = Supervisor::new(settings, log, bus.clone(), None).unwrap();
        let handle = spawn(&bus, supervisor);

        bus.emit(TOPIC_GENERAL_SETTINGS_UPDATED);
        bus.emit(TOPIC_SERVER_ADDRESS_CHANGED);
        bus.emit(TOPIC_QUIT_REQUESTED);
        assert_eq!(handle.await.unwrap(), RouterExit::Quit);
    }
}
