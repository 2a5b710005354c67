mod app;
mod router;
mod telemetry;

use anyhow::Context;
use tracing::{info, warn};

use crate::app::App;
use crate::router::RouterExit;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let telemetry = telemetry::init();
    let app = App::build().context("starting launcher")?;
    telemetry.apply(app.settings.get().logging.level);
    info!(version = env!("CARGO_PKG_VERSION"), "ADB Auto Player launcher");

    let router = router::spawn(&app.bus, app.supervisor.clone());

    let update_check = async {
        if let Err(err) = app.check_updates().await {
            warn!("{err:#}");
            app.log.error(format!("{err:#}"));
        }
        std::future::pending::<()>().await
    };

    tokio::select! {
        _ = update_check => {}
        exit = router => {
            match exit {
                Ok(RouterExit::Quit) => info!("quit requested"),
                Ok(RouterExit::BusClosed) => warn!("event bus closed"),
                Err(err) => warn!(%err, "event router failed"),
            }
        }
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for Ctrl-C")?;
            info!("interrupt received");
        }
    }

    app.shutdown().await;
    Ok(())
}
