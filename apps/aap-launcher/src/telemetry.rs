use aap_core::LogLevel;
use tracing::warn;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Console tracing installed before settings are read. The filter starts at
/// INFO and follows the configured level once it is known, unless `RUST_LOG`
/// is set.
pub struct Telemetry {
    filter: Option<FilterHandle>,
}

pub fn init() -> Telemetry {
    let (filter, pinned) = startup_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok());
    let (filter, handle) = reload::Layer::new(filter);
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .is_ok();
    Telemetry {
        filter: (installed && !pinned).then_some(handle),
    }
}

/// Filter used until settings load, and whether `RUST_LOG` fixed it.
fn startup_filter(rust_log: Option<String>) -> (EnvFilter, bool) {
    let from_env = rust_log
        .filter(|raw| !raw.trim().is_empty())
        .and_then(|raw| EnvFilter::try_new(raw).ok());
    match from_env {
        Some(filter) => (filter, true),
        None => (EnvFilter::new(LogLevel::Info.tracing_directive()), false),
    }
}

impl Telemetry {
    pub fn apply(&self, level: LogLevel) {
        let Some(handle) = self.filter.as_ref() else {
            return;
        };
        if let Err(err) = handle.reload(EnvFilter::new(level.tracing_directive())) {
            warn!(%err, "failed to apply configured log level");
        }
    }
}
