/// Desktop notification seam.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str);
}

/// Default notifier: records the notification in the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        tracing::info!(target: "notify", title, body, "notification");
    }
}
