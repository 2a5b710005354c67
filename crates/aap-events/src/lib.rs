use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Minimal event envelope (RFC3339 time).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope {
    pub time: String,
    pub kind: String,
    pub payload: Value,
}

impl Envelope {
    /// Decode the payload into a typed value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// A simple broadcast bus for JSON-serializable events.
///
/// Delivery order per publisher is preserved; slow subscribers that fall more
/// than `capacity` events behind observe `RecvError::Lagged`.
#[derive(Clone)]
pub struct Bus {
    tx: broadcast::Sender<Envelope>,
}

impl Bus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn publish<T: Serialize>(&self, kind: &str, payload: &T) {
        let val = serde_json::to_value(payload).unwrap_or_else(|err| {
            tracing::warn!(kind, %err, "event payload failed to serialize");
            serde_json::json!({"_ser":"error"})
        });
        self.publish_value(kind, val);
    }

    /// Publish an event that carries no payload.
    pub fn emit(&self, kind: &str) {
        self.publish_value(kind, Value::Null);
    }

    fn publish_value(&self, kind: &str, payload: Value) {
        let now = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        // No subscribers is not an error; events are fire-and-forget.
        let _ = self.tx.send(Envelope {
            time: now,
            kind: kind.to_string(),
            payload,
        });
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_events_in_publish_order() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        bus.publish("a.first", &serde_json::json!({"n": 1}));
        bus.emit("a.second");
        bus.publish("a.third", &3u32);

        let first = rx.recv().await.expect("first");
        let second = rx.recv().await.expect("second");
        let third = rx.recv().await.expect("third");
        assert_eq!(first.kind, "a.first");
        assert_eq!(first.payload["n"], 1);
        assert_eq!(second.kind, "a.second");
        assert!(second.payload.is_null());
        assert_eq!(third.decode::<u32>().expect("decode"), 3);
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        let bus = Bus::new(4);
        assert_eq!(bus.subscriber_count(), 0);
        bus.emit("nobody.listens");
    }

    #[test]
    fn envelope_time_is_rfc3339_millis() {
        let bus = Bus::new(4);
        let mut rx = bus.subscribe();
        bus.emit("t");
        let env = rx.try_recv().expect("event");
        assert!(chrono::DateTime::parse_from_rfc3339(&env.time).is_ok());
        assert!(env.time.ends_with('Z'));
    }
}
