//! In-process event hub.
//!
//! The pipeline publishes notifications (for example `job_created`) here and
//! any number of consumers subscribe. Publishing never blocks: a subscriber
//! that falls behind loses the oldest events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Event type published when a new job row is stored.
pub const JOB_CREATED: &str = "job_created";

/// A versioned, JSON-serializable notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event type, e.g. `job_created`
    #[serde(rename = "type")]
    pub kind: String,
    /// Payload schema version
    pub v: u32,
    /// Publication time
    pub at: DateTime<Utc>,
    /// Correlation id of the cycle or request that caused the event
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub request_id: Option<String>,
    /// Event payload
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Event {
    /// Build a version-1 event stamped with the current time.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            v: 1,
            at: Utc::now(),
            request_id: None,
            data,
        }
    }

    /// Attach a correlation id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }
}

/// Broadcast hub for [`Event`]s.
///
/// Cloneable; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventHub {
    tx: broadcast::Sender<Event>,
}

impl EventHub {
    /// Create a hub that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn publish(&self, event: Event) -> usize {
        // No receivers is not an error
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Current number of subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_json_shape() {
        let event = Event::new(JOB_CREATED, json!({"source_id": "lever:acme:1"}))
            .with_request_id("cycle-1");
        let value = serde_json::to_value(&event).expect("serialize event");

        assert_eq!(value["type"], "job_created");
        assert_eq!(value["v"], 1);
        assert_eq!(value["request_id"], "cycle-1");
        assert_eq!(value["data"]["source_id"], "lever:acme:1");
        assert!(value["at"].is_string());
    }

    #[test]
    fn test_request_id_omitted_when_absent() {
        let value = serde_json::to_value(Event::new("ping", json!({}))).expect("serialize");
        assert!(value.get("request_id").is_none());
    }

    #[tokio::test]
    async fn test_publish_subscribe_roundtrip() {
        let hub = EventHub::default();
        let mut rx = hub.subscribe();

        let event = Event::new(JOB_CREATED, json!({"title": "Dev"}));
        assert_eq!(hub.publish(event.clone()), 1);

        let received = rx.recv().await.expect("receive event");
        assert_eq!(received, event);
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let hub = EventHub::new(4);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(Event::new("ping", json!(null))), 0);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let hub = EventHub::new(2);
        let mut rx = hub.subscribe();
        for i in 0..5 {
            hub.publish(Event::new("n", json!(i)));
        }

        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(3))
        ));
        let next = rx.recv().await.expect("receive after lag");
        assert_eq!(next.data, json!(3));
    }
}
