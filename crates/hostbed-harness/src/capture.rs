//! Capture of events emitted by handlers under test.

use async_trait::async_trait;
use hostbed_core::{EmitError, EmitResult, EventSender, OutgoingEvent};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// An event as the outside world would have received it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmittedEvent {
    pub topic: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

/// Passes `value` through JSON text and back.
///
/// The result is what a receiver on the other side of a real broker would
/// see: no shared identity and only JSON representable content.
pub fn json_roundtrip<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Value> {
    serde_json::from_str(&serde_json::to_string(value)?)
}

/// Records emitted events in order.
#[derive(Debug, Default)]
pub struct EventCapture {
    emitted: Mutex<Vec<EmittedEvent>>,
}

impl EventCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of the events recorded so far.
    pub fn emitted(&self) -> Vec<EmittedEvent> {
        self.emitted.lock().clone()
    }

    pub fn clear(&self) {
        self.emitted.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.emitted.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.lock().is_empty()
    }
}

#[async_trait]
impl EventSender for EventCapture {
    async fn send_event(
        &self,
        event: OutgoingEvent,
        cancellation: &CancellationToken,
    ) -> EmitResult<()> {
        if cancellation.is_cancelled() {
            return Err(EmitError::Cancelled);
        }
        let data = event.data.as_deref().map(serde_json::from_str).transpose()?;

        trace!(topic = %event.topic, event_type = %event.event_type, "Captured event");
        self.emitted.lock().push(EmittedEvent {
            topic: event.topic,
            event_type: event.event_type,
            subject: event.subject,
            data,
            message_id: event.message_id,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::assert_ok;

    #[derive(Serialize)]
    struct Greeting {
        who: &'static str,
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<&'static str>,
        at: chrono::DateTime<chrono::Utc>,
    }

    #[tokio::test]
    async fn payload_is_round_tripped() {
        let capture = EventCapture::new();
        let at = chrono::DateTime::parse_from_rfc3339("2024-09-20T20:20:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let event = OutgoingEvent::new("greeting", "sent", "world")
            .with_data(&Greeting {
                who: "world",
                note: None,
                at,
            })
            .unwrap()
            .with_message_id("m-1");

        assert_ok!(capture.send_event(event, &CancellationToken::new()).await);

        let emitted = capture.emitted();
        assert_eq!(
            emitted,
            [EmittedEvent {
                topic: "greeting".into(),
                event_type: "sent".into(),
                subject: "world".into(),
                data: Some(json!({ "who": "world", "at": "2024-09-20T20:20:00Z" })),
                message_id: Some("m-1".into()),
            }]
        );
    }

    #[tokio::test]
    async fn cancelled_send_records_nothing() {
        let capture = EventCapture::new();
        let token = CancellationToken::new();
        token.cancel();

        let result = capture
            .send_event(OutgoingEvent::new("t", "e", "s"), &token)
            .await;
        assert!(matches!(result, Err(EmitError::Cancelled)));
        assert!(capture.is_empty());
    }

    #[tokio::test]
    async fn nothing_is_validated() {
        let capture = EventCapture::new();
        assert_ok!(
            capture
                .send_event(OutgoingEvent::new("", "", ""), &CancellationToken::new())
                .await
        );
        assert_eq!(capture.len(), 1);
        assert_eq!(capture.emitted()[0].data, None);

        capture.clear();
        assert!(capture.is_empty());
    }

    #[test]
    fn roundtrip_is_idempotent() {
        let value = json!({ "a": [1, 2.5, null], "b": { "c": "d" } });
        let once = json_roundtrip(&value).unwrap();
        assert_eq!(json_roundtrip(&once).unwrap(), once);
        assert_eq!(once, value);
    }

    #[test]
    fn emitted_event_serializes_like_the_wire() {
        let event = EmittedEvent {
            topic: "t".into(),
            event_type: "e".into(),
            subject: "s".into(),
            data: None,
            message_id: Some("m".into()),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "topic": "t", "type": "e", "subject": "s", "messageId": "m" })
        );
    }
}
