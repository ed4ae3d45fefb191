use tracing::{error, warn};

use crate::message::chat::ChatMessage;
use crate::message::render::MessageRenderer;

/// Outcome of processing one delivery, mapped to exactly one acknowledgement
/// call against the delivery's tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Acknowledge,
    RejectNoRequeue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// A log line the consume loop emits on the handler's behalf. Undecodable
/// messages attach their raw payload for operator diagnosis.
#[derive(Debug)]
pub struct LogEvent {
    pub severity: Severity,
    pub message: String,
    pub payload: Option<Vec<u8>>,
}

impl LogEvent {
    pub fn emit(&self) {
        match (self.severity, self.payload.as_deref()) {
            (Severity::Error, Some(payload)) => {
                error!(
                    "{} (raw message: {})",
                    self.message,
                    String::from_utf8_lossy(payload)
                );
            }
            (Severity::Error, None) => error!("{}", self.message),
            (Severity::Warning, Some(payload)) => {
                warn!(
                    "{} (raw message: {})",
                    self.message,
                    String::from_utf8_lossy(payload)
                );
            }
            (Severity::Warning, None) => warn!("{}", self.message),
        }
    }
}

pub struct MessageHandler<R> {
    renderer: R,
}

impl<R: MessageRenderer> MessageHandler<R> {
    pub fn new(renderer: R) -> Self {
        Self { renderer }
    }

    /// Decode and render one delivery payload.
    ///
    /// A payload that cannot be decoded is rejected without requeue: it will
    /// never become valid on redelivery, and requeueing it would loop
    /// forever. A payload that decodes but fails downstream is acknowledged
    /// and dropped instead.
    pub fn handle(&self, payload: &[u8]) -> (Disposition, Option<LogEvent>) {
        let message = match ChatMessage::decode(payload) {
            Ok(message) => message,
            Err(err) => {
                let event = LogEvent {
                    severity: Severity::Error,
                    message: format!("Failed to decode message: {err}"),
                    payload: Some(payload.to_vec()),
                };
                return (Disposition::RejectNoRequeue, Some(event));
            }
        };

        let formatted_time = message.formatted_sent_at();
        match self.renderer.render(&message, &formatted_time) {
            Ok(()) => (Disposition::Acknowledge, None),
            Err(err) => {
                let event = LogEvent {
                    severity: Severity::Warning,
                    message: format!("Error processing message from {}: {err:#}", message.author),
                    payload: None,
                };
                (Disposition::Acknowledge, Some(event))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingRenderer {
        seen: Arc<Mutex<Vec<(String, String, String)>>>,
    }

    impl MessageRenderer for RecordingRenderer {
        fn render(&self, message: &ChatMessage, formatted_time: &str) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push((
                message.author.clone(),
                message.body.clone(),
                formatted_time.to_string(),
            ));
            Ok(())
        }
    }

    struct FailingRenderer;

    impl MessageRenderer for FailingRenderer {
        fn render(&self, _message: &ChatMessage, _formatted_time: &str) -> anyhow::Result<()> {
            Err(anyhow!("renderer exploded"))
        }
    }

    #[test]
    fn valid_message_is_rendered_and_acknowledged() {
        let renderer = RecordingRenderer::default();
        let seen = Arc::clone(&renderer.seen);
        let handler = MessageHandler::new(renderer);

        let (disposition, event) = handler.handle(
            br#"{"author":"Cartman","body":"Respect my authority","sent_at":"2024-01-01T12:00:00Z"}"#,
        );

        assert_eq!(disposition, Disposition::Acknowledge);
        assert!(event.is_none());
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[(
                "Cartman".to_string(),
                "Respect my authority".to_string(),
                "2024-01-01 12:00:00".to_string()
            )]
        );
    }

    #[test]
    fn undecodable_payload_is_rejected_without_requeue() {
        let handler = MessageHandler::new(RecordingRenderer::default());

        for payload in [&b"not json"[..], &[0xff, 0xfe][..]] {
            let (disposition, event) = handler.handle(payload);
            assert_eq!(disposition, Disposition::RejectNoRequeue);
            let event = event.expect("decode failure must produce a log event");
            assert_eq!(event.severity, Severity::Error);
            assert_eq!(event.payload.as_deref(), Some(payload));
        }
    }

    #[test]
    fn unparseable_timestamp_is_rendered_raw() {
        let renderer = RecordingRenderer::default();
        let seen = Arc::clone(&renderer.seen);
        let handler = MessageHandler::new(renderer);

        let (disposition, event) =
            handler.handle(br#"{"author":"Kyle","body":"dude","sent_at":"next tuesday"}"#);

        assert_eq!(disposition, Disposition::Acknowledge);
        assert!(event.is_none());
        assert_eq!(seen.lock().unwrap()[0].2, "next tuesday");
    }

    #[test]
    fn missing_author_defaults_to_unknown() {
        let renderer = RecordingRenderer::default();
        let seen = Arc::clone(&renderer.seen);
        let handler = MessageHandler::new(renderer);

        let (disposition, _) = handler.handle(br#"{"body":"who is this"}"#);

        assert_eq!(disposition, Disposition::Acknowledge);
        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].0, "Unknown");
        assert_eq!(seen[0].2, "Unknown Time");
    }

    #[test]
    fn render_failure_still_acknowledges() {
        let handler = MessageHandler::new(FailingRenderer);

        let (disposition, event) = handler.handle(br#"{"author":"Butters","body":"oh hamburgers"}"#);

        assert_eq!(disposition, Disposition::Acknowledge);
        let event = event.expect("render failure must produce a log event");
        assert_eq!(event.severity, Severity::Warning);
        assert!(event.message.contains("Butters"));
        assert!(event.payload.is_none());
    }
}
