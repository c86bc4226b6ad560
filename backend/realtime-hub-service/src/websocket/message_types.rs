use event_schema::LiveEvent;
use serde::{Deserialize, Serialize};

use super::topics::Topic;

/// Inbound WebSocket frames from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsInboundEvent {
    /// Topic arrives as raw text so a malformed name yields an `error` frame
    /// instead of a dropped frame
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Ping,
}

/// Outbound WebSocket frames from server to client
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsOutboundEvent {
    Subscribed { topic: Topic },
    Unsubscribed { topic: Topic },
    Event { topic: Topic, event: LiveEvent },
    Error { code: String, message: String },
    Pong,
}

impl WsOutboundEvent {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to encode outbound frame");
            r#"{"type":"error","code":"INTERNAL_SERVER_ERROR","message":"encoding failure"}"#
                .to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_schema::LiveEventKind;

    #[test]
    fn test_inbound_frames_parse() {
        let sub: WsInboundEvent =
            serde_json::from_str(r#"{"type":"subscribe","topic":"qa:question:42"}"#).unwrap();
        assert!(matches!(sub, WsInboundEvent::Subscribe { topic } if topic == "qa:question:42"));

        let ping: WsInboundEvent = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, WsInboundEvent::Ping));
    }

    #[test]
    fn test_event_frame_shape() {
        let frame = WsOutboundEvent::Event {
            topic: Topic::QaQuestion(42),
            event: LiveEvent::new(LiveEventKind::AnswerCreated, 7_i64, 11),
        };
        let value: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(value["type"], "event");
        assert_eq!(value["topic"], "qa:question:42");
        assert_eq!(value["event"]["eventType"], "ANSWER_CREATED");
        assert_eq!(value["event"]["entityId"], 7);
    }
}
