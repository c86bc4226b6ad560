use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    File,
    Video,
    Audio,
    System,
}

impl MessageKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "video" => Some(Self::Video),
            "audio" => Some(Self::Audio),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub file_url: String,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub mime_type: Option<String>,
}

/// Stored message. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub content: String,
    pub kind: MessageKind,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    /// Per-conversation ordinal; breaks `created_at` ties
    pub sequence: i64,
}

/// Recipient-relative delivery state, derived from read cursors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

/// Input to the dispatcher
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub sender_name: Option<String>,
}

impl SendMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.attachments.is_empty()
    }
}

/// A message as seen by one viewer
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub status: DeliveryStatus,
    pub is_from_me: bool,
}

/// Snapshot pushed with `CHAT_MESSAGE_CREATED`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    pub message_id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: i64,
    pub sender_name: Option<String>,
    pub content: String,
    pub message_type: MessageKind,
    pub attachments: Vec<Attachment>,
    pub sequence: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for ChatMessagePayload {
    fn from(m: &Message) -> Self {
        Self {
            message_id: m.id,
            conversation_id: m.conversation_id,
            sender_id: m.sender_id,
            sender_name: m.sender_name.clone(),
            content: m.content.clone(),
            message_type: m.kind,
            attachments: m.attachments.clone(),
            sequence: m.sequence,
            created_at: m.created_at,
        }
    }
}
