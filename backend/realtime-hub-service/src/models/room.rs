//! Roadmap study rooms: one chat room per learning roadmap

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    pub id: Uuid,
    pub roadmap_id: i64,
    pub roadmap_name: String,
    /// Stable public token; also the topic suffix `roadmap-room:{token}`
    pub room_token: String,
    /// Cache of active membership rows
    pub member_count: i64,
    /// Cache of non-deleted message rows
    pub message_count: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_message_at: Option<DateTime<Utc>>,
}

impl ChatRoom {
    pub fn new(roadmap_id: i64, roadmap_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            roadmap_id,
            roadmap_name: roadmap_name.into(),
            room_token: Uuid::new_v4().to_string(),
            member_count: 0,
            message_count: 0,
            is_active: true,
            created_at: now,
            last_message_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomMessageKind {
    #[default]
    Text,
    Image,
    File,
    System,
    CodeSnippet,
    Poll,
}

impl RoomMessageKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "system" => Some(Self::System),
            "code_snippet" => Some(Self::CodeSnippet),
            "poll" => Some(Self::Poll),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::System => "system",
            Self::CodeSnippet => "code_snippet",
            Self::Poll => "poll",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomMessage {
    pub id: Uuid,
    pub room_token: String,
    pub user_id: i64,
    pub user_name: Option<String>,
    pub content: String,
    pub kind: RoomMessageKind,
    pub attachment_url: Option<String>,
    pub reply_to: Option<Uuid>,
    pub is_pinned: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewRoomMessage {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub kind: RoomMessageKind,
    pub user_name: Option<String>,
    pub attachment_url: Option<String>,
    pub reply_to: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_snippet_wire_name() {
        let kind: RoomMessageKind = serde_json::from_str("\"code_snippet\"").unwrap();
        assert_eq!(kind, RoomMessageKind::CodeSnippet);
        assert_eq!(RoomMessageKind::from_db(kind.to_db()), Some(kind));
    }

    #[test]
    fn test_new_room_starts_empty() {
        let room = ChatRoom::new(12, "Rust Basics", Utc::now());
        assert_eq!(room.member_count, 0);
        assert_eq!(room.message_count, 0);
        assert!(Uuid::parse_str(&room.room_token).is_ok());
    }
}
