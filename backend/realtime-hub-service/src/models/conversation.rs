//! Conversations and their participants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    /// Exactly two participants; one per unordered user pair
    Individual,
    Group,
}

impl ConversationKind {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "individual" => Some(Self::Individual),
            "group" => Some(Self::Group),
            _ => None,
        }
    }

    pub fn to_db(&self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
        }
    }
}

impl fmt::Display for ConversationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub avatar_color: Option<String>,
    /// Preview of the latest message
    pub last_message: Option<String>,
    pub last_message_sender_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(kind: ConversationKind, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            name: None,
            avatar_url: None,
            avatar_color: None,
            last_message: None,
            last_message_sender_id: None,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn require_group(&self) -> Result<(), crate::error::AppError> {
        match self.kind {
            ConversationKind::Group => Ok(()),
            ConversationKind::Individual => Err(crate::error::AppError::bad_request(
                "operation only valid for group conversations",
            )),
        }
    }
}

/// Canonical ordering of an unordered user pair
pub fn normalize_pair(a: i64, b: i64) -> (i64, i64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Membership row; one per (conversation, user)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub conversation_id: Uuid,
    pub user_id: i64,
    pub is_active: bool,
    /// Muted conversations get no inbox notices; unread counts still apply
    #[serde(default)]
    pub is_muted: bool,
    /// Read cursor; messages created after it count as unread
    pub last_read_at: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
}

impl Participant {
    pub fn new(conversation_id: Uuid, user_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            conversation_id,
            user_id,
            is_active: true,
            is_muted: false,
            last_read_at: now,
            joined_at: now,
        }
    }
}

/// Group creation input
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGroup {
    pub name: String,
    pub avatar_url: Option<String>,
    pub avatar_color: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<i64>,
}

/// Conversation list filter for `GET /conversations`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationFilter {
    #[default]
    All,
    Individual,
    Group,
}

impl ConversationFilter {
    pub fn matches(&self, kind: ConversationKind) -> bool {
        match self {
            ConversationFilter::All => true,
            ConversationFilter::Individual => kind == ConversationKind::Individual,
            ConversationFilter::Group => kind == ConversationKind::Group,
        }
    }
}

/// Row of the caller's conversation list
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participant_ids: Vec<i64>,
    pub unread_count: i64,
}
