use serde::{Deserialize, Serialize};

/// Every event kind that can be pushed to live subscribers.
///
/// Wire names are SCREAMING_SNAKE_CASE (`ANSWER_CREATED`, `CHAT_MESSAGE_CREATED`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LiveEventKind {
    // ============================================================================
    // Q&A: questions
    // ============================================================================
    QuestionCreated,
    QuestionUpdated,
    QuestionDeleted,
    QuestionClosed,
    QuestionReopened,

    // ============================================================================
    // Q&A: answers
    // ============================================================================
    AnswerCreated,
    AnswerUpdated,
    AnswerDeleted,
    AnswerMarkedBest,
    AnswerUnmarkedBest,

    // ============================================================================
    // Q&A: comments
    // ============================================================================
    CommentCreated,
    CommentUpdated,
    CommentDeleted,

    // ============================================================================
    // Q&A: votes and reactions
    // ============================================================================
    VoteAdded,
    VoteRemoved,
    VoteChanged,
    ReactionUpdated,

    // ============================================================================
    // Q&A: moderation
    // ============================================================================
    ContentFlagged,
    ContentApproved,
    ContentRejected,

    // ============================================================================
    // Conversations
    // ============================================================================
    ChatMessageCreated,
    /// Inbox notice on `user:{id}`: a conversation gained activity
    ConversationUpdated,

    // ============================================================================
    // Study rooms
    // ============================================================================
    RoomMessageCreated,
    RoomMessageDeleted,
}

/// Coarse grouping used for logging and metrics labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFamily {
    Question,
    Answer,
    Comment,
    Vote,
    Moderation,
    Chat,
    Room,
}

impl EventFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFamily::Question => "question",
            EventFamily::Answer => "answer",
            EventFamily::Comment => "comment",
            EventFamily::Vote => "vote",
            EventFamily::Moderation => "moderation",
            EventFamily::Chat => "chat",
            EventFamily::Room => "room",
        }
    }
}

impl LiveEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuestionCreated => "QUESTION_CREATED",
            Self::QuestionUpdated => "QUESTION_UPDATED",
            Self::QuestionDeleted => "QUESTION_DELETED",
            Self::QuestionClosed => "QUESTION_CLOSED",
            Self::QuestionReopened => "QUESTION_REOPENED",
            Self::AnswerCreated => "ANSWER_CREATED",
            Self::AnswerUpdated => "ANSWER_UPDATED",
            Self::AnswerDeleted => "ANSWER_DELETED",
            Self::AnswerMarkedBest => "ANSWER_MARKED_BEST",
            Self::AnswerUnmarkedBest => "ANSWER_UNMARKED_BEST",
            Self::CommentCreated => "COMMENT_CREATED",
            Self::CommentUpdated => "COMMENT_UPDATED",
            Self::CommentDeleted => "COMMENT_DELETED",
            Self::VoteAdded => "VOTE_ADDED",
            Self::VoteRemoved => "VOTE_REMOVED",
            Self::VoteChanged => "VOTE_CHANGED",
            Self::ReactionUpdated => "REACTION_UPDATED",
            Self::ContentFlagged => "CONTENT_FLAGGED",
            Self::ContentApproved => "CONTENT_APPROVED",
            Self::ContentRejected => "CONTENT_REJECTED",
            Self::ChatMessageCreated => "CHAT_MESSAGE_CREATED",
            Self::ConversationUpdated => "CONVERSATION_UPDATED",
            Self::RoomMessageCreated => "ROOM_MESSAGE_CREATED",
            Self::RoomMessageDeleted => "ROOM_MESSAGE_DELETED",
        }
    }

    pub fn family(&self) -> EventFamily {
        match self {
            Self::QuestionCreated
            | Self::QuestionUpdated
            | Self::QuestionDeleted
            | Self::QuestionClosed
            | Self::QuestionReopened => EventFamily::Question,

            Self::AnswerCreated
            | Self::AnswerUpdated
            | Self::AnswerDeleted
            | Self::AnswerMarkedBest
            | Self::AnswerUnmarkedBest => EventFamily::Answer,

            Self::CommentCreated | Self::CommentUpdated | Self::CommentDeleted => {
                EventFamily::Comment
            }

            Self::VoteAdded | Self::VoteRemoved | Self::VoteChanged | Self::ReactionUpdated => {
                EventFamily::Vote
            }

            Self::ContentFlagged | Self::ContentApproved | Self::ContentRejected => {
                EventFamily::Moderation
            }

            Self::ChatMessageCreated | Self::ConversationUpdated => EventFamily::Chat,

            Self::RoomMessageCreated | Self::RoomMessageDeleted => EventFamily::Room,
        }
    }

    /// True for kinds produced by the Q&A module
    pub fn is_qa(&self) -> bool {
        !matches!(self.family(), EventFamily::Chat | EventFamily::Room)
    }
}

impl std::fmt::Display for LiveEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde_name() {
        let kinds = [
            LiveEventKind::QuestionCreated,
            LiveEventKind::AnswerMarkedBest,
            LiveEventKind::VoteChanged,
            LiveEventKind::ContentRejected,
            LiveEventKind::ChatMessageCreated,
            LiveEventKind::RoomMessageDeleted,
        ];

        for kind in kinds {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }

    #[test]
    fn test_qa_family() {
        assert!(LiveEventKind::AnswerCreated.is_qa());
        assert!(LiveEventKind::ContentFlagged.is_qa());
        assert!(!LiveEventKind::ChatMessageCreated.is_qa());
        assert!(!LiveEventKind::RoomMessageCreated.is_qa());
    }
}
