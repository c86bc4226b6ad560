//! Persistence seam for conversations, participants, messages and study rooms
//!
//! Every mutating operation is one atomic unit: either all of its effects are
//! visible afterwards or none are. Implementations report
//! [`AppError::Conflict`](crate::error::AppError::Conflict) for uniqueness
//! races and [`AppError::TransientStore`](crate::error::AppError::TransientStore)
//! when the backend is unreachable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    ChatRoom, Conversation, Message, NewGroup, NewRoomMessage, Participant, RoomMessage,
    SendMessage,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ChatStore: Send + Sync {
    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    async fn find_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    /// Conversations where `user_id` is an active participant, most recent
    /// activity first
    async fn list_conversations_for_user(&self, user_id: i64) -> AppResult<Vec<Conversation>>;

    /// Individual conversation for the unordered pair, if any
    async fn find_individual(&self, a: i64, b: i64) -> AppResult<Option<Conversation>>;

    /// Create the individual conversation for the pair with both users as
    /// active participants. `Conflict` if the pair already has one.
    async fn create_individual(&self, a: i64, b: i64) -> AppResult<Conversation>;

    /// Create a group; the creator plus `group.member_ids` join as active
    /// participants
    async fn create_group(&self, creator: i64, group: NewGroup) -> AppResult<Conversation>;

    /// Insert the participant, or reactivate an inactive row keeping its read
    /// cursor
    async fn add_participant(&self, conversation_id: Uuid, user_id: i64)
        -> AppResult<Participant>;

    async fn deactivate_participant(&self, conversation_id: Uuid, user_id: i64) -> AppResult<()>;

    async fn find_participant(
        &self,
        conversation_id: Uuid,
        user_id: i64,
    ) -> AppResult<Option<Participant>>;

    async fn list_participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>>;

    /// `NotFound` for a user who never joined the conversation
    async fn set_participant_muted(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        muted: bool,
    ) -> AppResult<Participant>;

    // ------------------------------------------------------------------
    // Messages and read cursors
    // ------------------------------------------------------------------

    /// Persist a message, advance the sender's cursor to its timestamp and
    /// refresh conversation activity and preview, as one unit.
    ///
    /// `NotFound` for an unknown conversation, `Forbidden` when the sender is
    /// not an active participant.
    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: i64,
        input: SendMessage,
    ) -> AppResult<Message>;

    /// Page of messages in chronological order, ending just before the
    /// `before` sequence when given
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        before: Option<i64>,
        limit: i64,
    ) -> AppResult<Vec<Message>>;

    /// Case-insensitive substring match on content, oldest first
    async fn search_messages(
        &self,
        conversation_id: Uuid,
        keyword: &str,
        limit: i64,
    ) -> AppResult<Vec<Message>>;

    /// Pin a message of the conversation. Idempotent; the first pin wins.
    async fn pin_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        pinned_by: i64,
    ) -> AppResult<Message>;

    /// Idempotent
    async fn unpin_message(&self, conversation_id: Uuid, message_id: Uuid) -> AppResult<()>;

    /// Pinned messages in the order they were pinned
    async fn pinned_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    /// Move the cursor to `max(current, at)` and return the stored value
    async fn advance_read_cursor(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>>;

    /// Messages newer than the user's cursor that someone else sent
    async fn count_unread(&self, conversation_id: Uuid, user_id: i64) -> AppResult<i64>;

    // ------------------------------------------------------------------
    // Study rooms
    // ------------------------------------------------------------------

    async fn find_room(&self, room_token: &str) -> AppResult<Option<ChatRoom>>;

    async fn find_room_by_roadmap(&self, roadmap_id: i64) -> AppResult<Option<ChatRoom>>;

    /// `Conflict` when the roadmap already has a room
    async fn create_room(&self, room: ChatRoom) -> AppResult<ChatRoom>;

    /// Idempotent; `member_count` changes only when membership does
    async fn join_room(&self, room_token: &str, user_id: i64) -> AppResult<ChatRoom>;

    async fn leave_room(&self, room_token: &str, user_id: i64) -> AppResult<ChatRoom>;

    /// Store a room message and bump `message_count` / `last_message_at`
    async fn append_room_message(
        &self,
        room_token: &str,
        user_id: i64,
        input: NewRoomMessage,
    ) -> AppResult<RoomMessage>;

    /// Latest non-deleted messages, returned oldest first
    async fn recent_room_messages(
        &self,
        room_token: &str,
        limit: i64,
    ) -> AppResult<Vec<RoomMessage>>;

    async fn set_room_message_pinned(
        &self,
        message_id: Uuid,
        pinned: bool,
    ) -> AppResult<RoomMessage>;

    async fn pinned_room_messages(&self, room_token: &str) -> AppResult<Vec<RoomMessage>>;

    /// Soft delete; only the author may delete. Decrements `message_count`.
    async fn soft_delete_room_message(
        &self,
        message_id: Uuid,
        user_id: i64,
    ) -> AppResult<RoomMessage>;
}
