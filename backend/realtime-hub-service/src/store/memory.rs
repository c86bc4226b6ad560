//! In-process store used when no `DATABASE_URL` is configured and by tests
//!
//! One `RwLock` guards all state, so every trait method is trivially atomic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ChatStore;
use crate::error::{AppError, AppResult, Entity};
use crate::models::{
    normalize_pair, ChatRoom, Conversation, ConversationKind, Message, NewGroup, NewRoomMessage,
    Participant, RoomMessage, SendMessage,
};

#[derive(Default)]
struct State {
    conversations: HashMap<Uuid, Conversation>,
    /// Normalized pair -> individual conversation
    individual_index: HashMap<(i64, i64), Uuid>,
    participants: HashMap<(Uuid, i64), Participant>,
    /// Per conversation, in write order
    messages: HashMap<Uuid, Vec<Message>>,
    /// Per conversation: (message, pinned by), in pin order
    pins: HashMap<Uuid, Vec<(Uuid, i64)>>,
    rooms: HashMap<String, ChatRoom>,
    room_by_roadmap: HashMap<i64, String>,
    room_members: HashSet<(String, i64)>,
    room_messages: Vec<RoomMessage>,
}

impl State {
    fn conversation_mut(&mut self, id: Uuid) -> AppResult<&mut Conversation> {
        self.conversations
            .get_mut(&id)
            .ok_or(AppError::NotFound(Entity::Conversation))
    }

    fn room_mut(&mut self, token: &str) -> AppResult<&mut ChatRoom> {
        self.rooms
            .get_mut(token)
            .ok_or(AppError::NotFound(Entity::Room))
    }

    fn room_message_mut(&mut self, id: Uuid) -> AppResult<&mut RoomMessage> {
        self.room_messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or(AppError::NotFound(Entity::Message))
    }

    fn insert_participant(&mut self, conversation_id: Uuid, user_id: i64, now: DateTime<Utc>) {
        self.participants
            .entry((conversation_id, user_id))
            .and_modify(|p| p.is_active = true)
            .or_insert_with(|| Participant::new(conversation_id, user_id, now));
    }
}

/// `now`, nudged forward when the clock has not advanced past `previous`
fn strictly_after(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

pub struct InMemoryStore {
    state: RwLock<State>,
    available: AtomicBool,
    stale_individual_reads: AtomicU32,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            available: AtomicBool::new(true),
            stale_individual_reads: AtomicU32::new(0),
        }
    }

    /// Simulate an outage: while unavailable every call fails with
    /// `TransientStore`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make the next `n` individual lookups miss, as a lagging replica would.
    /// Lets tests drive the resolver's create-conflict path deterministically.
    pub fn simulate_stale_individual_reads(&self, n: u32) {
        self.stale_individual_reads.store(n, Ordering::SeqCst);
    }

    /// Number of individual conversations stored for the pair
    pub async fn individual_count(&self, a: i64, b: i64) -> usize {
        let pair = normalize_pair(a, b);
        let state = self.state.read().await;
        state
            .conversations
            .values()
            .filter(|c| c.kind == ConversationKind::Individual)
            .filter(|c| {
                let members: HashSet<i64> = state
                    .participants
                    .values()
                    .filter(|p| p.conversation_id == c.id)
                    .map(|p| p.user_id)
                    .collect();
                members.len() == if pair.0 == pair.1 { 1 } else { 2 }
                    && members.contains(&pair.0)
                    && members.contains(&pair.1)
            })
            .count()
    }

    fn check_available(&self) -> AppResult<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::TransientStore("in-memory store marked unavailable".into()))
        }
    }

    fn take_stale_read(&self) -> bool {
        self.stale_individual_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChatStore for InMemoryStore {
    async fn find_conversation(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        self.check_available()?;
        Ok(self.state.read().await.conversations.get(&id).cloned())
    }

    async fn list_conversations_for_user(&self, user_id: i64) -> AppResult<Vec<Conversation>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut list: Vec<Conversation> = state
            .participants
            .values()
            .filter(|p| p.user_id == user_id && p.is_active)
            .filter_map(|p| state.conversations.get(&p.conversation_id).cloned())
            .collect();
        list.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        Ok(list)
    }

    async fn find_individual(&self, a: i64, b: i64) -> AppResult<Option<Conversation>> {
        self.check_available()?;
        if self.take_stale_read() {
            return Ok(None);
        }
        let state = self.state.read().await;
        Ok(state
            .individual_index
            .get(&normalize_pair(a, b))
            .and_then(|id| state.conversations.get(id))
            .cloned())
    }

    async fn create_individual(&self, a: i64, b: i64) -> AppResult<Conversation> {
        self.check_available()?;
        let pair = normalize_pair(a, b);
        let mut state = self.state.write().await;
        if state.individual_index.contains_key(&pair) {
            return Err(AppError::Conflict(format!(
                "individual conversation exists for users {} and {}",
                pair.0, pair.1
            )));
        }

        let now = Utc::now();
        let conversation = Conversation::new(ConversationKind::Individual, now);
        state.individual_index.insert(pair, conversation.id);
        state.conversations.insert(conversation.id, conversation.clone());
        state.insert_participant(conversation.id, pair.0, now);
        state.insert_participant(conversation.id, pair.1, now);
        Ok(conversation)
    }

    async fn create_group(&self, creator: i64, group: NewGroup) -> AppResult<Conversation> {
        self.check_available()?;
        let now = Utc::now();
        let mut conversation = Conversation::new(ConversationKind::Group, now);
        conversation.name = Some(group.name);
        conversation.avatar_url = group.avatar_url;
        conversation.avatar_color = group.avatar_color;

        let mut state = self.state.write().await;
        state.conversations.insert(conversation.id, conversation.clone());
        state.insert_participant(conversation.id, creator, now);
        for member in group.member_ids {
            state.insert_participant(conversation.id, member, now);
        }
        Ok(conversation)
    }

    async fn add_participant(
        &self,
        conversation_id: Uuid,
        user_id: i64,
    ) -> AppResult<Participant> {
        self.check_available()?;
        let now = Utc::now();
        let mut state = self.state.write().await;
        let conversation = state.conversation_mut(conversation_id)?;
        conversation.last_activity_at = conversation.last_activity_at.max(now);
        state.insert_participant(conversation_id, user_id, now);
        state
            .participants
            .get(&(conversation_id, user_id))
            .cloned()
            .ok_or(AppError::NotFound(Entity::Participant))
    }

    async fn deactivate_participant(&self, conversation_id: Uuid, user_id: i64) -> AppResult<()> {
        self.check_available()?;
        let now = Utc::now();
        let mut state = self.state.write().await;
        state.conversation_mut(conversation_id)?;
        let participant = state
            .participants
            .get_mut(&(conversation_id, user_id))
            .ok_or(AppError::NotFound(Entity::Participant))?;
        participant.is_active = false;
        let conversation = state.conversation_mut(conversation_id)?;
        conversation.last_activity_at = conversation.last_activity_at.max(now);
        Ok(())
    }

    async fn find_participant(
        &self,
        conversation_id: Uuid,
        user_id: i64,
    ) -> AppResult<Option<Participant>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state.participants.get(&(conversation_id, user_id)).cloned())
    }

    async fn list_participants(&self, conversation_id: Uuid) -> AppResult<Vec<Participant>> {
        self.check_available()?;
        let state = self.state.read().await;
        let mut list: Vec<Participant> = state
            .participants
            .values()
            .filter(|p| p.conversation_id == conversation_id)
            .cloned()
            .collect();
        list.sort_by_key(|p| p.user_id);
        Ok(list)
    }

    async fn set_participant_muted(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        muted: bool,
    ) -> AppResult<Participant> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.conversation_mut(conversation_id)?;
        let participant = state
            .participants
            .get_mut(&(conversation_id, user_id))
            .ok_or(AppError::NotFound(Entity::Participant))?;
        participant.is_muted = muted;
        Ok(participant.clone())
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        sender_id: i64,
        input: SendMessage,
    ) -> AppResult<Message> {
        self.check_available()?;
        let mut state = self.state.write().await;
        // Activity covers joins and earlier messages, so the new message sorts
        // after every cursor set at creation or join time
        let last_activity = state.conversation_mut(conversation_id)?.last_activity_at;

        let active = state
            .participants
            .get(&(conversation_id, sender_id))
            .map(|p| p.is_active)
            .unwrap_or(false);
        if !active {
            return Err(AppError::forbidden(
                "sender is not an active participant of the conversation",
            ));
        }

        let history = state.messages.entry(conversation_id).or_default();
        let sequence = history.last().map(|last| last.sequence + 1).unwrap_or(1);
        let created_at = strictly_after(last_activity);
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            sender_name: input.sender_name,
            content: input.content,
            kind: input.kind,
            attachments: input.attachments,
            created_at,
            sequence,
        };
        history.push(message.clone());

        if let Some(p) = state.participants.get_mut(&(conversation_id, sender_id)) {
            p.last_read_at = p.last_read_at.max(created_at);
        }
        let conversation = state.conversation_mut(conversation_id)?;
        conversation.last_activity_at = conversation.last_activity_at.max(created_at);
        conversation.last_message = Some(message.content.clone());
        conversation.last_message_sender_id = Some(sender_id);

        Ok(message)
    }

    async fn list_messages(
        &self,
        conversation_id: Uuid,
        before: Option<i64>,
        limit: i64,
    ) -> AppResult<Vec<Message>> {
        self.check_available()?;
        let state = self.state.read().await;
        if !state.conversations.contains_key(&conversation_id) {
            return Err(AppError::NotFound(Entity::Conversation));
        }
        let limit = limit.max(0) as usize;
        let history = state
            .messages
            .get(&conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let eligible: Vec<&Message> = history
            .iter()
            .filter(|m| before.map_or(true, |b| m.sequence < b))
            .collect();
        let start = eligible.len().saturating_sub(limit);
        Ok(eligible[start..].iter().map(|m| (*m).clone()).collect())
    }

    async fn search_messages(
        &self,
        conversation_id: Uuid,
        keyword: &str,
        limit: i64,
    ) -> AppResult<Vec<Message>> {
        self.check_available()?;
        let state = self.state.read().await;
        if !state.conversations.contains_key(&conversation_id) {
            return Err(AppError::NotFound(Entity::Conversation));
        }
        let needle = keyword.to_lowercase();
        Ok(state
            .messages
            .get(&conversation_id)
            .map(|history| {
                history
                    .iter()
                    .filter(|m| m.content.to_lowercase().contains(&needle))
                    .take(limit.max(0) as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn pin_message(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        pinned_by: i64,
    ) -> AppResult<Message> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.conversation_mut(conversation_id)?;
        let message = state
            .messages
            .get(&conversation_id)
            .and_then(|history| history.iter().find(|m| m.id == message_id))
            .cloned()
            .ok_or(AppError::NotFound(Entity::Message))?;

        let pins = state.pins.entry(conversation_id).or_default();
        if !pins.iter().any(|(id, _)| *id == message_id) {
            pins.push((message_id, pinned_by));
        }
        Ok(message)
    }

    async fn unpin_message(&self, conversation_id: Uuid, message_id: Uuid) -> AppResult<()> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.conversation_mut(conversation_id)?;
        if let Some(pins) = state.pins.get_mut(&conversation_id) {
            pins.retain(|(id, _)| *id != message_id);
        }
        Ok(())
    }

    async fn pinned_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        self.check_available()?;
        let state = self.state.read().await;
        if !state.conversations.contains_key(&conversation_id) {
            return Err(AppError::NotFound(Entity::Conversation));
        }
        let (Some(pins), Some(history)) = (
            state.pins.get(&conversation_id),
            state.messages.get(&conversation_id),
        ) else {
            return Ok(Vec::new());
        };
        Ok(pins
            .iter()
            .filter_map(|(id, _)| history.iter().find(|m| m.id == *id).cloned())
            .collect())
    }

    async fn advance_read_cursor(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(&conversation_id) {
            return Err(AppError::NotFound(Entity::Conversation));
        }
        let participant = state
            .participants
            .get_mut(&(conversation_id, user_id))
            .ok_or(AppError::NotFound(Entity::Participant))?;
        participant.last_read_at = participant.last_read_at.max(at);
        Ok(participant.last_read_at)
    }

    async fn count_unread(&self, conversation_id: Uuid, user_id: i64) -> AppResult<i64> {
        self.check_available()?;
        let state = self.state.read().await;
        let cursor = state
            .participants
            .get(&(conversation_id, user_id))
            .map(|p| p.last_read_at)
            .ok_or(AppError::NotFound(Entity::Participant))?;
        let count = state
            .messages
            .get(&conversation_id)
            .map(|history| {
                history
                    .iter()
                    .filter(|m| m.created_at > cursor && m.sender_id != user_id)
                    .count()
            })
            .unwrap_or(0);
        Ok(count as i64)
    }

    async fn find_room(&self, room_token: &str) -> AppResult<Option<ChatRoom>> {
        self.check_available()?;
        Ok(self.state.read().await.rooms.get(room_token).cloned())
    }

    async fn find_room_by_roadmap(&self, roadmap_id: i64) -> AppResult<Option<ChatRoom>> {
        self.check_available()?;
        let state = self.state.read().await;
        Ok(state
            .room_by_roadmap
            .get(&roadmap_id)
            .and_then(|token| state.rooms.get(token))
            .cloned())
    }

    async fn create_room(&self, room: ChatRoom) -> AppResult<ChatRoom> {
        self.check_available()?;
        let mut state = self.state.write().await;
        if state.room_by_roadmap.contains_key(&room.roadmap_id) {
            return Err(AppError::Conflict(format!(
                "room exists for roadmap {}",
                room.roadmap_id
            )));
        }
        state
            .room_by_roadmap
            .insert(room.roadmap_id, room.room_token.clone());
        state.rooms.insert(room.room_token.clone(), room.clone());
        Ok(room)
    }

    async fn join_room(&self, room_token: &str, user_id: i64) -> AppResult<ChatRoom> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.room_mut(room_token)?;
        let inserted = state.room_members.insert((room_token.to_string(), user_id));
        let room = state.room_mut(room_token)?;
        if inserted {
            room.member_count += 1;
        }
        Ok(room.clone())
    }

    async fn leave_room(&self, room_token: &str, user_id: i64) -> AppResult<ChatRoom> {
        self.check_available()?;
        let mut state = self.state.write().await;
        state.room_mut(room_token)?;
        let removed = state
            .room_members
            .remove(&(room_token.to_string(), user_id));
        let room = state.room_mut(room_token)?;
        if removed {
            room.member_count = (room.member_count - 1).max(0);
        }
        Ok(room.clone())
    }

    async fn append_room_message(
        &self,
        room_token: &str,
        user_id: i64,
        input: NewRoomMessage,
    ) -> AppResult<RoomMessage> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let now = Utc::now();
        let room = state.room_mut(room_token)?;
        room.message_count += 1;
        room.last_message_at = Some(now);

        let message = RoomMessage {
            id: Uuid::new_v4(),
            room_token: room_token.to_string(),
            user_id,
            user_name: input.user_name,
            content: input.content,
            kind: input.kind,
            attachment_url: input.attachment_url,
            reply_to: input.reply_to,
            is_pinned: false,
            is_deleted: false,
            created_at: now,
        };
        state.room_messages.push(message.clone());
        Ok(message)
    }

    async fn recent_room_messages(
        &self,
        room_token: &str,
        limit: i64,
    ) -> AppResult<Vec<RoomMessage>> {
        self.check_available()?;
        let state = self.state.read().await;
        if !state.rooms.contains_key(room_token) {
            return Err(AppError::NotFound(Entity::Room));
        }
        let mut recent: Vec<RoomMessage> = state
            .room_messages
            .iter()
            .rev()
            .filter(|m| m.room_token == room_token && !m.is_deleted)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }

    async fn set_room_message_pinned(
        &self,
        message_id: Uuid,
        pinned: bool,
    ) -> AppResult<RoomMessage> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let message = state.room_message_mut(message_id)?;
        if message.is_deleted {
            return Err(AppError::NotFound(Entity::Message));
        }
        message.is_pinned = pinned;
        Ok(message.clone())
    }

    async fn pinned_room_messages(&self, room_token: &str) -> AppResult<Vec<RoomMessage>> {
        self.check_available()?;
        let state = self.state.read().await;
        if !state.rooms.contains_key(room_token) {
            return Err(AppError::NotFound(Entity::Room));
        }
        Ok(state
            .room_messages
            .iter()
            .filter(|m| m.room_token == room_token && m.is_pinned && !m.is_deleted)
            .cloned()
            .collect())
    }

    async fn soft_delete_room_message(
        &self,
        message_id: Uuid,
        user_id: i64,
    ) -> AppResult<RoomMessage> {
        self.check_available()?;
        let mut state = self.state.write().await;
        let message = state.room_message_mut(message_id)?;
        if message.is_deleted {
            return Err(AppError::NotFound(Entity::Message));
        }
        if message.user_id != user_id {
            return Err(AppError::forbidden("only the author may delete a message"));
        }
        message.is_deleted = true;
        message.is_pinned = false;
        let deleted = message.clone();

        let room = state.room_mut(&deleted.room_token)?;
        room.message_count = (room.message_count - 1).max(0);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_individual_conflicts_for_either_order() {
        let store = InMemoryStore::new();
        store.create_individual(1, 2).await.unwrap();

        let err = store.create_individual(2, 1).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(store.individual_count(1, 2).await, 1);
    }

    #[tokio::test]
    async fn test_append_requires_active_participant() {
        let store = InMemoryStore::new();
        let conv = store.create_individual(1, 2).await.unwrap();

        let err = store
            .append_message(conv.id, 3, SendMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        store.deactivate_participant(conv.id, 2).await.unwrap();
        let err = store
            .append_message(conv.id, 2, SendMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_append_to_unknown_conversation_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .append_message(Uuid::new_v4(), 1, SendMessage::text("hi"))
            .await
            .unwrap_err();
        assert_eq!(err, AppError::NotFound(Entity::Conversation));
    }

    #[tokio::test]
    async fn test_append_updates_cursor_activity_and_preview() {
        let store = InMemoryStore::new();
        let conv = store.create_individual(1, 2).await.unwrap();

        let msg = store
            .append_message(conv.id, 1, SendMessage::text("hello"))
            .await
            .unwrap();

        let sender = store.find_participant(conv.id, 1).await.unwrap().unwrap();
        assert!(sender.last_read_at >= msg.created_at);

        let stored = store.find_conversation(conv.id).await.unwrap().unwrap();
        assert_eq!(stored.last_message.as_deref(), Some("hello"));
        assert_eq!(stored.last_message_sender_id, Some(1));
        assert!(stored.last_activity_at >= msg.created_at);
    }

    #[tokio::test]
    async fn test_sequences_increase_and_paging_is_chronological() {
        let store = InMemoryStore::new();
        let conv = store.create_individual(1, 2).await.unwrap();
        for i in 0..5 {
            store
                .append_message(conv.id, 1, SendMessage::text(format!("m{}", i)))
                .await
                .unwrap();
        }

        let page = store.list_messages(conv.id, None, 2).await.unwrap();
        let contents: Vec<&str> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4"]);

        let older = store
            .list_messages(conv.id, Some(page[0].sequence), 10)
            .await
            .unwrap();
        assert_eq!(older.len(), 3);
        assert!(older.windows(2).all(|w| w[0].sequence < w[1].sequence));
    }

    #[tokio::test]
    async fn test_cursor_never_moves_backward() {
        let store = InMemoryStore::new();
        let conv = store.create_individual(1, 2).await.unwrap();
        let later = Utc::now() + chrono::Duration::minutes(5);
        let earlier = later - chrono::Duration::minutes(10);

        store.advance_read_cursor(conv.id, 2, later).await.unwrap();
        let stored = store.advance_read_cursor(conv.id, 2, earlier).await.unwrap();
        assert_eq!(stored, later);
    }

    #[tokio::test]
    async fn test_reactivation_keeps_cursor() {
        let store = InMemoryStore::new();
        let conv = store
            .create_group(
                1,
                NewGroup {
                    name: "study".into(),
                    member_ids: vec![2, 3],
                    ..NewGroup::default()
                },
            )
            .await
            .unwrap();
        let before = store.find_participant(conv.id, 2).await.unwrap().unwrap();

        store.deactivate_participant(conv.id, 2).await.unwrap();
        let after = store.add_participant(conv.id, 2).await.unwrap();

        assert!(after.is_active);
        assert_eq!(after.last_read_at, before.last_read_at);
        assert_eq!(store.list_participants(conv.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_list_for_user_orders_by_activity() {
        let store = InMemoryStore::new();
        let first = store.create_individual(1, 2).await.unwrap();
        let second = store.create_individual(1, 3).await.unwrap();

        store
            .append_message(first.id, 1, SendMessage::text("bump"))
            .await
            .unwrap();

        let list = store.list_conversations_for_user(1).await.unwrap();
        assert_eq!(list[0].id, first.id);
        assert_eq!(list[1].id, second.id);

        store.deactivate_participant(second.id, 1).await.unwrap();
        assert_eq!(store.list_conversations_for_user(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_reports_transient_failure() {
        let store = InMemoryStore::new();
        store.set_available(false);
        let err = store.find_conversation(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_room_counters_track_membership_and_messages() {
        let store = Arc::new(InMemoryStore::new());
        let room = store
            .create_room(ChatRoom::new(5, "Rust", Utc::now()))
            .await
            .unwrap();
        let token = room.room_token.clone();

        store.join_room(&token, 1).await.unwrap();
        let joined = store.join_room(&token, 1).await.unwrap();
        assert_eq!(joined.member_count, 1);

        let left = store.leave_room(&token, 2).await.unwrap();
        assert_eq!(left.member_count, 1);
        let left = store.leave_room(&token, 1).await.unwrap();
        assert_eq!(left.member_count, 0);
        let left = store.leave_room(&token, 1).await.unwrap();
        assert_eq!(left.member_count, 0);

        let msg = store
            .append_room_message(
                &token,
                1,
                NewRoomMessage {
                    content: "hello".into(),
                    ..NewRoomMessage::default()
                },
            )
            .await
            .unwrap();
        let room = store.find_room(&token).await.unwrap().unwrap();
        assert_eq!(room.message_count, 1);
        assert!(room.last_message_at.is_some());

        store.soft_delete_room_message(msg.id, 1).await.unwrap();
        let room = store.find_room(&token).await.unwrap().unwrap();
        assert_eq!(room.message_count, 0);
        assert!(store.recent_room_messages(&token, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_room_per_roadmap_is_unique() {
        let store = InMemoryStore::new();
        store
            .create_room(ChatRoom::new(9, "Go", Utc::now()))
            .await
            .unwrap();
        let err = store
            .create_room(ChatRoom::new(9, "Go", Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_room_reads_reject_unknown_token() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.recent_room_messages("missing", 10).await,
            Err(AppError::NotFound(Entity::Room))
        ));
        assert!(matches!(
            store.pinned_room_messages("missing").await,
            Err(AppError::NotFound(Entity::Room))
        ));
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_scoped() {
        let store = InMemoryStore::new();
        let a = store.create_individual(1, 2).await.unwrap();
        let b = store.create_individual(1, 3).await.unwrap();
        for text in ["Borrow checker", "lifetimes", "more BORROWING"] {
            store.append_message(a.id, 1, SendMessage::text(text)).await.unwrap();
        }
        store
            .append_message(b.id, 1, SendMessage::text("borrow elsewhere"))
            .await
            .unwrap();

        let hits = store.search_messages(a.id, "borrow", 50).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["Borrow checker", "more BORROWING"]);
        assert_eq!(store.search_messages(a.id, "borrow", 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_pins_are_idempotent_and_ordered() {
        let store = InMemoryStore::new();
        let c = store.create_individual(1, 2).await.unwrap();
        let first = store.append_message(c.id, 1, SendMessage::text("a")).await.unwrap();
        let second = store.append_message(c.id, 2, SendMessage::text("b")).await.unwrap();

        store.pin_message(c.id, second.id, 1).await.unwrap();
        store.pin_message(c.id, first.id, 2).await.unwrap();
        store.pin_message(c.id, second.id, 2).await.unwrap();
        let pinned: Vec<Uuid> = store
            .pinned_messages(c.id)
            .await
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(pinned, vec![second.id, first.id]);

        store.unpin_message(c.id, second.id).await.unwrap();
        store.unpin_message(c.id, second.id).await.unwrap();
        assert_eq!(store.pinned_messages(c.id).await.unwrap().len(), 1);

        let other = store.create_individual(3, 4).await.unwrap();
        assert!(matches!(
            store.pin_message(other.id, first.id, 3).await,
            Err(AppError::NotFound(Entity::Message))
        ));
    }

    #[tokio::test]
    async fn test_mute_flag_round_trips() {
        let store = InMemoryStore::new();
        let c = store.create_individual(1, 2).await.unwrap();
        assert!(store.set_participant_muted(c.id, 2, true).await.unwrap().is_muted);
        assert!(store.find_participant(c.id, 2).await.unwrap().unwrap().is_muted);
        assert!(!store.set_participant_muted(c.id, 2, false).await.unwrap().is_muted);
        assert!(matches!(
            store.set_participant_muted(c.id, 9, true).await,
            Err(AppError::NotFound(Entity::Participant))
        ));
    }
}
