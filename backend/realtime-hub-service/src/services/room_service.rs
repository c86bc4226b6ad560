//! Roadmap study rooms
//!
//! One room per roadmap, created on first use. Counters on the room row are
//! maintained by the store in the same unit as the membership or message
//! write that changes them.

use chrono::Utc;
use event_schema::{LiveEvent, LiveEventKind};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult, Entity};
use crate::metrics::MESSAGES_SENT;
use crate::models::{ChatRoom, NewRoomMessage, RoomMessage};
use crate::store::ChatStore;
use crate::websocket::{Broadcaster, Topic};

pub const RECENT_MESSAGES_LIMIT: i64 = 50;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomMessageDeleted {
    message_id: Uuid,
    room_token: String,
}

#[derive(Clone)]
pub struct RoomService {
    store: Arc<dyn ChatStore>,
    broadcaster: Broadcaster,
    max_retries: u32,
}

impl RoomService {
    pub fn new(store: Arc<dyn ChatStore>, broadcaster: Broadcaster, max_retries: u32) -> Self {
        Self {
            store,
            broadcaster,
            max_retries,
        }
    }

    pub async fn get_or_create(&self, roadmap_id: i64, roadmap_name: &str) -> AppResult<ChatRoom> {
        let roadmap_name = roadmap_name.trim();
        if roadmap_name.is_empty() {
            return Err(AppError::bad_request("roadmap name is required"));
        }
        if let Some(room) = self.store.find_room_by_roadmap(roadmap_id).await? {
            return Ok(room);
        }

        let room = ChatRoom::new(roadmap_id, roadmap_name, Utc::now());
        match self.store.create_room(room).await {
            Ok(room) => {
                tracing::info!(roadmap_id, room_token = %room.room_token, "study room created");
                return Ok(room);
            }
            Err(AppError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }

        for attempt in 1..=self.max_retries.max(1) {
            tracing::debug!(roadmap_id, attempt, "room create conflict, re-reading");
            if let Some(room) = self.store.find_room_by_roadmap(roadmap_id).await? {
                return Ok(room);
            }
        }
        Err(AppError::Internal(format!(
            "room for roadmap {roadmap_id} conflicts but cannot be read"
        )))
    }

    pub async fn get(&self, room_token: &str) -> AppResult<ChatRoom> {
        self.store
            .find_room(room_token)
            .await?
            .ok_or(AppError::NotFound(Entity::Room))
    }

    pub async fn join(&self, room_token: &str, user_id: i64) -> AppResult<ChatRoom> {
        let room = self.store.join_room(room_token, user_id).await?;
        tracing::debug!(room_token, user_id, members = room.member_count, "room joined");
        Ok(room)
    }

    pub async fn leave(&self, room_token: &str, user_id: i64) -> AppResult<ChatRoom> {
        let room = self.store.leave_room(room_token, user_id).await?;
        tracing::debug!(room_token, user_id, members = room.member_count, "room left");
        Ok(room)
    }

    pub async fn send(
        &self,
        room_token: &str,
        user_id: i64,
        input: NewRoomMessage,
    ) -> AppResult<RoomMessage> {
        if input.content.trim().is_empty() && input.attachment_url.is_none() {
            return Err(AppError::bad_request("message has no content"));
        }
        let room = self.get(room_token).await?;
        let message = self
            .store
            .append_room_message(room_token, user_id, input)
            .await?;
        MESSAGES_SENT.with_label_values(&["room"]).inc();

        let event = LiveEvent::new(LiveEventKind::RoomMessageCreated, room.id, user_id)
            .with_payload_of(&message);
        self.broadcaster
            .publish(&Topic::Room(room_token.to_string()), &event);
        Ok(message)
    }

    /// Latest messages, oldest first
    pub async fn recent(&self, room_token: &str) -> AppResult<Vec<RoomMessage>> {
        self.store
            .recent_room_messages(room_token, RECENT_MESSAGES_LIMIT)
            .await
    }

    pub async fn pin(&self, message_id: Uuid) -> AppResult<RoomMessage> {
        self.store.set_room_message_pinned(message_id, true).await
    }

    pub async fn unpin(&self, message_id: Uuid) -> AppResult<RoomMessage> {
        self.store.set_room_message_pinned(message_id, false).await
    }

    pub async fn pinned(&self, room_token: &str) -> AppResult<Vec<RoomMessage>> {
        self.get(room_token).await?;
        self.store.pinned_room_messages(room_token).await
    }

    /// Soft delete by the author
    pub async fn delete(&self, message_id: Uuid, user_id: i64) -> AppResult<RoomMessage> {
        let message = self
            .store
            .soft_delete_room_message(message_id, user_id)
            .await?;
        let room = self.get(&message.room_token).await?;
        tracing::info!(
            room_token = %message.room_token,
            message_id = %message_id,
            user_id,
            "room message deleted"
        );

        let event = LiveEvent::new(LiveEventKind::RoomMessageDeleted, room.id, user_id)
            .with_payload_of(&RoomMessageDeleted {
                message_id,
                room_token: message.room_token.clone(),
            });
        self.broadcaster
            .publish(&Topic::Room(message.room_token.clone()), &event);
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::websocket::TopicRegistry;

    fn service(store: Arc<InMemoryStore>) -> (RoomService, Arc<TopicRegistry>) {
        let registry = Arc::new(TopicRegistry::new(8));
        let broadcaster = Broadcaster::new(registry.clone(), 4);
        (RoomService::new(store, broadcaster, 1), registry)
    }

    fn text(content: &str) -> NewRoomMessage {
        NewRoomMessage {
            content: content.to_string(),
            ..NewRoomMessage::default()
        }
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (rooms, _) = service(Arc::new(InMemoryStore::new()));
        let first = rooms.get_or_create(12, "Rust Basics").await.unwrap();
        let second = rooms.get_or_create(12, "Rust Basics").await.unwrap();
        assert_eq!(first.room_token, second.room_token);
    }

    #[tokio::test]
    async fn test_membership_counter_never_negative() {
        let (rooms, _) = service(Arc::new(InMemoryStore::new()));
        let room = rooms.get_or_create(1, "Go").await.unwrap();

        assert_eq!(rooms.join(&room.room_token, 5).await.unwrap().member_count, 1);
        assert_eq!(rooms.join(&room.room_token, 5).await.unwrap().member_count, 1);
        assert_eq!(rooms.leave(&room.room_token, 5).await.unwrap().member_count, 0);
        assert_eq!(rooms.leave(&room.room_token, 5).await.unwrap().member_count, 0);
    }

    #[tokio::test]
    async fn test_send_counts_and_publishes() {
        let (rooms, registry) = service(Arc::new(InMemoryStore::new()));
        let room = rooms.get_or_create(1, "Go").await.unwrap();
        let (conn, mut rx) = registry.connect(8);
        registry.subscribe(conn, Topic::Room(room.room_token.clone()));

        rooms.send(&room.room_token, 7, text("hello room")).await.unwrap();

        let updated = rooms.get(&room.room_token).await.unwrap();
        assert_eq!(updated.message_count, 1);
        assert!(updated.last_message_at.is_some());

        let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["event"]["eventType"], "ROOM_MESSAGE_CREATED");
        assert_eq!(frame["event"]["payload"]["content"], "hello room");
    }

    #[tokio::test]
    async fn test_delete_is_author_only() {
        let (rooms, _) = service(Arc::new(InMemoryStore::new()));
        let room = rooms.get_or_create(1, "Go").await.unwrap();
        let message = rooms.send(&room.room_token, 7, text("oops")).await.unwrap();

        assert!(matches!(
            rooms.delete(message.id, 8).await,
            Err(AppError::Forbidden(_))
        ));
        let deleted = rooms.delete(message.id, 7).await.unwrap();
        assert!(deleted.is_deleted);

        assert!(rooms.recent(&room.room_token).await.unwrap().is_empty());
        assert_eq!(rooms.get(&room.room_token).await.unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn test_pin_and_list() {
        let (rooms, _) = service(Arc::new(InMemoryStore::new()));
        let room = rooms.get_or_create(1, "Go").await.unwrap();
        let keep = rooms.send(&room.room_token, 7, text("rules")).await.unwrap();
        rooms.send(&room.room_token, 7, text("chatter")).await.unwrap();

        rooms.pin(keep.id).await.unwrap();
        let pinned = rooms.pinned(&room.room_token).await.unwrap();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].id, keep.id);

        rooms.unpin(keep.id).await.unwrap();
        assert!(rooms.pinned(&room.room_token).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_room() {
        let (rooms, _) = service(Arc::new(InMemoryStore::new()));
        assert_eq!(
            rooms.send("missing", 1, text("x")).await.unwrap_err(),
            AppError::NotFound(Entity::Room)
        );
    }
}
