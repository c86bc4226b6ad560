//! # Message Dispatcher
//!
//! Persists a chat message and fans it out once the store has committed it:
//! the full message on `conversation:{id}` and an inbox notice on `user:{id}`
//! for every other active participant. Publishing is best effort; a message
//! that was stored is reported as sent even if nobody is listening.

use chrono::{DateTime, Utc};
use event_schema::{LiveEvent, LiveEventKind};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult, Entity};
use crate::metrics::MESSAGES_SENT;
use crate::models::{ChatMessagePayload, Message, MessageView, Participant, SendMessage};
use crate::services::resolver::ConversationResolver;
use crate::services::unread::delivery_status;
use crate::store::ChatStore;
use crate::websocket::{Broadcaster, Topic};

/// Payload of `CONVERSATION_UPDATED` inbox notices
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationNotice {
    pub conversation_id: Uuid,
    pub last_message: Option<String>,
    pub last_message_sender_id: Option<i64>,
    pub last_activity_at: DateTime<Utc>,
    /// Recipient's unread count after this change, when it could be read
    pub unread_count: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub messages: Vec<MessageView>,
    /// Pass as `before` to fetch the next older page
    pub next_before: Option<i64>,
}

#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn ChatStore>,
    resolver: ConversationResolver,
    broadcaster: Broadcaster,
    page_limit: i64,
}

impl MessageService {
    pub fn new(
        store: Arc<dyn ChatStore>,
        resolver: ConversationResolver,
        broadcaster: Broadcaster,
        page_limit: i64,
    ) -> Self {
        Self {
            store,
            resolver,
            broadcaster,
            page_limit: page_limit.max(1),
        }
    }

    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender_id: i64,
        input: SendMessage,
    ) -> AppResult<Message> {
        if input.is_empty() {
            return Err(AppError::bad_request("message has no content"));
        }

        let message = self
            .store
            .append_message(conversation_id, sender_id, input)
            .await?;
        MESSAGES_SENT.with_label_values(&["conversation"]).inc();
        tracing::info!(
            conversation_id = %conversation_id,
            user_id = sender_id,
            message_id = %message.id,
            sequence = message.sequence,
            "message stored"
        );

        self.fan_out(&message).await;
        Ok(message)
    }

    /// Send to a user directly, opening the individual conversation on first
    /// contact
    pub async fn send_to_user(
        &self,
        sender_id: i64,
        recipient_id: i64,
        input: SendMessage,
    ) -> AppResult<Message> {
        if input.is_empty() {
            return Err(AppError::bad_request("message has no content"));
        }
        let conversation = self
            .resolver
            .resolve_individual(sender_id, recipient_id)
            .await?;
        self.send(conversation.id, sender_id, input).await
    }

    /// Page of messages ending before sequence `before`, oldest first, each
    /// with its status relative to the viewer
    pub async fn history(
        &self,
        conversation_id: Uuid,
        viewer_id: i64,
        before: Option<i64>,
        limit: Option<i64>,
    ) -> AppResult<HistoryPage> {
        let participants = self.participants_for(conversation_id, viewer_id).await?;

        let limit = limit.unwrap_or(self.page_limit).clamp(1, self.page_limit);
        let messages = self
            .store
            .list_messages(conversation_id, before, limit)
            .await?;

        let next_before = if messages.len() as i64 == limit {
            messages.first().map(|m| m.sequence)
        } else {
            None
        };
        let messages = messages
            .into_iter()
            .map(|message| MessageView {
                status: delivery_status(&message, &participants),
                is_from_me: message.sender_id == viewer_id,
                message,
            })
            .collect();

        Ok(HistoryPage {
            messages,
            next_before,
        })
    }

    /// Case-insensitive substring search over one conversation, oldest first
    pub async fn search(
        &self,
        conversation_id: Uuid,
        viewer_id: i64,
        keyword: &str,
    ) -> AppResult<Vec<Message>> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(AppError::bad_request("search keyword is empty"));
        }
        self.participants_for(conversation_id, viewer_id).await?;
        self.store
            .search_messages(conversation_id, keyword, self.page_limit)
            .await
    }

    pub async fn pin(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        message_id: Uuid,
    ) -> AppResult<Message> {
        self.participants_for(conversation_id, user_id).await?;
        let message = self
            .store
            .pin_message(conversation_id, message_id, user_id)
            .await?;
        tracing::info!(
            conversation_id = %conversation_id,
            user_id,
            message_id = %message_id,
            "message pinned"
        );
        Ok(message)
    }

    pub async fn unpin(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        message_id: Uuid,
    ) -> AppResult<()> {
        self.participants_for(conversation_id, user_id).await?;
        self.store.unpin_message(conversation_id, message_id).await
    }

    /// Pinned messages in the order they were pinned
    pub async fn pinned(&self, conversation_id: Uuid, viewer_id: i64) -> AppResult<Vec<Message>> {
        self.participants_for(conversation_id, viewer_id).await?;
        self.store.pinned_messages(conversation_id).await
    }

    /// Participants of the conversation, provided the viewer is an active one
    async fn participants_for(
        &self,
        conversation_id: Uuid,
        viewer_id: i64,
    ) -> AppResult<Vec<Participant>> {
        self.store
            .find_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound(Entity::Conversation))?;
        let participants = self.store.list_participants(conversation_id).await?;
        let is_member = participants
            .iter()
            .any(|p| p.user_id == viewer_id && p.is_active);
        if !is_member {
            return Err(AppError::forbidden("not a participant of this conversation"));
        }
        Ok(participants)
    }

    async fn fan_out(&self, message: &Message) {
        let event = LiveEvent::new(
            LiveEventKind::ChatMessageCreated,
            message.conversation_id,
            message.sender_id,
        )
        .with_payload_of(&ChatMessagePayload::from(message));
        self.broadcaster
            .publish(&Topic::Conversation(message.conversation_id), &event);

        let participants = match self.store.list_participants(message.conversation_id).await {
            Ok(participants) => participants,
            Err(e) => {
                tracing::warn!(
                    conversation_id = %message.conversation_id,
                    error = %e,
                    "skipping inbox notices: participants unavailable"
                );
                return;
            }
        };

        for recipient in participants
            .iter()
            .filter(|p| p.is_active && !p.is_muted && p.user_id != message.sender_id)
        {
            let unread_count = self
                .store
                .count_unread(message.conversation_id, recipient.user_id)
                .await
                .ok();
            let notice = ConversationNotice {
                conversation_id: message.conversation_id,
                last_message: Some(message.content.clone()),
                last_message_sender_id: Some(message.sender_id),
                last_activity_at: message.created_at,
                unread_count,
            };
            let event = LiveEvent::new(
                LiveEventKind::ConversationUpdated,
                message.conversation_id,
                message.sender_id,
            )
            .with_payload_of(&notice);
            self.broadcaster
                .publish(&Topic::User(recipient.user_id), &event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeliveryStatus;
    use crate::store::InMemoryStore;
    use crate::websocket::TopicRegistry;

    fn service(store: Arc<InMemoryStore>) -> (MessageService, Arc<TopicRegistry>) {
        let registry = Arc::new(TopicRegistry::new(16));
        let broadcaster = Broadcaster::new(registry.clone(), 4);
        let resolver = ConversationResolver::new(store.clone(), 1);
        (
            MessageService::new(store, resolver, broadcaster, 50),
            registry,
        )
    }

    #[tokio::test]
    async fn test_send_bumps_recipient_unread_only() {
        let store = Arc::new(InMemoryStore::new());
        let (messages, _) = service(store.clone());
        let conversation = store.create_individual(1, 2).await.unwrap();

        let before_sender = store.count_unread(conversation.id, 1).await.unwrap();
        let before_recipient = store.count_unread(conversation.id, 2).await.unwrap();
        messages
            .send(conversation.id, 1, SendMessage::text("hello"))
            .await
            .unwrap();

        assert_eq!(store.count_unread(conversation.id, 1).await.unwrap(), before_sender);
        assert_eq!(
            store.count_unread(conversation.id, 2).await.unwrap(),
            before_recipient + 1
        );
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let (messages, _) = service(store.clone());
        let conversation = store.create_individual(1, 2).await.unwrap();

        let err = messages
            .send(conversation.id, 1, SendMessage::text("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_non_participant_forbidden() {
        let store = Arc::new(InMemoryStore::new());
        let (messages, _) = service(store.clone());
        let conversation = store.create_individual(1, 2).await.unwrap();

        let err = messages
            .send(conversation.id, 3, SendMessage::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err = messages
            .send(Uuid::new_v4(), 1, SendMessage::text("hi"))
            .await
            .unwrap_err();
        assert_eq!(err, AppError::NotFound(Entity::Conversation));
    }

    #[tokio::test]
    async fn test_fan_out_topics() {
        let store = Arc::new(InMemoryStore::new());
        let (messages, registry) = service(store.clone());
        let conversation = store.create_individual(1, 2).await.unwrap();

        let (watcher, mut conv_rx) = registry.connect(1);
        registry.subscribe(watcher, Topic::Conversation(conversation.id));
        let (inbox, mut inbox_rx) = registry.connect(2);
        registry.subscribe(inbox, Topic::User(2));
        let (own_inbox, mut own_rx) = registry.connect(1);
        registry.subscribe(own_inbox, Topic::User(1));

        messages
            .send(conversation.id, 1, SendMessage::text("hello"))
            .await
            .unwrap();

        let frame: serde_json::Value =
            serde_json::from_str(&conv_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["event"]["eventType"], "CHAT_MESSAGE_CREATED");
        assert_eq!(frame["event"]["payload"]["content"], "hello");

        let notice: serde_json::Value =
            serde_json::from_str(&inbox_rx.recv().await.unwrap()).unwrap();
        assert_eq!(notice["event"]["eventType"], "CONVERSATION_UPDATED");
        assert_eq!(notice["event"]["payload"]["unreadCount"], 1);

        assert!(own_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_to_user_opens_conversation_once() {
        let store = Arc::new(InMemoryStore::new());
        let (messages, _) = service(store.clone());

        let first = messages
            .send_to_user(1, 2, SendMessage::text("hi"))
            .await
            .unwrap();
        let second = messages
            .send_to_user(2, 1, SendMessage::text("hey"))
            .await
            .unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(store.individual_count(1, 2).await, 1);
    }

    #[tokio::test]
    async fn test_history_status_and_paging() {
        let store = Arc::new(InMemoryStore::new());
        let (messages, _) = service(store.clone());
        let conversation = store.create_individual(1, 2).await.unwrap();
        for n in 0..3 {
            messages
                .send(conversation.id, 1, SendMessage::text(format!("m{n}")))
                .await
                .unwrap();
        }

        let page = messages
            .history(conversation.id, 1, None, Some(2))
            .await
            .unwrap();
        assert_eq!(page.messages.len(), 2);
        assert_eq!(page.messages[0].message.content, "m1");
        assert!(page.messages.iter().all(|v| v.is_from_me));
        assert!(page.messages.iter().all(|v| v.status == DeliveryStatus::Sent));

        let older = messages
            .history(conversation.id, 1, page.next_before, Some(2))
            .await
            .unwrap();
        assert_eq!(older.messages.len(), 1);
        assert_eq!(older.messages[0].message.content, "m0");
        assert_eq!(older.next_before, None);

        store
            .advance_read_cursor(conversation.id, 2, Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        let seen = messages
            .history(conversation.id, 2, None, None)
            .await
            .unwrap();
        assert!(seen.messages.iter().all(|v| v.status == DeliveryStatus::Read));
        assert!(seen.messages.iter().all(|v| !v.is_from_me));
    }

    #[tokio::test]
    async fn test_muted_recipient_skips_notice_but_counts_unread() {
        let store = Arc::new(InMemoryStore::new());
        let (messages, registry) = service(store.clone());
        let conversation = store.create_individual(1, 2).await.unwrap();
        store
            .set_participant_muted(conversation.id, 2, true)
            .await
            .unwrap();

        let (inbox, mut inbox_rx) = registry.connect(2);
        registry.subscribe(inbox, Topic::User(2));
        let (watcher, mut conv_rx) = registry.connect(2);
        registry.subscribe(watcher, Topic::Conversation(conversation.id));

        messages
            .send(conversation.id, 1, SendMessage::text("quiet please"))
            .await
            .unwrap();

        assert!(inbox_rx.try_recv().is_err());
        assert!(conv_rx.try_recv().is_ok());
        assert_eq!(store.count_unread(conversation.id, 2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_search_requires_membership_and_keyword() {
        let store = Arc::new(InMemoryStore::new());
        let (messages, _) = service(store.clone());
        let conversation = store.create_individual(1, 2).await.unwrap();
        for content in ["Borrow checker", "lifetimes", "the BORROW rules"] {
            messages
                .send(conversation.id, 1, SendMessage::text(content))
                .await
                .unwrap();
        }

        let found = messages.search(conversation.id, 2, " borrow ").await.unwrap();
        let contents: Vec<_> = found.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["Borrow checker", "the BORROW rules"]);

        let err = messages.search(conversation.id, 2, "   ").await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let err = messages.search(conversation.id, 3, "borrow").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_pin_flow_for_participants() {
        let store = Arc::new(InMemoryStore::new());
        let (messages, _) = service(store.clone());
        let conversation = store.create_individual(1, 2).await.unwrap();
        let first = messages
            .send(conversation.id, 1, SendMessage::text("exam on friday"))
            .await
            .unwrap();
        let second = messages
            .send(conversation.id, 2, SendMessage::text("room 4b"))
            .await
            .unwrap();

        messages.pin(conversation.id, 2, second.id).await.unwrap();
        messages.pin(conversation.id, 1, first.id).await.unwrap();
        let pinned = messages.pinned(conversation.id, 1).await.unwrap();
        let ids: Vec<_> = pinned.iter().map(|m| m.id).collect();
        assert_eq!(ids, [second.id, first.id]);

        let err = messages.pin(conversation.id, 3, first.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        let err = messages
            .pin(conversation.id, 1, Uuid::new_v4())
            .await
            .unwrap_err();
        assert_eq!(err, AppError::NotFound(Entity::Message));

        messages.unpin(conversation.id, 1, second.id).await.unwrap();
        let pinned = messages.pinned(conversation.id, 2).await.unwrap();
        assert_eq!(pinned.len(), 1);
        assert_eq!(pinned[0].id, first.id);
    }
}
