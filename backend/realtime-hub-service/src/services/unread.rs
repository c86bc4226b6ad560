use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult, Entity};
use crate::models::{DeliveryStatus, Message, Participant};
use crate::store::ChatStore;

#[derive(Debug, Clone, Serialize)]
pub struct ConversationUnread {
    pub conversation_id: Uuid,
    pub unread_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnreadSummary {
    pub total: i64,
    pub conversations: Vec<ConversationUnread>,
}

/// Read cursors and the unread counts derived from them
#[derive(Clone)]
pub struct UnreadTracker {
    store: Arc<dyn ChatStore>,
}

impl UnreadTracker {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn unread_count(&self, conversation_id: Uuid, user_id: i64) -> AppResult<i64> {
        self.store.count_unread(conversation_id, user_id).await
    }

    /// Mark everything up to now as read, including a latest message whose
    /// timestamp was nudged past the wall clock
    pub async fn mark_read(&self, conversation_id: Uuid, user_id: i64) -> AppResult<DateTime<Utc>> {
        let ceiling = self.read_ceiling(conversation_id).await?;
        self.advance(conversation_id, user_id, ceiling).await
    }

    /// Advance the cursor to `at`. A timestamp older than the current cursor
    /// leaves it unchanged and one beyond the newest activity is capped there,
    /// so a cursor can never hide messages that have not been sent yet. The
    /// stored cursor is returned either way.
    pub async fn mark_read_at(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>> {
        let ceiling = self.read_ceiling(conversation_id).await?;
        self.advance(conversation_id, user_id, at.min(ceiling)).await
    }

    async fn read_ceiling(&self, conversation_id: Uuid) -> AppResult<DateTime<Utc>> {
        let conversation = self
            .store
            .find_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound(Entity::Conversation))?;
        Ok(Utc::now().max(conversation.last_activity_at))
    }

    async fn advance(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<DateTime<Utc>> {
        let cursor = self
            .store
            .advance_read_cursor(conversation_id, user_id, at)
            .await?;
        tracing::debug!(
            conversation_id = %conversation_id,
            user_id,
            cursor = %cursor,
            "read cursor advanced"
        );
        Ok(cursor)
    }

    pub async fn unread_summary(&self, user_id: i64) -> AppResult<UnreadSummary> {
        let conversations = self.store.list_conversations_for_user(user_id).await?;
        let mut summary = UnreadSummary {
            total: 0,
            conversations: Vec::with_capacity(conversations.len()),
        };
        for conversation in conversations {
            let unread_count = self.store.count_unread(conversation.id, user_id).await?;
            summary.total += unread_count;
            summary.conversations.push(ConversationUnread {
                conversation_id: conversation.id,
                unread_count,
            });
        }
        Ok(summary)
    }
}

/// Status of `message` as seen from its conversation's read cursors
///
/// `Read` once every other active participant has read it, `Delivered` once
/// at least one has, `Sent` otherwise.
pub fn delivery_status(message: &Message, participants: &[Participant]) -> DeliveryStatus {
    let (readers, total) = participants
        .iter()
        .filter(|p| p.is_active && p.user_id != message.sender_id)
        .fold((0usize, 0usize), |(readers, total), p| {
            let has_read = p.last_read_at >= message.created_at;
            (readers + usize::from(has_read), total + 1)
        });

    match (readers, total) {
        (0, _) => DeliveryStatus::Sent,
        (r, t) if r == t => DeliveryStatus::Read,
        _ => DeliveryStatus::Delivered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageKind, SendMessage};
    use crate::store::InMemoryStore;
    use chrono::Duration;

    fn message_at(sender_id: i64, created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id,
            sender_name: None,
            content: "hi".into(),
            kind: MessageKind::Text,
            attachments: vec![],
            created_at,
            sequence: 1,
        }
    }

    fn reader(user_id: i64, last_read_at: DateTime<Utc>) -> Participant {
        Participant {
            last_read_at,
            ..Participant::new(Uuid::new_v4(), user_id, last_read_at)
        }
    }

    #[test]
    fn test_delivery_status_progression() {
        let t = Utc::now();
        let msg = message_at(1, t);
        let before = t - Duration::seconds(1);
        let after = t + Duration::seconds(1);

        let sender = reader(1, after);
        assert_eq!(
            delivery_status(&msg, &[sender.clone(), reader(2, before), reader(3, before)]),
            DeliveryStatus::Sent
        );
        assert_eq!(
            delivery_status(&msg, &[sender.clone(), reader(2, after), reader(3, before)]),
            DeliveryStatus::Delivered
        );
        assert_eq!(
            delivery_status(&msg, &[sender, reader(2, after), reader(3, t)]),
            DeliveryStatus::Read
        );
    }

    #[test]
    fn test_inactive_participants_ignored() {
        let t = Utc::now();
        let msg = message_at(1, t);
        let mut gone = reader(3, t - Duration::seconds(5));
        gone.is_active = false;

        assert_eq!(
            delivery_status(&msg, &[reader(2, t), gone]),
            DeliveryStatus::Read
        );
    }

    #[tokio::test]
    async fn test_mark_read_is_monotonic() {
        let store = Arc::new(InMemoryStore::new());
        let conversation = store.create_individual(1, 2).await.unwrap();
        let tracker = UnreadTracker::new(store.clone());

        let cursor = tracker.mark_read(conversation.id, 2).await.unwrap();
        let earlier = cursor - Duration::seconds(30);
        let kept = tracker.mark_read_at(conversation.id, 2, earlier).await.unwrap();
        assert_eq!(kept, cursor);
    }

    #[tokio::test]
    async fn test_future_cursor_is_capped_at_latest_activity() {
        let store = Arc::new(InMemoryStore::new());
        let conversation = store.create_individual(1, 2).await.unwrap();
        let tracker = UnreadTracker::new(store.clone());

        let far_future = Utc::now() + Duration::days(365 * 100);
        let cursor = tracker
            .mark_read_at(conversation.id, 2, far_future)
            .await
            .unwrap();
        assert!(cursor < far_future);
        assert!(cursor <= Utc::now());

        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        store
            .append_message(conversation.id, 1, SendMessage::text("new"))
            .await
            .unwrap();
        assert_eq!(tracker.unread_count(conversation.id, 2).await.unwrap(), 1);

        assert_eq!(
            tracker
                .mark_read_at(Uuid::new_v4(), 2, far_future)
                .await
                .unwrap_err(),
            AppError::NotFound(Entity::Conversation)
        );
    }

    #[tokio::test]
    async fn test_summary_totals_per_conversation() {
        let store = Arc::new(InMemoryStore::new());
        let a = store.create_individual(1, 2).await.unwrap();
        let b = store.create_individual(1, 3).await.unwrap();
        store.append_message(a.id, 2, SendMessage::text("one")).await.unwrap();
        store.append_message(a.id, 2, SendMessage::text("two")).await.unwrap();
        store.append_message(b.id, 3, SendMessage::text("three")).await.unwrap();
        store.append_message(b.id, 1, SendMessage::text("mine")).await.unwrap();

        let tracker = UnreadTracker::new(store);
        let summary = tracker.unread_summary(1).await.unwrap();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.conversations.len(), 2);
    }
}
