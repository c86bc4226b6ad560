use event_schema::{LiveEvent, LiveEventKind};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult, Entity};
use crate::models::{
    Conversation, ConversationFilter, ConversationSummary, NewGroup, Participant,
};
use crate::services::message_service::ConversationNotice;
use crate::store::ChatStore;
use crate::websocket::{Broadcaster, Topic};

#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetails {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub participants: Vec<Participant>,
}

#[derive(Clone)]
pub struct ConversationService {
    store: Arc<dyn ChatStore>,
    broadcaster: Broadcaster,
}

impl ConversationService {
    pub fn new(store: Arc<dyn ChatStore>, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    /// The caller's active conversations, most recent activity first
    pub async fn list(
        &self,
        user_id: i64,
        filter: ConversationFilter,
    ) -> AppResult<Vec<ConversationSummary>> {
        let conversations = self.store.list_conversations_for_user(user_id).await?;
        let mut summaries = Vec::new();
        for conversation in conversations
            .into_iter()
            .filter(|c| filter.matches(c.kind))
        {
            let participant_ids = self
                .store
                .list_participants(conversation.id)
                .await?
                .into_iter()
                .filter(|p| p.is_active)
                .map(|p| p.user_id)
                .collect();
            let unread_count = self.store.count_unread(conversation.id, user_id).await?;
            summaries.push(ConversationSummary {
                conversation,
                participant_ids,
                unread_count,
            });
        }
        Ok(summaries)
    }

    pub async fn get(&self, conversation_id: Uuid, user_id: i64) -> AppResult<ConversationDetails> {
        let conversation = self.require_conversation(conversation_id).await?;
        let participants = self.store.list_participants(conversation_id).await?;
        if !participants.iter().any(|p| p.user_id == user_id && p.is_active) {
            return Err(AppError::forbidden("not a participant of this conversation"));
        }
        Ok(ConversationDetails {
            conversation,
            participants,
        })
    }

    pub async fn create_group(&self, creator_id: i64, mut group: NewGroup) -> AppResult<Conversation> {
        group.name = group.name.trim().to_string();
        if group.name.is_empty() {
            return Err(AppError::bad_request("group name is required"));
        }
        let members: BTreeSet<i64> = group
            .member_ids
            .iter()
            .copied()
            .filter(|id| *id != creator_id)
            .collect();
        group.member_ids = members.into_iter().collect();

        let conversation = self.store.create_group(creator_id, group.clone()).await?;
        tracing::info!(
            conversation_id = %conversation.id,
            user_id = creator_id,
            members = group.member_ids.len(),
            "group conversation created"
        );

        for member in &group.member_ids {
            self.notify(&conversation, creator_id, *member);
        }
        Ok(conversation)
    }

    /// Add (or re-add) `user_id` to a group. The actor must be an active member.
    pub async fn add_participant(
        &self,
        conversation_id: Uuid,
        actor_id: i64,
        user_id: i64,
    ) -> AppResult<Participant> {
        let conversation = self.require_conversation(conversation_id).await?;
        conversation.require_group()?;
        self.require_active(conversation_id, actor_id).await?;

        let participant = self.store.add_participant(conversation_id, user_id).await?;
        tracing::info!(
            conversation_id = %conversation_id,
            user_id,
            actor_id,
            "participant added"
        );
        self.notify(&conversation, actor_id, user_id);
        Ok(participant)
    }

    /// Members may remove themselves or, in a group, another member
    pub async fn remove_participant(
        &self,
        conversation_id: Uuid,
        actor_id: i64,
        user_id: i64,
    ) -> AppResult<()> {
        let conversation = self.require_conversation(conversation_id).await?;
        if actor_id != user_id {
            conversation.require_group()?;
        }
        self.require_active(conversation_id, actor_id).await?;

        self.store
            .deactivate_participant(conversation_id, user_id)
            .await?;
        tracing::info!(
            conversation_id = %conversation_id,
            user_id,
            actor_id,
            "participant deactivated"
        );

        // Open sockets of the removed user stop receiving this conversation
        self.broadcaster
            .registry()
            .evict_user(user_id, &Topic::Conversation(conversation_id));
        Ok(())
    }

    /// Muting suppresses inbox notices for this conversation only
    pub async fn set_muted(
        &self,
        conversation_id: Uuid,
        user_id: i64,
        muted: bool,
    ) -> AppResult<Participant> {
        self.require_conversation(conversation_id).await?;
        self.require_active(conversation_id, user_id).await?;
        let participant = self
            .store
            .set_participant_muted(conversation_id, user_id, muted)
            .await?;
        tracing::info!(conversation_id = %conversation_id, user_id, muted, "mute updated");
        Ok(participant)
    }

    async fn require_conversation(&self, conversation_id: Uuid) -> AppResult<Conversation> {
        self.store
            .find_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound(Entity::Conversation))
    }

    async fn require_active(&self, conversation_id: Uuid, user_id: i64) -> AppResult<()> {
        match self.store.find_participant(conversation_id, user_id).await? {
            Some(p) if p.is_active => Ok(()),
            _ => Err(AppError::forbidden("not a participant of this conversation")),
        }
    }

    fn notify(&self, conversation: &Conversation, actor_id: i64, recipient_id: i64) {
        let notice = ConversationNotice {
            conversation_id: conversation.id,
            last_message: conversation.last_message.clone(),
            last_message_sender_id: conversation.last_message_sender_id,
            last_activity_at: conversation.last_activity_at,
            unread_count: None,
        };
        let event = LiveEvent::new(LiveEventKind::ConversationUpdated, conversation.id, actor_id)
            .with_payload_of(&notice);
        self.broadcaster.publish(&Topic::User(recipient_id), &event);
    }
}
