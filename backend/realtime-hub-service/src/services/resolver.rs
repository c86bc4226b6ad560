use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::models::{normalize_pair, Conversation};
use crate::store::ChatStore;

/// Finds or creates the one individual conversation of a user pair
#[derive(Clone)]
pub struct ConversationResolver {
    store: Arc<dyn ChatStore>,
    max_retries: u32,
}

impl ConversationResolver {
    pub fn new(store: Arc<dyn ChatStore>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    /// Same result for `(a, b)` and `(b, a)`. Concurrent callers racing on a
    /// new pair all get the conversation that won the insert.
    pub async fn resolve_individual(&self, a: i64, b: i64) -> AppResult<Conversation> {
        if a == b {
            return Err(AppError::bad_request(
                "cannot open a conversation with yourself",
            ));
        }
        let (low, high) = normalize_pair(a, b);

        if let Some(existing) = self.store.find_individual(low, high).await? {
            self.reactivate(&existing, low, high).await?;
            return Ok(existing);
        }

        match self.store.create_individual(low, high).await {
            Ok(created) => {
                tracing::info!(
                    conversation_id = %created.id,
                    user_low = low,
                    user_high = high,
                    "individual conversation created"
                );
                return Ok(created);
            }
            Err(AppError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }

        // Lost the insert race: the winner's row is there to read
        for attempt in 1..=self.max_retries.max(1) {
            tracing::debug!(user_low = low, user_high = high, attempt, "resolve conflict, re-reading");
            if let Some(existing) = self.store.find_individual(low, high).await? {
                self.reactivate(&existing, low, high).await?;
                return Ok(existing);
            }
            match self.store.create_individual(low, high).await {
                Ok(created) => return Ok(created),
                Err(AppError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }

        tracing::error!(user_low = low, user_high = high, "individual conversation unresolvable");
        Err(AppError::Internal(format!(
            "individual conversation for ({low}, {high}) conflicts but cannot be read"
        )))
    }

    async fn reactivate(&self, conversation: &Conversation, low: i64, high: i64) -> AppResult<()> {
        let participants = self.store.list_participants(conversation.id).await?;
        for user_id in [low, high] {
            let active = participants
                .iter()
                .any(|p| p.user_id == user_id && p.is_active);
            if !active {
                self.store.add_participant(conversation.id, user_id).await?;
                tracing::info!(
                    conversation_id = %conversation.id,
                    user_id,
                    "participant reactivated"
                );
            }
        }
        Ok(())
    }
}
