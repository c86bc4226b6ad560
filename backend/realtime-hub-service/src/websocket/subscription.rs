use std::sync::Arc;

use super::topics::{Endpoint, Topic};
use crate::error::{AppError, AppResult};
use crate::store::ChatStore;

/// Decides whether a user may subscribe to a topic
///
/// Private topics (`conversation:*`, `user:*`) are checked against the store;
/// Q&A and study-room topics are open to any authenticated user.
#[derive(Clone)]
pub struct SubscriptionAuthorizer {
    store: Arc<dyn ChatStore>,
}

impl SubscriptionAuthorizer {
    pub fn new(store: Arc<dyn ChatStore>) -> Self {
        Self { store }
    }

    pub async fn authorize(&self, user_id: i64, endpoint: Endpoint, topic: &Topic) -> AppResult<()> {
        if !topic.accepted_on(endpoint) {
            return Err(AppError::forbidden(format!(
                "topic {topic} is not served on this endpoint"
            )));
        }

        match topic {
            Topic::Conversation(conversation_id) => {
                let participant = self.store.find_participant(*conversation_id, user_id).await?;
                match participant {
                    Some(p) if p.is_active => Ok(()),
                    _ => {
                        tracing::debug!(
                            user_id,
                            conversation_id = %conversation_id,
                            "subscription refused: not an active participant"
                        );
                        Err(AppError::forbidden("not a participant of this conversation"))
                    }
                }
            }
            Topic::User(owner) if *owner == user_id => Ok(()),
            Topic::User(_) => Err(AppError::forbidden("cannot subscribe to another user's inbox")),
            Topic::QaQuestion(_)
            | Topic::QaAnswer(_)
            | Topic::QaCourse(_)
            | Topic::QaNewQuestions
            | Topic::Room(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_conversation_topic_requires_active_participant() {
        let store = Arc::new(InMemoryStore::new());
        let conversation = store.create_individual(1, 2).await.unwrap();
        let authorizer = SubscriptionAuthorizer::new(store.clone());
        let topic = Topic::Conversation(conversation.id);

        assert!(authorizer.authorize(1, Endpoint::Chat, &topic).await.is_ok());
        assert!(matches!(
            authorizer.authorize(3, Endpoint::Chat, &topic).await,
            Err(AppError::Forbidden(_))
        ));

        store.deactivate_participant(conversation.id, 2).await.unwrap();
        assert!(authorizer.authorize(2, Endpoint::Chat, &topic).await.is_err());
    }

    #[tokio::test]
    async fn test_user_topic_is_private() {
        let authorizer = SubscriptionAuthorizer::new(Arc::new(InMemoryStore::new()));
        assert!(authorizer.authorize(5, Endpoint::Chat, &Topic::User(5)).await.is_ok());
        assert!(authorizer.authorize(5, Endpoint::Chat, &Topic::User(6)).await.is_err());
    }

    #[tokio::test]
    async fn test_endpoint_family_enforced() {
        let authorizer = SubscriptionAuthorizer::new(Arc::new(InMemoryStore::new()));
        assert!(authorizer
            .authorize(1, Endpoint::Qa, &Topic::QaQuestion(42))
            .await
            .is_ok());
        assert!(authorizer
            .authorize(1, Endpoint::Chat, &Topic::QaQuestion(42))
            .await
            .is_err());
        assert!(authorizer
            .authorize(1, Endpoint::Qa, &Topic::User(1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_store_outage_surfaces() {
        let store = Arc::new(InMemoryStore::new());
        store.set_available(false);
        let authorizer = SubscriptionAuthorizer::new(store);
        let result = authorizer
            .authorize(1, Endpoint::Chat, &Topic::Conversation(uuid::Uuid::new_v4()))
            .await;
        assert!(matches!(result, Err(AppError::TransientStore(_))));
    }
}
