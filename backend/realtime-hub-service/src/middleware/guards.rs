//! Request guards that put the caller's identity and membership in the type
//! signature of a handler

use actix_middleware::UserId;
use actix_web::{dev::Payload, Error, FromRequest, HttpMessage, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use crate::error::{AppError, AppResult, Entity};
use crate::models::Participant;
use crate::store::ChatStore;

/// Authenticated caller, as established by `JwtAuthMiddleware`
#[derive(Debug, Clone, Copy)]
pub struct User {
    pub id: i64,
}

impl FromRequest for User {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let user_id = req.extensions().get::<UserId>().map(|u| u.0);
        ready(
            user_id
                .map(|id| User { id })
                .ok_or_else(|| AppError::Unauthorized.into()),
        )
    }
}

/// A verified active participant of a conversation
#[derive(Debug, Clone)]
pub struct ConversationMember {
    pub user_id: i64,
    pub conversation_id: Uuid,
    pub participant: Participant,
}

impl ConversationMember {
    /// `NotFound` for an unknown conversation, `Forbidden` for a non-member
    /// or a member who has left
    pub async fn verify(
        store: &dyn ChatStore,
        user_id: i64,
        conversation_id: Uuid,
    ) -> AppResult<Self> {
        store
            .find_conversation(conversation_id)
            .await?
            .ok_or(AppError::NotFound(Entity::Conversation))?;

        match store.find_participant(conversation_id, user_id).await? {
            Some(participant) if participant.is_active => Ok(Self {
                user_id,
                conversation_id,
                participant,
            }),
            _ => Err(AppError::forbidden("not a participant of this conversation")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn test_verify_membership() {
        let store = InMemoryStore::new();
        let conversation = store.create_individual(1, 2).await.unwrap();

        let member = ConversationMember::verify(&store, 1, conversation.id)
            .await
            .unwrap();
        assert!(member.participant.is_active);

        assert!(matches!(
            ConversationMember::verify(&store, 3, conversation.id).await,
            Err(AppError::Forbidden(_))
        ));
        assert_eq!(
            ConversationMember::verify(&store, 1, Uuid::new_v4())
                .await
                .unwrap_err(),
            AppError::NotFound(Entity::Conversation)
        );
    }

    #[actix_web::test]
    async fn test_user_requires_identity() {
        let req = actix_web::test::TestRequest::default().to_http_request();
        assert!(User::extract(&req).await.is_err());

        req.extensions_mut().insert(UserId(5));
        assert_eq!(User::extract(&req).await.unwrap().id, 5);
    }
}
