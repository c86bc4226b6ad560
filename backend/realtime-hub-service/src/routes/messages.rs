use actix_web::{get, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::{ConversationMember, User};
use crate::models::SendMessage;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct HistoryQuery {
    /// Sequence to page back from
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Deserialize, Default)]
pub struct MarkReadRequest {
    /// Defaults to now; never set past the latest activity
    pub at: Option<DateTime<Utc>>,
}

#[get("/conversations/{id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let page = state
        .messages
        .history(conversation_id.into_inner(), user.id, query.before, query.limit)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[get("/conversations/{id}/messages/search")]
pub async fn search_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .messages
        .search(conversation_id.into_inner(), user.id, &query.q)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[get("/conversations/{id}/pinned")]
pub async fn pinned_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .messages
        .pinned(conversation_id.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[post("/conversations/{id}/messages/{message_id}/pin")]
pub async fn pin_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (conversation_id, message_id) = path.into_inner();
    let message = state
        .messages
        .pin(conversation_id, user.id, message_id)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}

#[post("/conversations/{id}/messages/{message_id}/unpin")]
pub async fn unpin_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (conversation_id, message_id) = path.into_inner();
    state
        .messages
        .unpin(conversation_id, user.id, message_id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<SendMessage>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .send(conversation_id.into_inner(), user.id, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(message))
}

/// POST /users/{id}/messages
/// Message a user directly; the individual conversation is opened on demand
#[post("/users/{id}/messages")]
pub async fn send_to_user(
    state: web::Data<AppState>,
    user: User,
    recipient: web::Path<i64>,
    body: web::Json<SendMessage>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .send_to_user(user.id, recipient.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(message))
}

#[post("/conversations/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: Option<web::Json<MarkReadRequest>>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = conversation_id.into_inner();
    let at = body.and_then(|b| b.into_inner().at);
    let cursor = match at {
        Some(at) => state.unread.mark_read_at(conversation_id, user.id, at).await?,
        None => state.unread.mark_read(conversation_id, user.id).await?,
    };
    Ok(HttpResponse::Ok().json(json!({
        "conversation_id": conversation_id,
        "last_read_at": cursor,
    })))
}

#[get("/conversations/{id}/unread")]
pub async fn unread_count(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let member =
        ConversationMember::verify(state.store.as_ref(), user.id, conversation_id.into_inner())
            .await?;
    let count = state
        .unread
        .unread_count(member.conversation_id, member.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "conversation_id": member.conversation_id,
        "unread_count": count,
    })))
}

/// GET /unread
/// Per-conversation unread counts and their total
#[get("/unread")]
pub async fn unread_summary(
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let summary = state.unread.unread_summary(user.id).await?;
    Ok(HttpResponse::Ok().json(summary))
}
