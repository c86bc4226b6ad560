use actix_web::{delete, get, post, put, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::{ConversationFilter, NewGroup};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub filter: ConversationFilter,
}

#[derive(Deserialize)]
pub struct IndividualRequest {
    pub user_id: i64,
}

#[derive(Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Deserialize)]
pub struct AddParticipantRequest {
    pub user_id: i64,
}

/// GET /conversations?filter=all|individual|group
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let summaries = state.conversations.list(user.id, query.filter).await?;
    Ok(HttpResponse::Ok().json(summaries))
}

/// POST /conversations/individual
/// Open (or reopen) the caller's conversation with another user
#[post("/conversations/individual")]
pub async fn open_individual(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<IndividualRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .resolver
        .resolve_individual(user.id, body.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(conversation))
}

/// POST /conversations/group
#[post("/conversations/group")]
pub async fn create_group(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<NewGroup>,
) -> Result<HttpResponse, AppError> {
    let conversation = state
        .conversations
        .create_group(user.id, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(conversation))
}

#[get("/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let details = state
        .conversations
        .get(conversation_id.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::Ok().json(details))
}

#[post("/conversations/{id}/participants")]
pub async fn add_participant(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<AddParticipantRequest>,
) -> Result<HttpResponse, AppError> {
    let participant = state
        .conversations
        .add_participant(conversation_id.into_inner(), user.id, body.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(participant))
}

#[delete("/conversations/{id}/participants/{user_id}")]
pub async fn remove_participant(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(Uuid, i64)>,
) -> Result<HttpResponse, AppError> {
    let (conversation_id, target) = path.into_inner();
    state
        .conversations
        .remove_participant(conversation_id, user.id, target)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

#[put("/conversations/{id}/mute")]
pub async fn set_muted(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<MuteRequest>,
) -> Result<HttpResponse, AppError> {
    let participant = state
        .conversations
        .set_muted(conversation_id.into_inner(), user.id, body.muted)
        .await?;
    Ok(HttpResponse::Ok().json(participant))
}
