use actix_web::{delete, get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::models::NewRoomMessage;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RoomRequest {
    pub roadmap_id: i64,
    pub roadmap_name: String,
}

/// POST /rooms
/// Room of a roadmap, created on first request
#[post("/rooms")]
pub async fn get_or_create_room(
    state: web::Data<AppState>,
    _user: User,
    body: web::Json<RoomRequest>,
) -> Result<HttpResponse, AppError> {
    let room = state
        .rooms
        .get_or_create(body.roadmap_id, &body.roadmap_name)
        .await?;
    Ok(HttpResponse::Ok().json(room))
}

#[get("/rooms/{token}")]
pub async fn get_room(
    state: web::Data<AppState>,
    _user: User,
    token: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let room = state.rooms.get(&token).await?;
    Ok(HttpResponse::Ok().json(room))
}

#[post("/rooms/{token}/join")]
pub async fn join_room(
    state: web::Data<AppState>,
    user: User,
    token: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let room = state.rooms.join(&token, user.id).await?;
    Ok(HttpResponse::Ok().json(room))
}

#[post("/rooms/{token}/leave")]
pub async fn leave_room(
    state: web::Data<AppState>,
    user: User,
    token: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let room = state.rooms.leave(&token, user.id).await?;
    Ok(HttpResponse::Ok().json(room))
}

#[get("/rooms/{token}/messages")]
pub async fn recent_messages(
    state: web::Data<AppState>,
    _user: User,
    token: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let messages = state.rooms.recent(&token).await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[post("/rooms/{token}/messages")]
pub async fn send_room_message(
    state: web::Data<AppState>,
    user: User,
    token: web::Path<String>,
    body: web::Json<NewRoomMessage>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .rooms
        .send(&token, user.id, body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(message))
}

#[get("/rooms/{token}/pinned")]
pub async fn pinned_messages(
    state: web::Data<AppState>,
    _user: User,
    token: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let messages = state.rooms.pinned(&token).await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[post("/rooms/messages/{id}/pin")]
pub async fn pin_message(
    state: web::Data<AppState>,
    _user: User,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let message = state.rooms.pin(message_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(message))
}

#[post("/rooms/messages/{id}/unpin")]
pub async fn unpin_message(
    state: web::Data<AppState>,
    _user: User,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let message = state.rooms.unpin(message_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(message))
}

#[delete("/rooms/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    state
        .rooms
        .delete(message_id.into_inner(), user.id)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}
