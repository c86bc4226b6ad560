use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use crate::middleware::guards::User;
use crate::state::AppState;
use crate::websocket::{Endpoint, WsSession};

fn start(
    endpoint: Endpoint,
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, Error> {
    tracing::debug!(user_id = user.id, endpoint = ?endpoint, "WebSocket handshake");
    let session = WsSession::new(
        user.id,
        endpoint,
        state.registry.clone(),
        state.authorizer.clone(),
        &state.config.ws,
    );
    ws::start(session, &req, stream)
}

/// Conversations, inbox and study rooms
#[get("/ws")]
pub async fn chat_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, Error> {
    start(Endpoint::Chat, req, stream, state, user)
}

/// Q&A live updates
#[get("/ws/qa")]
pub async fn qa_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, Error> {
    start(Endpoint::Qa, req, stream, state, user)
}
