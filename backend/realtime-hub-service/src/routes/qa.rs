use actix_web::{post, web, HttpResponse};
use serde_json::json;

use crate::error::AppError;
use crate::middleware::guards::User;
use crate::services::qa_events::QaEventRequest;
use crate::state::AppState;

/// POST /qa/events
/// Entry point for the Q&A module to push a domain change to live clients.
/// The caller becomes the event's `userId`.
#[post("/qa/events")]
pub async fn publish_event(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<QaEventRequest>,
) -> Result<HttpResponse, AppError> {
    let report = state.qa.publish(body.into_inner(), user.id)?;
    Ok(HttpResponse::Accepted().json(json!({
        "delivered": report.delivered,
        "dropped": report.dropped,
    })))
}
