pub mod conversations;
pub mod health;
pub mod messages;
pub mod qa;
pub mod rooms;
pub mod wsroute;

use actix_web::web;

/// Routes that require an authenticated caller
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(conversations::list_conversations)
        .service(conversations::open_individual)
        .service(conversations::create_group)
        .service(conversations::get_conversation)
        .service(conversations::add_participant)
        .service(conversations::remove_participant)
        .service(conversations::set_muted)
        .service(messages::search_messages)
        .service(messages::pinned_messages)
        .service(messages::pin_message)
        .service(messages::unpin_message)
        .service(messages::get_messages)
        .service(messages::send_message)
        .service(messages::send_to_user)
        .service(messages::mark_read)
        .service(messages::unread_count)
        .service(messages::unread_summary)
        .service(rooms::get_or_create_room)
        .service(rooms::pin_message)
        .service(rooms::unpin_message)
        .service(rooms::delete_message)
        .service(rooms::get_room)
        .service(rooms::join_room)
        .service(rooms::leave_room)
        .service(rooms::recent_messages)
        .service(rooms::send_room_message)
        .service(rooms::pinned_messages)
        .service(qa::publish_event)
        .service(wsroute::chat_ws)
        .service(wsroute::qa_ws);
}

/// Health and metrics, served without a token
pub fn configure_public(cfg: &mut web::ServiceConfig) {
    cfg.service(health::health).service(health::metrics_endpoint);
}
