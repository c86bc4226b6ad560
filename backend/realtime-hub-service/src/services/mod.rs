pub mod conversation_service;
pub mod message_service;
pub mod qa_events;
pub mod resolver;
pub mod room_service;
pub mod unread;

pub use conversation_service::ConversationService;
pub use message_service::MessageService;
pub use qa_events::QaEventPublisher;
pub use resolver::ConversationResolver;
pub use room_service::RoomService;
pub use unread::UnreadTracker;
