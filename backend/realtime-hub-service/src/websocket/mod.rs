//! Live push layer: topics, connection registry, fan-out and WebSocket sessions

pub mod broadcast;
pub mod message_types;
pub mod registry;
pub mod session;
pub mod subscription;
pub mod topics;

pub use broadcast::{Broadcaster, PublishReport};
pub use registry::{ConnectionId, TopicRegistry};
pub use session::WsSession;
pub use subscription::SubscriptionAuthorizer;
pub use topics::{Endpoint, Topic};
