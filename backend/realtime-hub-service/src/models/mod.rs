pub mod conversation;
pub mod message;
pub mod room;

pub use conversation::{
    normalize_pair, Conversation, ConversationFilter, ConversationKind, ConversationSummary,
    NewGroup, Participant,
};
pub use message::{
    Attachment, ChatMessagePayload, DeliveryStatus, Message, MessageKind, MessageView, SendMessage,
};
pub use room::{ChatRoom, NewRoomMessage, RoomMessage, RoomMessageKind};
