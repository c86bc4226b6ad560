use actix_middleware::JwtValidator;
use std::sync::Arc;

use crate::config::Config;
use crate::services::{
    ConversationResolver, ConversationService, MessageService, QaEventPublisher, RoomService,
    UnreadTracker,
};
use crate::store::ChatStore;
use crate::websocket::{Broadcaster, SubscriptionAuthorizer, TopicRegistry};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub config: Arc<Config>,
    pub validator: Arc<JwtValidator>,
    pub registry: Arc<TopicRegistry>,
    pub broadcaster: Broadcaster,
    pub authorizer: SubscriptionAuthorizer,
    pub resolver: ConversationResolver,
    pub unread: UnreadTracker,
    pub messages: MessageService,
    pub conversations: ConversationService,
    pub rooms: RoomService,
    pub qa: QaEventPublisher,
}

impl AppState {
    /// Wire every service onto one store and one registry
    pub fn new(store: Arc<dyn ChatStore>, config: Config) -> Self {
        let config = Arc::new(config);
        let validator = Arc::new(JwtValidator::from_secret(&config.jwt_secret));
        let registry = Arc::new(TopicRegistry::new(config.ws.subscriber_buffer));
        let broadcaster = Broadcaster::new(registry.clone(), config.ws.max_consecutive_drops);
        let resolver = ConversationResolver::new(store.clone(), config.resolver_max_retries);

        Self {
            authorizer: SubscriptionAuthorizer::new(store.clone()),
            unread: UnreadTracker::new(store.clone()),
            messages: MessageService::new(
                store.clone(),
                resolver.clone(),
                broadcaster.clone(),
                config.history_page_limit,
            ),
            conversations: ConversationService::new(store.clone(), broadcaster.clone()),
            rooms: RoomService::new(
                store.clone(),
                broadcaster.clone(),
                config.resolver_max_retries,
            ),
            qa: QaEventPublisher::new(broadcaster.clone()),
            resolver,
            broadcaster,
            registry,
            validator,
            config,
            store,
        }
    }
}
