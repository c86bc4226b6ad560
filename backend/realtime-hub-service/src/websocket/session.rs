use actix::{Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler, WrapFuture};
use actix_web_actors::ws;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_stream::wrappers::ReceiverStream;

use super::message_types::{WsInboundEvent, WsOutboundEvent};
use super::registry::{ConnectionId, Frame, TopicRegistry};
use super::subscription::SubscriptionAuthorizer;
use super::topics::{Endpoint, Topic};
use crate::config::WsConfig;
use crate::error::AppError;
use crate::middleware::error_handling::map_error;

/// One live WebSocket connection
///
/// Registers with the topic registry when the actor starts and unregisters
/// when it stops. Outbound frames arrive through the registry queue and are
/// written to the socket as they come.
pub struct WsSession {
    id: Option<ConnectionId>,
    user_id: i64,
    endpoint: Endpoint,
    registry: Arc<TopicRegistry>,
    authorizer: SubscriptionAuthorizer,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    hb: Instant,
}

impl WsSession {
    pub fn new(
        user_id: i64,
        endpoint: Endpoint,
        registry: Arc<TopicRegistry>,
        authorizer: SubscriptionAuthorizer,
        config: &WsConfig,
    ) -> Self {
        Self {
            id: None,
            user_id,
            endpoint,
            registry,
            authorizer,
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_secs),
            client_timeout: Duration::from_secs(config.client_timeout_secs),
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(user_id = act.user_id, "WebSocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn reply(&self, ctx: &mut ws::WebsocketContext<Self>, frame: WsOutboundEvent) {
        ctx.text(frame.to_json());
    }

    fn reply_error(&self, ctx: &mut ws::WebsocketContext<Self>, err: &AppError) {
        let (_, body) = map_error(err);
        self.reply(
            ctx,
            WsOutboundEvent::Error {
                code: body.code,
                message: body.message,
            },
        );
    }

    fn handle_inbound(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<WsInboundEvent>(text) {
            Ok(WsInboundEvent::Ping) => self.reply(ctx, WsOutboundEvent::Pong),
            Ok(WsInboundEvent::Subscribe { topic }) => self.subscribe(&topic, ctx),
            Ok(WsInboundEvent::Unsubscribe { topic }) => self.unsubscribe(&topic, ctx),
            Err(e) => {
                tracing::debug!(user_id = self.user_id, error = %e, "malformed client frame");
                self.reply_error(ctx, &AppError::bad_request(format!("malformed frame: {e}")));
            }
        }
    }

    fn subscribe(&mut self, raw: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let topic: Topic = match raw.parse() {
            Ok(topic) => topic,
            Err(e) => return self.reply_error(ctx, &e),
        };
        let Some(id) = self.id else {
            return;
        };

        let authorizer = self.authorizer.clone();
        let user_id = self.user_id;
        let endpoint = self.endpoint;
        let check = async move {
            let result = authorizer.authorize(user_id, endpoint, &topic).await;
            (topic, result)
        };

        // `wait` holds back later frames until this resolves, so a quick
        // subscribe/unsubscribe pair is applied in order
        ctx.wait(check.into_actor(self).map(move |(topic, result), act, ctx| {
            match result {
                Ok(()) => {
                    if act.registry.subscribe(id, topic.clone()) {
                        tracing::info!(user_id = act.user_id, topic = %topic, "topic subscribed");
                        act.reply(ctx, WsOutboundEvent::Subscribed { topic });
                    }
                }
                Err(e) => {
                    tracing::info!(
                        user_id = act.user_id,
                        topic = %topic,
                        error = %e,
                        "subscription refused"
                    );
                    act.reply_error(ctx, &e);
                }
            }
        }));
    }

    fn unsubscribe(&mut self, raw: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let topic: Topic = match raw.parse() {
            Ok(topic) => topic,
            Err(e) => return self.reply_error(ctx, &e),
        };
        if let Some(id) = self.id {
            self.registry.unsubscribe(id, &topic);
        }
        self.reply(ctx, WsOutboundEvent::Unsubscribed { topic });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (id, rx) = self.registry.connect(self.user_id);
        self.id = Some(id);
        tracing::info!(
            connection_id = %id,
            user_id = self.user_id,
            endpoint = ?self.endpoint,
            "WebSocket session started"
        );

        ctx.add_stream(ReceiverStream::new(rx));
        self.hb(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(id) = self.id.take() {
            self.registry.disconnect(id);
            tracing::info!(connection_id = %id, user_id = self.user_id, "WebSocket session stopped");
        }
    }
}

// Frames fanned out by the broadcaster
impl StreamHandler<Frame> for WsSession {
    fn handle(&mut self, frame: Frame, ctx: &mut Self::Context) {
        ctx.text(frame.to_string());
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // The registry dropped this connection's queue
        tracing::info!(user_id = self.user_id, "connection unregistered by broadcaster, closing");
        ctx.stop();
    }
}

// Handle WebSocket protocol messages
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.handle_inbound(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                self.reply_error(ctx, &AppError::bad_request("binary frames are not supported"));
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                ctx.stop();
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(user_id = self.user_id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
        }
    }
}
