use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::{self, Receiver, Sender};
use uuid::Uuid;

use super::topics::Topic;
use crate::metrics::LIVE_CONNECTIONS;

/// Unique identifier for a live connection
///
/// Each WebSocket connection gets one when it registers, so cleanup removes
/// exactly that connection and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialized outbound frame; shared by every recipient of one publish
pub type Frame = Arc<str>;

pub(crate) struct Connection {
    pub(crate) user_id: i64,
    pub(crate) sender: Sender<Frame>,
    topics: Mutex<HashSet<Topic>>,
    consecutive_drops: AtomicU32,
}

impl Connection {
    /// Returns the new consecutive-drop count
    pub(crate) fn record_drop(&self) -> u32 {
        self.consecutive_drops.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_delivery(&self) {
        self.consecutive_drops.store(0, Ordering::Relaxed);
    }
}

/// Topic registry for live connections
///
/// Keeps connection -> topics and topic -> connections in step. Both maps
/// are sharded, so subscribe/publish on unrelated topics never contend.
pub struct TopicRegistry {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    topics: DashMap<Topic, HashSet<ConnectionId>>,
    buffer: usize,
}

impl TopicRegistry {
    /// `buffer` is the per-connection outbound queue capacity
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            topics: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Register a connection for `user_id` and hand back its outbound queue
    pub fn connect(&self, user_id: i64) -> (ConnectionId, Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            Arc::new(Connection {
                user_id,
                sender: tx,
                topics: Mutex::new(HashSet::new()),
                consecutive_drops: AtomicU32::new(0),
            }),
        );
        LIVE_CONNECTIONS.inc();
        tracing::debug!(connection_id = %id, user_id, "connection registered");
        (id, rx)
    }

    /// Add `topic` to the connection's subscriptions. Idempotent.
    ///
    /// Returns `false` when the connection is not (or no longer) registered.
    pub fn subscribe(&self, id: ConnectionId, topic: Topic) -> bool {
        let Some(conn) = self.connection(id) else {
            return false;
        };
        if let Ok(mut topics) = conn.topics.lock() {
            topics.insert(topic.clone());
        }
        self.topics.entry(topic.clone()).or_default().insert(id);

        // A concurrent disconnect may have swept the topic set before our
        // insert landed; undo so no orphan entry survives
        if !self.connections.contains_key(&id) {
            self.detach(id, &topic);
            return false;
        }
        tracing::debug!(connection_id = %id, topic = %topic, "subscribed");
        true
    }

    /// Returns whether the connection was subscribed
    pub fn unsubscribe(&self, id: ConnectionId, topic: &Topic) -> bool {
        let was_subscribed = self
            .connection(id)
            .and_then(|conn| conn.topics.lock().ok().map(|mut t| t.remove(topic)))
            .unwrap_or(false);
        self.detach(id, topic);
        was_subscribed
    }

    /// Drop the connection and all of its subscriptions. Idempotent.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let Some((_, conn)) = self.connections.remove(&id) else {
            return false;
        };
        let topics: Vec<Topic> = conn
            .topics
            .lock()
            .map(|mut t| t.drain().collect())
            .unwrap_or_default();
        for topic in &topics {
            self.detach(id, topic);
        }
        LIVE_CONNECTIONS.dec();
        tracing::debug!(
            connection_id = %id,
            user_id = conn.user_id,
            topics = topics.len(),
            "connection unregistered"
        );
        true
    }

    /// Unsubscribe every connection of `user_id` from `topic`; returns how
    /// many were removed. Used when a user loses access to a private topic.
    pub fn evict_user(&self, user_id: i64, topic: &Topic) -> usize {
        let owned: Vec<ConnectionId> = self
            .subscribers(topic)
            .into_iter()
            .filter(|(_, conn)| conn.user_id == user_id)
            .map(|(id, _)| id)
            .collect();
        for id in &owned {
            self.unsubscribe(*id, topic);
        }
        if !owned.is_empty() {
            tracing::info!(
                user_id,
                topic = %topic,
                connections = owned.len(),
                "user evicted from topic"
            );
        }
        owned.len()
    }

    /// Snapshot of the connections subscribed to `topic`
    pub(crate) fn subscribers(&self, topic: &Topic) -> Vec<(ConnectionId, Arc<Connection>)> {
        let ids: Vec<ConnectionId> = match self.topics.get(topic) {
            Some(set) => set.iter().copied().collect(),
            None => return Vec::new(),
        };
        ids.into_iter()
            .filter_map(|id| self.connection(id).map(|conn| (id, conn)))
            .collect()
    }

    pub fn topics_of(&self, id: ConnectionId) -> Vec<Topic> {
        self.connection(id)
            .and_then(|conn| conn.topics.lock().ok().map(|t| t.iter().cloned().collect()))
            .unwrap_or_default()
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map(|set| set.len()).unwrap_or(0)
    }

    fn connection(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    fn detach(&self, id: ConnectionId, topic: &Topic) {
        if let Some(mut set) = self.topics.get_mut(topic) {
            set.remove(&id);
        }
        self.topics.remove_if(topic, |_, set| set.is_empty());
    }
}
