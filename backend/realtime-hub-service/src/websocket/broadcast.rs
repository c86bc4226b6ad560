//! Topic fan-out to live connections
//!
//! Publishing never waits on a subscriber. Each connection owns a bounded
//! queue fed with `try_send`; a full queue costs that subscriber the event,
//! and a subscriber that keeps overflowing is unregistered. Events on one
//! topic from one producer reach each subscriber in publish order because
//! the queue is FIFO.

use event_schema::LiveEvent;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

use super::message_types::WsOutboundEvent;
use super::registry::{Frame, TopicRegistry};
use super::topics::Topic;
use crate::metrics::{EVENTS_DELIVERED, EVENTS_DROPPED, EVENTS_PUBLISHED};

/// Outcome of one publish; informational only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

impl PublishReport {
    fn merge(self, other: PublishReport) -> Self {
        Self {
            delivered: self.delivered + other.delivered,
            dropped: self.dropped + other.dropped,
        }
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<TopicRegistry>,
    max_consecutive_drops: u32,
}

impl Broadcaster {
    pub fn new(registry: Arc<TopicRegistry>, max_consecutive_drops: u32) -> Self {
        Self {
            registry,
            max_consecutive_drops: max_consecutive_drops.max(1),
        }
    }

    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    pub fn publish(&self, topic: &Topic, event: &LiveEvent) -> PublishReport {
        EVENTS_PUBLISHED.with_label_values(&[topic.family()]).inc();

        let subscribers = self.registry.subscribers(topic);
        if subscribers.is_empty() {
            return PublishReport::default();
        }

        let frame: Frame = WsOutboundEvent::Event {
            topic: topic.clone(),
            event: event.clone(),
        }
        .to_json()
        .into();

        let mut report = PublishReport::default();
        for (id, conn) in subscribers {
            match conn.sender.try_send(Arc::clone(&frame)) {
                Ok(()) => {
                    conn.record_delivery();
                    report.delivered += 1;
                    EVENTS_DELIVERED.inc();
                }
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    EVENTS_DROPPED.with_label_values(&["queue_full"]).inc();
                    let drops = conn.record_drop();
                    tracing::warn!(
                        connection_id = %id,
                        user_id = conn.user_id,
                        topic = %topic,
                        event_type = %event.event_type,
                        consecutive_drops = drops,
                        "delivery failure: subscriber queue full"
                    );
                    if drops >= self.max_consecutive_drops {
                        tracing::warn!(
                            connection_id = %id,
                            user_id = conn.user_id,
                            "dropping connection after repeated delivery failures"
                        );
                        self.registry.disconnect(id);
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    EVENTS_DROPPED.with_label_values(&["closed"]).inc();
                    tracing::debug!(
                        connection_id = %id,
                        topic = %topic,
                        "subscriber gone, unregistering"
                    );
                    self.registry.disconnect(id);
                }
            }
        }

        tracing::debug!(
            topic = %topic,
            event_type = %event.event_type,
            delivered = report.delivered,
            dropped = report.dropped,
            "event published"
        );
        report
    }

    /// Publish the same event to several topics, in order
    pub fn publish_all<'a>(
        &self,
        topics: impl IntoIterator<Item = &'a Topic>,
        event: &LiveEvent,
    ) -> PublishReport {
        topics
            .into_iter()
            .fold(PublishReport::default(), |acc, topic| {
                acc.merge(self.publish(topic, event))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_schema::LiveEventKind;

    fn event() -> LiveEvent {
        LiveEvent::new(LiveEventKind::QuestionCreated, 1_i64, 9)
    }

    #[tokio::test]
    async fn test_publish_reaches_only_subscribers() {
        let registry = Arc::new(TopicRegistry::new(4));
        let broadcaster = Broadcaster::new(registry.clone(), 3);
        let (a, mut rx_a) = registry.connect(1);
        let (_b, mut rx_b) = registry.connect(2);
        registry.subscribe(a, Topic::QaNewQuestions);

        let report = broadcaster.publish(&Topic::QaNewQuestions, &event());
        assert_eq!(report, PublishReport { delivered: 1, dropped: 0 });

        let frame = rx_a.recv().await.unwrap();
        assert!(frame.contains("QUESTION_CREATED"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_queue_drops_then_unregisters() {
        let registry = Arc::new(TopicRegistry::new(1));
        let broadcaster = Broadcaster::new(registry.clone(), 2);
        let (slow, _rx) = registry.connect(1);
        registry.subscribe(slow, Topic::QaNewQuestions);

        assert_eq!(broadcaster.publish(&Topic::QaNewQuestions, &event()).delivered, 1);
        assert_eq!(broadcaster.publish(&Topic::QaNewQuestions, &event()).dropped, 1);
        assert!(registry.is_connected(slow));

        assert_eq!(broadcaster.publish(&Topic::QaNewQuestions, &event()).dropped, 1);
        assert!(!registry.is_connected(slow));
        assert_eq!(registry.subscriber_count(&Topic::QaNewQuestions), 0);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_unregistered() {
        let registry = Arc::new(TopicRegistry::new(4));
        let broadcaster = Broadcaster::new(registry.clone(), 8);
        let (gone, rx) = registry.connect(1);
        registry.subscribe(gone, Topic::User(1));
        drop(rx);

        let report = broadcaster.publish(&Topic::User(1), &event());
        assert_eq!(report.dropped, 1);
        assert!(!registry.is_connected(gone));
    }

    #[tokio::test]
    async fn test_order_preserved_per_subscriber() {
        let registry = Arc::new(TopicRegistry::new(16));
        let broadcaster = Broadcaster::new(registry.clone(), 3);
        let (id, mut rx) = registry.connect(1);
        registry.subscribe(id, Topic::QaQuestion(42));

        for n in 0..5_i64 {
            let e = LiveEvent::new(LiveEventKind::AnswerCreated, 42_i64, n);
            broadcaster.publish(&Topic::QaQuestion(42), &e);
        }
        for n in 0..5_i64 {
            let frame = rx.recv().await.unwrap();
            let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["event"]["userId"], n);
        }
    }
}
