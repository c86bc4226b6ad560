//! Q&A live events
//!
//! The Q&A module owns questions, answers, comments and votes. It reports each
//! change through `POST /qa/events` and this publisher routes it to the
//! `qa:*` topics.
//! Question-level activity goes to `qa:question:{id}`, answer-level activity
//! to `qa:answer:{id}`, and new questions to the global feed plus the course
//! feed when the question belongs to a course.

use event_schema::{EventFamily, LiveEvent, LiveEventKind};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{AppError, AppResult};
use crate::websocket::{Broadcaster, PublishReport, Topic};

/// Body of `POST /qa/events`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QaEventRequest {
    pub event_type: LiveEventKind,
    pub entity_id: i64,
    pub question_id: Option<i64>,
    pub answer_id: Option<i64>,
    pub course_id: Option<i64>,
    #[serde(default)]
    pub payload: JsonValue,
}

#[derive(Clone)]
pub struct QaEventPublisher {
    broadcaster: Broadcaster,
}

impl QaEventPublisher {
    pub fn new(broadcaster: Broadcaster) -> Self {
        Self { broadcaster }
    }

    /// Route a Q&A event to its topics
    ///
    /// Question events go to the question topic (and the new-question feeds
    /// for `QUESTION_CREATED`); answer, comment, vote, reaction and
    /// moderation events go to the answer topic when `answer_id` is set and
    /// to the question topic when `question_id` is set.
    pub fn publish(&self, request: QaEventRequest, user_id: i64) -> AppResult<PublishReport> {
        let kind = request.event_type;
        if !kind.is_qa() {
            return Err(AppError::bad_request(format!("{kind} is not a Q&A event")));
        }

        let mut topics = Vec::new();
        match kind.family() {
            EventFamily::Question => {
                topics.push(Topic::QaQuestion(request.entity_id));
                if kind == LiveEventKind::QuestionCreated {
                    topics.push(Topic::QaNewQuestions);
                    if let Some(course_id) = request.course_id {
                        topics.push(Topic::QaCourse(course_id));
                    }
                }
            }
            _ => {
                if let Some(question_id) = request.question_id {
                    topics.push(Topic::QaQuestion(question_id));
                }
                if let Some(answer_id) = request.answer_id {
                    topics.push(Topic::QaAnswer(answer_id));
                }
            }
        }
        if topics.is_empty() {
            return Err(AppError::bad_request(
                "questionId or answerId is required for this event",
            ));
        }

        let event = LiveEvent::new(kind, request.entity_id, user_id).with_payload(request.payload);
        let report = self.broadcaster.publish_all(&topics, &event);
        tracing::debug!(
            event_type = %kind,
            entity_id = request.entity_id,
            topics = topics.len(),
            delivered = report.delivered,
            "Q&A event published"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::TopicRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn publisher() -> (QaEventPublisher, Arc<TopicRegistry>) {
        let registry = Arc::new(TopicRegistry::new(8));
        let publisher = QaEventPublisher::new(Broadcaster::new(registry.clone(), 4));
        (publisher, registry)
    }

    fn request(body: JsonValue) -> QaEventRequest {
        serde_json::from_value(body).unwrap()
    }

    #[tokio::test]
    async fn test_answer_created_reaches_question_topic_only() {
        let (qa, registry) = publisher();
        let (q42, mut rx42) = registry.connect(1);
        registry.subscribe(q42, Topic::QaQuestion(42));
        let (q43, mut rx43) = registry.connect(2);
        registry.subscribe(q43, Topic::QaQuestion(43));

        let report = qa
            .publish(
                request(json!({
                    "eventType": "ANSWER_CREATED",
                    "entityId": 42,
                    "questionId": 42,
                    "payload": { "answerId": 900, "content": "use a Mutex" }
                })),
                3,
            )
            .unwrap();
        assert_eq!(report.delivered, 1);

        let frame: serde_json::Value = serde_json::from_str(&rx42.recv().await.unwrap()).unwrap();
        assert_eq!(frame["event"]["eventType"], "ANSWER_CREATED");
        assert_eq!(frame["event"]["entityId"], 42);
        assert_eq!(frame["event"]["userId"], 3);
        assert_eq!(frame["event"]["payload"]["answerId"], 900);
        assert!(rx43.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_new_question_feeds() {
        let (qa, registry) = publisher();
        let (global, _g) = registry.connect(1);
        registry.subscribe(global, Topic::QaNewQuestions);
        let (course, _c) = registry.connect(2);
        registry.subscribe(course, Topic::QaCourse(7));

        let in_course = request(json!({
            "eventType": "QUESTION_CREATED",
            "entityId": 1,
            "courseId": 7,
            "payload": { "title": "Borrowing?" }
        }));
        assert_eq!(qa.publish(in_course, 5).unwrap().delivered, 2);

        let standalone = request(json!({ "eventType": "QUESTION_CREATED", "entityId": 2 }));
        assert_eq!(qa.publish(standalone, 5).unwrap().delivered, 1);

        // Updates stay on the question's own topic
        let edited = request(json!({
            "eventType": "QUESTION_UPDATED",
            "entityId": 1,
            "courseId": 7
        }));
        assert_eq!(qa.publish(edited, 5).unwrap().delivered, 0);
    }

    #[tokio::test]
    async fn test_reaction_reaches_question_and_answer() {
        let (qa, registry) = publisher();
        let (on_answer, mut answer_rx) = registry.connect(1);
        registry.subscribe(on_answer, Topic::QaAnswer(9));
        let (on_question, mut question_rx) = registry.connect(2);
        registry.subscribe(on_question, Topic::QaQuestion(4));

        let report = qa
            .publish(
                request(json!({
                    "eventType": "REACTION_UPDATED",
                    "entityId": 9,
                    "questionId": 4,
                    "answerId": 9,
                    "payload": { "reactionType": "LIKE", "likeCount": 12 }
                })),
                4,
            )
            .unwrap();
        assert_eq!(report.delivered, 2);

        let frame: serde_json::Value =
            serde_json::from_str(&answer_rx.recv().await.unwrap()).unwrap();
        assert_eq!(frame["event"]["eventType"], "REACTION_UPDATED");
        assert_eq!(frame["event"]["payload"]["likeCount"], 12);
        assert!(question_rx.try_recv().is_ok());
    }

    #[test]
    fn test_chat_kinds_rejected() {
        let (qa, _) = publisher();
        let chat = QaEventRequest {
            event_type: LiveEventKind::ChatMessageCreated,
            entity_id: 1,
            question_id: Some(1),
            answer_id: None,
            course_id: None,
            payload: JsonValue::Null,
        };
        assert!(qa.publish(chat, 1).is_err());
    }

    #[test]
    fn test_generic_publish_needs_a_target() {
        let (qa, _) = publisher();
        let vote = request(json!({ "eventType": "VOTE_ADDED", "entityId": 5 }));
        assert!(matches!(qa.publish(vote, 1), Err(AppError::BadRequest(_))));
    }
}
