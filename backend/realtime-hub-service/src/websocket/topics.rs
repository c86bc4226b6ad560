//! Topic names for live subscriptions
//!
//! | Topic                   | Carries                                        |
//! |-------------------------|------------------------------------------------|
//! | `conversation:{uuid}`   | chat messages of one conversation              |
//! | `user:{id}`             | per-user inbox notices                         |
//! | `qa:question:{id}`      | answers and comments of one question           |
//! | `qa:answer:{id}`        | comments and reactions of one answer           |
//! | `qa:course:{id}`        | new questions of one course                    |
//! | `qa:questions:new`      | every new question                             |
//! | `roadmap-room:{token}`  | study room messages                            |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Topic {
    Conversation(Uuid),
    User(i64),
    QaQuestion(i64),
    QaAnswer(i64),
    QaCourse(i64),
    QaNewQuestions,
    Room(String),
}

/// Which handshake endpoint a connection came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// `/ws`: conversations, inbox and study rooms
    Chat,
    /// `/ws/qa`: Q&A topics only
    Qa,
}

impl Topic {
    pub fn family(&self) -> &'static str {
        match self {
            Topic::Conversation(_) => "conversation",
            Topic::User(_) => "user",
            Topic::QaQuestion(_) | Topic::QaAnswer(_) | Topic::QaCourse(_) | Topic::QaNewQuestions => {
                "qa"
            }
            Topic::Room(_) => "roadmap-room",
        }
    }

    pub fn is_qa(&self) -> bool {
        self.family() == "qa"
    }

    pub fn accepted_on(&self, endpoint: Endpoint) -> bool {
        match endpoint {
            Endpoint::Chat => !self.is_qa(),
            Endpoint::Qa => self.is_qa(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Conversation(id) => write!(f, "conversation:{id}"),
            Topic::User(id) => write!(f, "user:{id}"),
            Topic::QaQuestion(id) => write!(f, "qa:question:{id}"),
            Topic::QaAnswer(id) => write!(f, "qa:answer:{id}"),
            Topic::QaCourse(id) => write!(f, "qa:course:{id}"),
            Topic::QaNewQuestions => f.write_str("qa:questions:new"),
            Topic::Room(token) => write!(f, "roadmap-room:{token}"),
        }
    }
}

fn invalid(raw: &str) -> AppError {
    AppError::bad_request(format!("invalid topic: {raw}"))
}

fn numeric(raw: &str, id: &str) -> Result<i64, AppError> {
    id.parse().map_err(|_| invalid(raw))
}

impl FromStr for Topic {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw == "qa:questions:new" {
            return Ok(Topic::QaNewQuestions);
        }

        let (prefix, rest) = raw.rsplit_once(':').ok_or_else(|| invalid(raw))?;
        match prefix {
            "conversation" => Uuid::parse_str(rest)
                .map(Topic::Conversation)
                .map_err(|_| invalid(raw)),
            "user" => numeric(raw, rest).map(Topic::User),
            "qa:question" => numeric(raw, rest).map(Topic::QaQuestion),
            "qa:answer" => numeric(raw, rest).map(Topic::QaAnswer),
            "qa:course" => numeric(raw, rest).map(Topic::QaCourse),
            "roadmap-room" if !rest.trim().is_empty() => Ok(Topic::Room(rest.to_string())),
            _ => Err(invalid(raw)),
        }
    }
}

impl TryFrom<String> for Topic {
    type Error = AppError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_every_family() {
        let id = Uuid::new_v4();
        let cases = [
            (format!("conversation:{id}"), Topic::Conversation(id)),
            ("user:7".to_string(), Topic::User(7)),
            ("qa:question:42".to_string(), Topic::QaQuestion(42)),
            ("qa:answer:9".to_string(), Topic::QaAnswer(9)),
            ("qa:course:3".to_string(), Topic::QaCourse(3)),
            ("qa:questions:new".to_string(), Topic::QaNewQuestions),
            ("roadmap-room:abc".to_string(), Topic::Room("abc".into())),
        ];
        for (raw, expected) in cases {
            let parsed: Topic = raw.parse().unwrap();
            assert_eq!(parsed, expected);
            assert_eq!(parsed.to_string(), raw);
        }
    }

    #[test]
    fn test_rejects_malformed() {
        for raw in ["", "user:abc", "conversation:42", "qa:vote:1", "roadmap-room:", "chat"] {
            assert!(raw.parse::<Topic>().is_err(), "{raw} should not parse");
        }
    }

    #[test]
    fn test_endpoint_families() {
        assert!(Topic::QaQuestion(1).accepted_on(Endpoint::Qa));
        assert!(!Topic::QaQuestion(1).accepted_on(Endpoint::Chat));
        assert!(Topic::User(1).accepted_on(Endpoint::Chat));
        assert!(Topic::Room("t".into()).accepted_on(Endpoint::Chat));
        assert!(!Topic::Conversation(Uuid::new_v4()).accepted_on(Endpoint::Qa));
    }

    #[test]
    fn test_serde_uses_string_form() {
        let json = serde_json::to_string(&Topic::QaCourse(5)).unwrap();
        assert_eq!(json, "\"qa:course:5\"");
        let back: Topic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Topic::QaCourse(5));
    }
}
