//! Message domain types.
//!
//! A LINE user sends text → it becomes a `user` turn → the model answers with an
//! `assistant` turn. Both are timestamped while they live in the history store
//! and stripped down to [`HistoryMessage`] whenever they leave it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (persona, store info, menu)
    System,
    /// The chat user
    User,
    /// The language model
    Assistant,
}

impl Role {
    /// Wire name used by chat-completion APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single stored turn in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent this message
    pub role: Role,

    /// The text content, stored verbatim
    pub content: String,

    /// When the turn was recorded
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp,
        }
    }

    /// Age of this message at `now`. Negative if the clock went backwards.
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::TimeDelta {
        now - self.timestamp
    }

    /// Drop the timestamp.
    pub fn to_history(&self) -> HistoryMessage {
        HistoryMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A turn without its timestamp, the shape handed to the context assembler
/// and serialized into completion requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
}

impl HistoryMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
        let role: Role = serde_json::from_str("\"system\"").unwrap();
        assert_eq!(role, Role::System);
    }

    #[test]
    fn to_history_strips_timestamp() {
        let msg = Message::new(Role::User, "Hello", Utc::now());
        let stripped = msg.to_history();
        assert_eq!(stripped, HistoryMessage::user("Hello"));

        let json = serde_json::to_value(&stripped).unwrap();
        assert!(json.get("timestamp").is_none());
        assert_eq!(json["role"], "user");
    }

    #[test]
    fn age_is_relative_to_now() {
        let t0 = Utc::now();
        let msg = Message::new(Role::Assistant, "Hi there", t0);
        assert_eq!(msg.age_at(t0 + TimeDelta::minutes(5)), TimeDelta::minutes(5));
    }
}
