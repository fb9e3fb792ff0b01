//! Request payload sent to the AI responder webhook.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::{ChatSession, Role};

/// Upper bound on prior turns included as context.
pub const MAX_CONTEXT_TURNS: usize = 5;

/// Prior turns are truncated to this many characters.
pub const CONTEXT_CONTENT_CHARS: usize = 200;

/// One prior turn included for context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextTurn {
    pub role: Role,
    pub content: String,
}

/// JSON body POSTed to the responder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponderRequest {
    pub message: String,
    pub user_id: String,
    pub user_name: String,
    pub user_role: String,
    pub user_team: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub message_count: usize,
    pub context: Vec<ContextTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

impl ResponderRequest {
    /// Builds the request for a new user `message` in `session`.
    ///
    /// `session` must not yet contain `message`; its last `context_turns`
    /// (at most five) messages are sent as context.
    #[must_use]
    pub fn for_turn(
        session: &ChatSession,
        user_id: &str,
        message: &str,
        context_turns: usize,
        system: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        let turns = context_turns.min(MAX_CONTEXT_TURNS);
        let messages = session.messages();
        let context = messages[messages.len().saturating_sub(turns)..]
            .iter()
            .map(|m| ContextTurn {
                role: m.role,
                content: m.content.chars().take(CONTEXT_CONTENT_CHARS).collect(),
            })
            .collect();

        let owner = session.owner();
        Self {
            message: message.to_string(),
            user_id: user_id.to_string(),
            user_name: owner.name.clone(),
            user_role: owner.role.clone(),
            user_team: owner.team.clone(),
            timestamp: now,
            session_id: session.id().to_string(),
            message_count: session.message_count(),
            context,
            system: system.filter(|s| !s.is_empty()).map(String::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChatMessage, UserContext};

    fn session_with(n: usize) -> ChatSession {
        let now = Utc::now();
        let mut session = ChatSession::new("s1", "Chat", UserContext::new("A", "B", "C"), now);
        for i in 0..n {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            session.push(ChatMessage::new(role, format!("m{i}"), now));
        }
        session
    }

    #[test]
    fn test_context_is_capped_at_five_turns() {
        let session = session_with(8);
        let request = ResponderRequest::for_turn(&session, "u", "next", 10, None, Utc::now());

        assert_eq!(request.context.len(), 5);
        assert_eq!(request.context[0].content, "m3");
        assert_eq!(request.context[4].content, "m7");
        assert_eq!(request.message_count, 8);
    }

    #[test]
    fn test_context_content_is_truncated() {
        let mut session = session_with(0);
        session.push(ChatMessage::new(Role::User, "é".repeat(300), Utc::now()));
        let request = ResponderRequest::for_turn(&session, "u", "x", 5, None, Utc::now());

        assert_eq!(request.context[0].content.chars().count(), 200);
    }

    #[test]
    fn test_request_serializes_expected_fields() {
        let session = session_with(1);
        let request =
            ResponderRequest::for_turn(&session, "guest", "hi", 5, Some("crm"), Utc::now());
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["message"], "hi");
        assert_eq!(json["user_name"], "A");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["system"], "crm");
        assert_eq!(json["context"][0]["role"], "user");
        assert!(json["timestamp"].is_string());
    }
}
