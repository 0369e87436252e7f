// Conversation state
//
// Owned exclusively by one orchestrator invocation; never shared between runs.

use serde::{Deserialize, Serialize};

use crate::normalized::NormalizedMessage;

/// Backend-specific handle carried across turns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContinuationToken {
    /// Stateless backends carry nothing
    #[default]
    None,
    /// Chained response identifier (sent as `previous_response_id`)
    Response { response_id: String },
    /// Thread plus the most recent run on it
    Thread {
        thread_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
    },
}

impl ContinuationToken {
    pub fn is_none(&self) -> bool {
        matches!(self, ContinuationToken::None)
    }

    pub fn response_id(&self) -> Option<&str> {
        match self {
            ContinuationToken::Response { response_id } => Some(response_id),
            _ => None,
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        match self {
            ContinuationToken::Thread { thread_id, .. } => Some(thread_id),
            _ => None,
        }
    }
}

/// Terminal status of a conversation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Completed,
    Error,
}

impl std::fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationStatus::Completed => write!(f, "completed"),
            ConversationStatus::Error => write!(f, "error"),
        }
    }
}

/// Mutable state of one conversation run
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    /// Transcript so far
    pub messages: Vec<NormalizedMessage>,
    /// Continuation handle for the active backend
    pub continuation: ContinuationToken,
    /// Current turn (0 before the first user message)
    pub turn: u32,
    /// Set once the run finishes
    pub status: Option<ConversationStatus>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// True before any backend call has produced a continuation token
    pub fn is_first_call(&self) -> bool {
        self.continuation.is_none()
    }

    /// Messages of completed turns (excludes a trailing user message)
    pub fn history_before(&self, turn: u32) -> impl Iterator<Item = &NormalizedMessage> {
        self.messages.iter().filter(move |m| m.turn < turn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuation_token_serialization() {
        let token = ContinuationToken::Thread {
            thread_id: "thread_1".to_string(),
            run_id: Some("run_2".to_string()),
        };
        let value = serde_json::to_value(&token).unwrap();
        assert_eq!(value["type"], "thread");
        assert_eq!(value["run_id"], "run_2");

        let none: ContinuationToken = serde_json::from_str(r#"{"type": "none"}"#).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_history_before_excludes_current_turn() {
        let mut state = ConversationState::new();
        state.messages.push(NormalizedMessage::user("a", 1));
        state.messages.push(NormalizedMessage::assistant("b", 1));
        state.messages.push(NormalizedMessage::user("c", 2));

        let history: Vec<_> = state.history_before(2).collect();
        assert_eq!(history.len(), 2);
        assert!(state.is_first_call());
    }
}
