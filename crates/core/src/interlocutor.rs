// Interlocutor simulator
//
// Generates the next simulated user turn through an auxiliary LLM call. The
// simulator is a plain two-party text exchange: it never sees tools or
// structured content.

use std::sync::Arc;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::llm_driver::{LlmCallConfig, LlmDriver, LlmMessage};
use crate::normalized::NormalizedMessage;

/// Sentinels that end a conversation naturally (matched case-insensitively)
pub const END_SENTINELS: [&str; 2] = ["[END CONVERSATION]", "[END]"];

/// Simulated user backed by an LLM driver
#[derive(Clone)]
pub struct InterlocutorSimulator {
    driver: Arc<dyn LlmDriver>,
    config: LlmCallConfig,
}

impl std::fmt::Debug for InterlocutorSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterlocutorSimulator")
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

impl InterlocutorSimulator {
    pub fn new(driver: Arc<dyn LlmDriver>, config: LlmCallConfig) -> Self {
        Self { driver, config }
    }

    /// Produce the next user message, or `None` when the conversation should
    /// end
    pub async fn generate_next_message(
        &self,
        directive: &str,
        transcript: &[NormalizedMessage],
        turn: u32,
    ) -> Result<Option<String>> {
        let prompt = build_prompt(directive, transcript, turn);
        let response = self
            .driver
            .chat_completion(vec![LlmMessage::user(prompt)], &self.config)
            .await
            .map_err(|e| EngineError::simulator(e.to_string()))?;

        let text = response.text.trim();
        if is_termination(text) {
            debug!(turn, "Interlocutor signalled end of conversation");
            return Ok(None);
        }
        Ok(Some(text.to_string()))
    }
}

/// Empty text or any sentinel ends the conversation
pub fn is_termination(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return true;
    }
    let upper = trimmed.to_uppercase();
    END_SENTINELS.iter().any(|sentinel| upper.contains(sentinel))
}

/// One `ROLE: content` line per message
pub fn transcript_lines(transcript: &[NormalizedMessage]) -> String {
    transcript
        .iter()
        .map(|m| format!("{}: {}", m.role.to_string().to_uppercase(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Prompt asking the auxiliary model for the next user utterance
pub fn build_prompt(directive: &str, transcript: &[NormalizedMessage], turn: u32) -> String {
    format!(
        "You are simulating the USER in a conversation with an AI assistant.\n\
         \n\
         Your instructions:\n\
         {directive}\n\
         \n\
         Conversation so far:\n\
         {transcript}\n\
         \n\
         Write the user's message for turn {turn}. Respond with ONLY the next user \
         message, 1-3 sentences, with no role prefix or commentary. If the conversation \
         has reached a natural end, respond with [END CONVERSATION] instead.",
        directive = directive.trim(),
        transcript = transcript_lines(transcript),
        turn = turn,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ScriptedDriver;

    fn simulator(driver: Arc<ScriptedDriver>) -> InterlocutorSimulator {
        InterlocutorSimulator::new(driver, LlmCallConfig::new("gpt-4o-mini"))
    }

    #[test]
    fn test_termination_detection() {
        assert!(is_termination(""));
        assert!(is_termination("   \n"));
        assert!(is_termination("[END]"));
        assert!(is_termination("Thanks, bye! [end conversation]"));
        assert!(is_termination("[End]"));
        assert!(!is_termination("What about the END of the month?"));
        assert!(!is_termination("Can you help me?"));
    }

    #[test]
    fn test_transcript_lines() {
        let transcript = vec![
            NormalizedMessage::user("Hi", 1),
            NormalizedMessage::assistant("Hello!", 1),
        ];
        assert_eq!(transcript_lines(&transcript), "USER: Hi\nASSISTANT: Hello!");
        let prompt = build_prompt("You are a customer", &transcript, 2);
        assert!(prompt.contains("You are a customer"));
        assert!(prompt.contains("ASSISTANT: Hello!"));
        assert!(prompt.contains("[END CONVERSATION]"));
    }

    #[tokio::test]
    async fn test_generate_returns_trimmed_text() {
        let driver = Arc::new(ScriptedDriver::new(vec!["  Where is my order?  "]));
        let next = simulator(driver.clone())
            .generate_next_message("customer", &[], 2)
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some("Where is my order?"));
        assert_eq!(driver.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_generate_detects_sentinel() {
        let driver = Arc::new(ScriptedDriver::new(vec!["Great, thanks! [END]"]));
        let next = simulator(driver)
            .generate_next_message("customer", &[], 3)
            .await
            .unwrap();
        assert!(next.is_none());
    }

    #[tokio::test]
    async fn test_driver_failure_is_interlocutor_error() {
        let driver = Arc::new(ScriptedDriver::failing("rate limited"));
        let err = simulator(driver)
            .generate_next_message("customer", &[], 2)
            .await
            .unwrap_err();
        assert_eq!(err.class(), "InterlocutorError");
    }
}
