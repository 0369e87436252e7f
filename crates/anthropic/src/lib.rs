// Anthropic interlocutor driver for Promptlab
//
// Registers a live Anthropic factory for the simulated user. The backends
// under test are OpenAI-shaped; Anthropic only ever plays the user.

mod driver;

#[cfg(test)]
mod tests;

pub use driver::{AnthropicLlmDriver, DEFAULT_API_URL, DEFAULT_MAX_TOKENS};

use std::sync::Arc;

use promptlab_core::config::{ExecutionMode, InterlocutorProvider};
use promptlab_core::error::EngineError;
use promptlab_core::registry::BackendRegistry;

/// Register the live Anthropic interlocutor factory.
///
/// `base_url` in the interlocutor config is the full messages endpoint.
pub fn register_interlocutor(registry: &mut BackendRegistry) {
    registry.register_interlocutor(
        InterlocutorProvider::Anthropic,
        ExecutionMode::Live,
        |config| {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| EngineError::config("Anthropic API key is required"))?;
            let driver = match config.base_url.as_deref() {
                Some(url) => AnthropicLlmDriver::with_base_url(api_key, url),
                None => AnthropicLlmDriver::new(api_key),
            };
            Ok(Arc::new(driver))
        },
    );
}
