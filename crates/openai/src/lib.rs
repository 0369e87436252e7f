// OpenAI transports for Promptlab
//
// Live HTTP implementations of the core transport traits:
// - ChatCompletionsApi: POST /chat/completions
// - ResponsesApi: POST /responses
// - AssistantsApi: /threads endpoints (assistants v2 beta header)
//
// `register_backends` wires them into a BackendRegistry for live mode.

mod client;
mod driver;


pub use client::{OpenAiClient, DEFAULT_BASE_URL};
pub use driver::OpenAiChatDriver;

use std::sync::Arc;

use promptlab_core::backends::{
    AssistantsAdapter, BackendKind, ChatCompletionsAdapter, ResponsesAdapter,
};
use promptlab_core::config::{BackendConfig, ExecutionMode, InterlocutorProvider};
use promptlab_core::error::Result;
use promptlab_core::registry::BackendRegistry;

fn client_for(config: &BackendConfig) -> Result<Arc<OpenAiClient>> {
    OpenAiClient::from_parts(config.api_key.as_deref(), config.base_url.as_deref()).map(Arc::new)
}

/// Register live factories for all three OpenAI backends and the OpenAI
/// interlocutor
pub fn register_backends(registry: &mut BackendRegistry) {
    registry.register(
        BackendKind::ChatCompletions,
        ExecutionMode::Live,
        |config, executor| {
            Ok(Box::new(ChatCompletionsAdapter::new(
                client_for(config)?,
                executor,
                config.clone(),
            )))
        },
    );
    registry.register(BackendKind::Responses, ExecutionMode::Live, |config, executor| {
        Ok(Box::new(ResponsesAdapter::new(
            client_for(config)?,
            executor,
            config.clone(),
        )))
    });
    registry.register(BackendKind::Assistants, ExecutionMode::Live, |config, executor| {
        Ok(Box::new(AssistantsAdapter::new(
            client_for(config)?,
            executor,
            config.clone(),
        )?))
    });

    registry.register_interlocutor(
        InterlocutorProvider::Openai,
        ExecutionMode::Live,
        |config| {
            let client =
                OpenAiClient::from_parts(config.api_key.as_deref(), config.base_url.as_deref())?;
            Ok(Arc::new(OpenAiChatDriver::new(client)))
        },
    );
}
