// Backend registry
//
// Provider crates register live factories at startup; the core pre-registers
// the deterministic fakes. Adapters and interlocutor drivers are built once
// per run from configuration, so the mock/live decision is made here and
// nowhere else.
//
// API keys must be supplied on the config. The registry never reads them from
// the environment.

use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::{
    AssistantsAdapter, BackendKind, BoxedBackendAdapter, ChatCompletionsAdapter, ResponsesAdapter,
};
use crate::config::{BackendConfig, ExecutionMode, InterlocutorConfig, InterlocutorProvider};
use crate::error::{EngineError, Result};
use crate::function_calls::ToolExecutor;
use crate::llm_driver::LlmDriver;
use crate::memory::{MockAssistantsApi, MockChatCompletionsApi, MockResponsesApi, ScriptedDriver};

/// Assistant id used by the thread/run fake when none is configured
pub const MOCK_ASSISTANT_ID: &str = "asst_mock";

/// Factory building a backend adapter from configuration
pub type AdapterFactory = Arc<
    dyn Fn(&BackendConfig, Arc<dyn ToolExecutor>) -> Result<BoxedBackendAdapter> + Send + Sync,
>;

/// Factory building the interlocutor's driver from configuration
pub type InterlocutorFactory =
    Arc<dyn Fn(&InterlocutorConfig) -> Result<Arc<dyn LlmDriver>> + Send + Sync>;

/// Registry of backend adapter and interlocutor driver factories
#[derive(Clone, Default)]
pub struct BackendRegistry {
    adapters: HashMap<(BackendKind, ExecutionMode), AdapterFactory>,
    interlocutors: HashMap<(InterlocutorProvider, ExecutionMode), InterlocutorFactory>,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("interlocutors", &self.interlocutors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with mock factories for every backend and interlocutor provider
    pub fn with_mocks() -> Self {
        let mut registry = Self::new();

        registry.register(BackendKind::ChatCompletions, ExecutionMode::Mock, |config, executor| {
            Ok(Box::new(ChatCompletionsAdapter::new(
                Arc::new(MockChatCompletionsApi::new()),
                executor,
                config.clone(),
            )))
        });
        registry.register(BackendKind::Responses, ExecutionMode::Mock, |config, executor| {
            Ok(Box::new(ResponsesAdapter::new(
                Arc::new(MockResponsesApi::new()),
                executor,
                config.clone(),
            )))
        });
        registry.register(BackendKind::Assistants, ExecutionMode::Mock, |config, executor| {
            let mut config = config.clone();
            if config.assistant_id.is_none() {
                config.assistant_id = Some(MOCK_ASSISTANT_ID.to_string());
            }
            Ok(Box::new(AssistantsAdapter::new(
                Arc::new(MockAssistantsApi::new()),
                executor,
                config,
            )?))
        });

        for provider in [InterlocutorProvider::Openai, InterlocutorProvider::Anthropic] {
            registry.register_interlocutor(provider, ExecutionMode::Mock, |config| {
                Ok(Arc::new(ScriptedDriver::new(config.script.clone())))
            });
        }
        registry
    }

    /// Register an adapter factory for a backend in one execution mode
    pub fn register<F>(&mut self, kind: BackendKind, mode: ExecutionMode, factory: F)
    where
        F: Fn(&BackendConfig, Arc<dyn ToolExecutor>) -> Result<BoxedBackendAdapter>
            + Send
            + Sync
            + 'static,
    {
        self.adapters.insert((kind, mode), Arc::new(factory));
    }

    /// Register an interlocutor driver factory
    pub fn register_interlocutor<F>(
        &mut self,
        provider: InterlocutorProvider,
        mode: ExecutionMode,
        factory: F,
    ) where
        F: Fn(&InterlocutorConfig) -> Result<Arc<dyn LlmDriver>> + Send + Sync + 'static,
    {
        self.interlocutors.insert((provider, mode), Arc::new(factory));
    }

    /// Build the adapter for a backend configuration.
    ///
    /// Live configurations must carry an API key. Returns
    /// `BackendNotRegistered` if no factory exists for the backend and mode.
    pub fn create_adapter(
        &self,
        config: &BackendConfig,
        executor: Arc<dyn ToolExecutor>,
    ) -> Result<BoxedBackendAdapter> {
        if config.mode == ExecutionMode::Live && config.api_key.as_deref().unwrap_or("").is_empty()
        {
            return Err(EngineError::config(format!(
                "API key is required for live {} backend",
                config.backend
            )));
        }

        let factory = self
            .adapters
            .get(&(config.backend, config.mode))
            .ok_or_else(|| {
                EngineError::BackendNotRegistered(format!("{} ({})", config.backend, config.mode))
            })?;
        factory(config, executor)
    }

    /// Build the interlocutor driver; `mode` follows the backend's mode
    pub fn create_interlocutor(
        &self,
        config: &InterlocutorConfig,
        mode: ExecutionMode,
    ) -> Result<Arc<dyn LlmDriver>> {
        if mode == ExecutionMode::Live && config.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(EngineError::config(format!(
                "API key is required for live {} interlocutor",
                config.provider
            )));
        }

        let factory = self
            .interlocutors
            .get(&(config.provider, mode))
            .ok_or_else(|| {
                EngineError::BackendNotRegistered(format!(
                    "{} interlocutor ({mode})",
                    config.provider
                ))
            })?;
        factory(config)
    }

    /// Check if an adapter factory is registered
    pub fn has_adapter(&self, kind: BackendKind, mode: ExecutionMode) -> bool {
        self.adapters.contains_key(&(kind, mode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockToolExecutor;

    fn executor() -> Arc<dyn ToolExecutor> {
        Arc::new(MockToolExecutor::new())
    }

    #[test]
    fn test_mocks_registered_for_all_backends() {
        let registry = BackendRegistry::with_mocks();
        for kind in [
            BackendKind::ChatCompletions,
            BackendKind::Responses,
            BackendKind::Assistants,
        ] {
            assert!(registry.has_adapter(kind, ExecutionMode::Mock));
            assert!(!registry.has_adapter(kind, ExecutionMode::Live));
            let adapter = registry
                .create_adapter(&BackendConfig::mock(kind), executor())
                .unwrap();
            assert_eq!(adapter.kind(), kind);
        }
    }

    #[test]
    fn test_live_without_api_key_is_configuration_error() {
        let registry = BackendRegistry::with_mocks();
        let err = registry
            .create_adapter(&BackendConfig::new(BackendKind::Responses), executor())
            .err()
            .unwrap();
        assert_eq!(err.class(), "ConfigurationError");
    }

    #[test]
    fn test_missing_live_factory() {
        let registry = BackendRegistry::with_mocks();
        let config = BackendConfig::new(BackendKind::Responses).with_api_key("sk-test");
        let err = registry.create_adapter(&config, executor()).err().unwrap();
        assert_eq!(err.class(), "BackendNotRegistered");
    }

    #[test]
    fn test_custom_factory_is_used() {
        let mut registry = BackendRegistry::new();
        registry.register(BackendKind::ChatCompletions, ExecutionMode::Live, |config, executor| {
            Ok(Box::new(ChatCompletionsAdapter::new(
                Arc::new(MockChatCompletionsApi::new()),
                executor,
                config.clone(),
            )))
        });
        let config = BackendConfig::new(BackendKind::ChatCompletions).with_api_key("sk-test");
        assert!(registry.create_adapter(&config, executor()).is_ok());
    }

    #[tokio::test]
    async fn test_mock_interlocutor_replays_script() {
        let registry = BackendRegistry::with_mocks();
        let config = InterlocutorConfig {
            script: vec!["What about returns?".to_string()],
            ..Default::default()
        };
        let driver = registry
            .create_interlocutor(&config, ExecutionMode::Mock)
            .unwrap();
        let reply = driver
            .chat_completion(
                vec![crate::llm_driver::LlmMessage::user("prompt")],
                &crate::llm_driver::LlmCallConfig::new("gpt-4o-mini"),
            )
            .await
            .unwrap();
        assert_eq!(reply.text, "What about returns?");
    }
}
