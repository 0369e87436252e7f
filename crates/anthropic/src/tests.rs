// Unit tests for Anthropic driver

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use promptlab_core::config::{ExecutionMode, InterlocutorConfig, InterlocutorProvider};
use promptlab_core::llm_driver::{LlmCallConfig, LlmDriver, LlmMessage};
use promptlab_core::registry::BackendRegistry;
use promptlab_core::UsageTotals;

use crate::{register_interlocutor, AnthropicLlmDriver, DEFAULT_API_URL};

fn endpoint(server: &MockServer) -> String {
    format!("{}/v1/messages", server.uri())
}

#[test]
fn test_driver_with_api_key() {
    let driver = AnthropicLlmDriver::new("test-key");
    assert_eq!(driver.api_url(), DEFAULT_API_URL);
    let debug = format!("{driver:?}");
    assert!(debug.contains("AnthropicLlmDriver"));
    assert!(!debug.contains("test-key"));
}

#[tokio::test]
async fn test_completion_sends_headers_and_system_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-3-5-haiku-latest",
            "system": "You are a customer",
            "max_tokens": 1024
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": "Where is my parcel?"}],
            "usage": {"input_tokens": 20, "output_tokens": 6}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let driver = AnthropicLlmDriver::with_base_url("test-key", endpoint(&server));
    let response = driver
        .chat_completion(
            vec![
                LlmMessage::system("You are a customer"),
                LlmMessage::user("Write your next message"),
            ],
            &LlmCallConfig::new("claude-3-5-haiku-latest"),
        )
        .await
        .unwrap();

    assert_eq!(response.text, "Where is my parcel?");
    assert_eq!(response.usage, Some(UsageTotals::new(20, 6, 26)));
    assert_eq!(response.raw["id"], "msg_1");
}

#[tokio::test]
async fn test_error_status_carries_class_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(529).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let driver = AnthropicLlmDriver::with_base_url("test-key", endpoint(&server));
    let err = driver
        .chat_completion(
            vec![LlmMessage::user("Hi")],
            &LlmCallConfig::new("claude-3-5-haiku-latest"),
        )
        .await
        .unwrap_err();

    assert_eq!(err.class(), "OverloadedError");
    assert!(err.to_string().contains("overloaded"));
}

#[test]
fn test_register_interlocutor() {
    let mut registry = BackendRegistry::new();
    register_interlocutor(&mut registry);

    let config = InterlocutorConfig {
        provider: InterlocutorProvider::Anthropic,
        api_key: Some("test-key".to_string()),
        ..Default::default()
    };
    assert!(registry.create_interlocutor(&config, ExecutionMode::Live).is_ok());

    // Mock mode has no factory in a bare registry
    assert!(registry.create_interlocutor(&config, ExecutionMode::Mock).is_err());
}
