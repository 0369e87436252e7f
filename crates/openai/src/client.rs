// OpenAI HTTP client
//
// One client speaks all three OpenAI-shaped protocols. It only moves JSON:
// request bodies come from the core wire types, responses are returned raw
// for the adapters and normalizers to interpret.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use promptlab_core::backends::{AssistantsApi, ChatCompletionsApi, ResponsesApi};
use promptlab_core::error::{EngineError, Result};
use promptlab_core::wire::assistants::{
    CreateMessageRequest, CreateRunRequest, SubmitToolOutputsRequest, ToolOutput,
};
use promptlab_core::wire::chat::ChatCompletionRequest;
use promptlab_core::wire::responses::ResponsesRequest;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const ASSISTANTS_BETA: &str = "assistants=v2";
/// Page size for run message and run step listings
const LIST_LIMIT: &str = "100";

/// Error class for an HTTP status, named after the upstream SDK's exceptions
pub(crate) fn status_error_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "BadRequestError",
        401 => "AuthenticationError",
        403 => "PermissionDeniedError",
        404 => "NotFoundError",
        409 => "ConflictError",
        422 => "UnprocessableEntityError",
        429 => "RateLimitError",
        s if s >= 500 => "InternalServerError",
        _ => "APIStatusError",
    }
}

/// Transport error class for a failed send
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> EngineError {
    let class = if e.is_timeout() {
        "APITimeoutError"
    } else {
        "APIConnectionError"
    };
    EngineError::backend(class, format!("Failed to send request to {provider}: {e}"))
}

/// Client for the OpenAI REST API
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Create a new client with the given API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a new client with a custom base URL (e.g. a compatible proxy)
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Client from optional config values; the base URL defaults to the public API
    pub fn from_parts(api_key: Option<&str>, base_url: Option<&str>) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| EngineError::config("OpenAI API key is required"))?;
        Ok(Self::with_base_url(
            api_key,
            base_url.unwrap_or(DEFAULT_BASE_URL),
        ))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> RequestBuilder {
        self.http
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.http.get(self.url(path)).bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::backend(
                status_error_class(status),
                format!("OpenAI API error ({status}): {body}"),
            ));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| EngineError::protocol(format!("OpenAI returned a non-JSON body: {e}")))
    }

    async fn send_beta(&self, request: RequestBuilder) -> Result<Value> {
        self.send(request.header("OpenAI-Beta", ASSISTANTS_BETA)).await
    }
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl ChatCompletionsApi for OpenAiClient {
    async fn create_chat_completion(&self, request: &ChatCompletionRequest) -> Result<Value> {
        debug!(model = %request.model, messages = request.messages.len(), "POST chat/completions");
        self.send(self.post("chat/completions", request)).await
    }
}

#[async_trait]
impl ResponsesApi for OpenAiClient {
    async fn create_response(&self, request: &ResponsesRequest) -> Result<Value> {
        debug!(
            model = %request.model,
            previous_response_id = ?request.previous_response_id,
            "POST responses"
        );
        self.send(self.post("responses", request)).await
    }
}

#[async_trait]
impl AssistantsApi for OpenAiClient {
    async fn create_thread(&self) -> Result<Value> {
        self.send_beta(self.post("threads", &serde_json::json!({})))
            .await
    }

    async fn create_message(&self, thread_id: &str, content: &str) -> Result<Value> {
        let body = CreateMessageRequest {
            role: "user".to_string(),
            content: content.to_string(),
        };
        self.send_beta(self.post(&format!("threads/{thread_id}/messages"), &body))
            .await
    }

    async fn create_run(&self, thread_id: &str, request: &CreateRunRequest) -> Result<Value> {
        self.send_beta(self.post(&format!("threads/{thread_id}/runs"), request))
            .await
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<Value> {
        self.send_beta(self.get(&format!("threads/{thread_id}/runs/{run_id}")))
            .await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Value> {
        let body = SubmitToolOutputsRequest {
            tool_outputs: outputs.to_vec(),
        };
        self.send_beta(self.post(
            &format!("threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &body,
        ))
        .await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Value> {
        self.send_beta(self.post(
            &format!("threads/{thread_id}/runs/{run_id}/cancel"),
            &serde_json::json!({}),
        ))
        .await
    }

    async fn list_run_steps(&self, thread_id: &str, run_id: &str) -> Result<Value> {
        self.send_beta(
            self.get(&format!("threads/{thread_id}/runs/{run_id}/steps"))
                .query(&[("limit", LIST_LIMIT), ("order", "asc")]),
        )
        .await
    }

    async fn list_run_messages(&self, thread_id: &str, run_id: &str) -> Result<Value> {
        self.send_beta(
            self.get(&format!("threads/{thread_id}/messages"))
                .query(&[("run_id", run_id), ("limit", LIST_LIMIT), ("order", "asc")]),
        )
        .await
    }
}
