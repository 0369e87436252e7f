// Function-call resolution loop
//
// Drives tool calls to completion for one backend turn, bounded by a maximum
// number of submit iterations. Given K iterations the loop produces at most
// K+1 responses (the initial one plus one per submission).
//
// Hitting the bound with calls still pending is a degraded outcome, not an
// error: the pending calls stay in `all_tool_calls` and the caller logs it.
//
// Call ids are unique within one response only. A later iteration may reuse
// an id, and both calls are kept.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::normalized::UsageTotals;
use crate::normalizer::{dedupe_tool_calls, ResponseNormalizer};
use crate::tokens::aggregate_from_responses;
use crate::tool_types::{ToolCall, ToolExchange};
use crate::wire::responses::InputItem;

/// Default bound on tool submit iterations per turn
pub const DEFAULT_MAX_TOOL_ITERATIONS: u32 = 5;

// ============================================================================
// ToolExecutor - executes function tools
// ============================================================================

/// Executes function tool calls requested by a backend
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute a single tool call and return its output payload
    async fn execute(&self, call: &ToolCall) -> Result<Value>;
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, call: &ToolCall) -> Result<Value> {
        (**self).execute(call).await
    }
}

// ============================================================================
// ToolCallBackend - one backend's side of the loop
// ============================================================================

/// Backend side of a tool round-trip within one turn
#[async_trait]
pub trait ToolCallBackend: Send {
    /// Normalizer for this backend's raw responses
    fn normalizer(&self) -> &dyn ResponseNormalizer;

    /// Tool calls a raw response is waiting on
    fn pending_tool_calls(&self, raw: &Value) -> Vec<ToolCall> {
        self.normalizer().normalize_single_response(raw).tool_calls
    }

    /// Submit tool outputs answering `previous`; returns the next raw response
    async fn submit_tool_outputs(
        &mut self,
        previous: &Value,
        exchanges: &[ToolExchange],
    ) -> Result<Value>;
}

/// Result of resolving the tool calls of one turn
#[derive(Debug, Clone)]
pub struct FunctionCallOutcome {
    /// Latest raw response
    pub final_response: Value,
    /// Every tool call seen, deduplicated per iteration, including calls
    /// left pending
    pub all_tool_calls: Vec<ToolCall>,
    /// Initial response followed by one response per submission
    pub all_responses: Vec<Value>,
    /// Usage summed across `all_responses`
    pub usage: UsageTotals,
    /// Iterations performed
    pub iterations: u32,
    /// True when the bound was hit with calls still pending
    pub exhausted: bool,
}

/// Bounded tool-call resolution loop
#[derive(Clone)]
pub struct FunctionCallHandler {
    executor: Arc<dyn ToolExecutor>,
    max_iterations: u32,
}

impl std::fmt::Debug for FunctionCallHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionCallHandler")
            .field("max_iterations", &self.max_iterations)
            .finish_non_exhaustive()
    }
}

impl FunctionCallHandler {
    pub fn new(executor: Arc<dyn ToolExecutor>, max_iterations: u32) -> Self {
        Self {
            executor,
            max_iterations,
        }
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Resolve tool calls starting from `initial`
    pub async fn resolve(
        &self,
        backend: &mut dyn ToolCallBackend,
        initial: Value,
    ) -> Result<FunctionCallOutcome> {
        let mut all_responses = vec![initial];
        let mut all_tool_calls = Vec::new();
        let mut iterations = 0;
        let mut exhausted = false;

        loop {
            let latest = all_responses.last().cloned().unwrap_or(Value::Null);
            let pending = dedupe_tool_calls(backend.pending_tool_calls(&latest));
            if pending.is_empty() {
                break;
            }

            if iterations >= self.max_iterations {
                warn!(
                    max_iterations = self.max_iterations,
                    pending = pending.len(),
                    "Tool iteration bound reached with calls still pending"
                );
                all_tool_calls.extend(pending);
                exhausted = true;
                break;
            }

            iterations += 1;
            debug!(
                iteration = iterations,
                tool_calls = pending.len(),
                "Executing tool calls"
            );

            let exchanges = self.execute_all(&pending).await;
            all_tool_calls.extend(pending);

            let next = backend.submit_tool_outputs(&latest, &exchanges).await?;
            all_responses.push(next);
        }

        let usage = aggregate_from_responses(&all_responses);
        let final_response = all_responses.last().cloned().unwrap_or(Value::Null);
        Ok(FunctionCallOutcome {
            final_response,
            all_tool_calls,
            all_responses,
            usage,
            iterations,
            exhausted,
        })
    }

    /// Execute calls in order; executor failures become error payloads
    async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolExchange> {
        let mut exchanges = Vec::with_capacity(calls.len());
        for call in calls {
            let output = match self.executor.execute(call).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(
                        tool_call_id = %call.id,
                        tool_name = %call.name,
                        error = %e,
                        "Tool execution failed, returning error payload"
                    );
                    json!({ "error": e.to_string() })
                }
            };
            exchanges.push(ToolExchange {
                call: call.clone(),
                output,
            });
        }
        exchanges
    }
}

/// Build the chained-response continuation input: each call record
/// immediately followed by its output record
pub fn interleave_call_outputs(exchanges: &[ToolExchange]) -> Vec<InputItem> {
    exchanges
        .iter()
        .flat_map(|exchange| {
            [
                InputItem::FunctionCall {
                    call_id: exchange.call.id.clone(),
                    name: exchange.call.name.clone(),
                    arguments: exchange.call.arguments_json(),
                },
                InputItem::FunctionCallOutput {
                    call_id: exchange.call.id.clone(),
                    output: exchange.output_string(),
                },
            ]
        })
        .collect()
}
