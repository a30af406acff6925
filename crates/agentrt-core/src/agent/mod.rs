//! The agent loop: maintains the transcript and pending tool-call queue,
//! samples the model, and dispatches tool calls through the policy
//! gateway.
//!
//! Grounded directly on `agent::orchestrator::AgenticOrchestrator::run_inner`:
//! the per-iteration shape (inject context -> sample -> check tool calls ->
//! execute tools -> save -> loop) is the same, generalized behind
//! `ModelProvider` instead of a hardcoded streaming client.

pub mod compaction;

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::ai::{ModelProvider, ProviderError, ResponseItem, ResponsesRequest, ToolChoice};
use crate::error::ReservedPolicyCode;
use crate::event::{EventKind, ToolCallResultRecord, Transcript};
use crate::handlers::{reduce, Handler, LoopDecision, ReducerConflict};
use crate::policy::PolicyGateway;
use crate::tool::{ToolCallResult, ToolSchema};

/// Mirrors `AgentLoop::tool_policy` in the spec, translated into the
/// provider's `ToolChoice` at sampling time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPolicy {
    AllowAnyToolOrText,
    RequireAnyTool,
    ForbidAllTools,
    RequireSpecific { names: Vec<String> },
}

/// The teacher's fixed `MAX_ITERATIONS = 50` made configurable, same
/// default.
#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    pub max_iterations: usize,
    pub parallel_tool_calls: bool,
    pub max_parallel_tool_calls: usize,
    pub reasoning_effort: Option<String>,
    pub reasoning_summary: Option<String>,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            parallel_tool_calls: false,
            max_parallel_tool_calls: 8,
            reasoning_effort: None,
            reasoning_summary: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Reducer(#[from] ReducerConflict),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("max_iterations ({0}) exceeded without a terminal assistant_text")]
    MaxIterationsExceeded(usize),
}

#[derive(Debug)]
pub enum AgentOutcome {
    AssistantText(String),
    Aborted,
}

/// One pending invocation: `(call_id, name, arguments)`.
type PendingCall = (String, String, Value);

pub struct Agent {
    transcript: Transcript,
    pending_function_calls: Vec<PendingCall>,
    tool_policy: ToolPolicy,
    handlers: Vec<Arc<dyn Handler>>,
    client: Arc<dyn ModelProvider>,
    gateway: Arc<PolicyGateway>,
    config: AgentLoopConfig,
    model: String,
    agent_id: String,
}

impl Agent {
    pub fn new(
        agent_id: impl Into<String>,
        model: impl Into<String>,
        client: Arc<dyn ModelProvider>,
        gateway: Arc<PolicyGateway>,
        tool_policy: ToolPolicy,
        handlers: Vec<Arc<dyn Handler>>,
        config: AgentLoopConfig,
    ) -> Self {
        Self::from_transcript(
            agent_id,
            model,
            Transcript::new(),
            client,
            gateway,
            tool_policy,
            handlers,
            config,
        )
    }

    /// Resume from a transcript rebuilt by `persistence::load_events`. Any
    /// tool calls left without a matching `function_call_output` are NOT
    /// re-enqueued: the spec's replay rule covers UI projection, not
    /// resuming in-flight calls, which is out of scope for the core.
    pub fn from_transcript(
        agent_id: impl Into<String>,
        model: impl Into<String>,
        transcript: Transcript,
        client: Arc<dyn ModelProvider>,
        gateway: Arc<PolicyGateway>,
        tool_policy: ToolPolicy,
        handlers: Vec<Arc<dyn Handler>>,
        config: AgentLoopConfig,
    ) -> Self {
        Self {
            transcript,
            pending_function_calls: Vec::new(),
            tool_policy,
            handlers,
            client,
            gateway,
            config,
            model: model.into(),
            agent_id: agent_id.into(),
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn append_notify(&mut self, kind: EventKind) {
        let event = self.transcript.append(kind).clone();
        for handler in &self.handlers {
            handler.on_event(&event).await;
        }
    }

    /// Drive the loop to completion: an `assistant_text` with no pending
    /// calls, an explicit `Abort`, or `max_iterations` exhausted.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<AgentOutcome, AgentError> {
        for _ in 0..self.config.max_iterations {
            if cancel.is_cancelled() {
                self.gateway.abort_all_pending();
                return Ok(AgentOutcome::Aborted);
            }

            let decision = reduce(&self.handlers, &self.transcript).await?;
            let mut skip_sampling = false;

            match decision {
                LoopDecision::Abort => {
                    self.gateway.abort_all_pending();
                    return Ok(AgentOutcome::Aborted);
                }
                LoopDecision::Compact { keep } => {
                    compaction::apply(&mut self.transcript, self.pending_function_calls.is_empty(), keep);
                }
                LoopDecision::InjectItems { items } => {
                    for item in items {
                        if let EventKind::ToolCall { name, args_json, call_id } = &item {
                            self.pending_function_calls.push((
                                call_id.clone(),
                                name.clone(),
                                args_json.clone(),
                            ));
                        }
                        self.append_notify(item).await;
                    }
                    skip_sampling = true;
                }
                LoopDecision::NoAction => {}
            }

            if !skip_sampling {
                if let Some(outcome) = self.sample_and_maybe_finish().await? {
                    return Ok(outcome);
                }
            }

            if self.execute_pending_tool_calls(cancel).await {
                // §4.5's tie-break: a DENY_ABORT result ends the turn the
                // moment it's persisted, bypassing the reducer entirely —
                // this is the one error outcome step 4 itself halts on.
                self.gateway.abort_all_pending();
                return Ok(AgentOutcome::Aborted);
            }
        }

        Err(AgentError::MaxIterationsExceeded(self.config.max_iterations))
    }

    fn effective_tool_choice(&self, available: &[ToolSchema]) -> ToolChoice {
        match &self.tool_policy {
            ToolPolicy::AllowAnyToolOrText => ToolChoice::AllowAny,
            ToolPolicy::RequireAnyTool => ToolChoice::Required,
            ToolPolicy::ForbidAllTools => ToolChoice::Forbidden,
            ToolPolicy::RequireSpecific { names } => {
                let available_names: HashSet<&str> = available.iter().map(|t| t.name.as_str()).collect();
                let intersection = names
                    .iter()
                    .filter(|n| available_names.contains(n.as_str()))
                    .cloned()
                    .collect();
                ToolChoice::OneOf { names: intersection }
            }
        }
    }

    /// Sample once. Returns `Some(outcome)` only when the turn terminates
    /// (`assistant_text` with an empty pending queue).
    async fn sample_and_maybe_finish(&mut self) -> Result<Option<AgentOutcome>, AgentError> {
        let tools = self.gateway.inner_list_tools().await;
        let tool_choice = self.effective_tool_choice(&tools);

        let input: Vec<EventKind> = self.transcript.events().iter().map(|e| e.kind.clone()).collect();
        let request = ResponsesRequest {
            input: serde_json::to_value(&input).unwrap_or(Value::Null),
            tools,
            tool_choice,
            reasoning_effort: self.config.reasoning_effort.clone(),
            reasoning_summary: self.config.reasoning_summary.clone(),
        };

        let request_id = uuid::Uuid::new_v4().to_string();
        self.append_notify(EventKind::ApiRequest {
            request: serde_json::to_value(&request).unwrap_or(Value::Null),
            model: self.model.clone(),
            request_id: request_id.clone(),
            phase_number: self.transcript.len() as u64,
        })
        .await;

        let response = self.client.responses_create(request).await?;

        self.append_notify(EventKind::Response {
            response_id: response.id.clone(),
            request_id,
            usage: response.usage.clone(),
            model: self.model.clone(),
            created_at: chrono::Utc::now(),
        })
        .await;

        let response_id = response.id.clone();
        let mut assistant_text: Option<String> = None;
        for item in response.output {
            match item {
                ResponseItem::Message { text } => {
                    assistant_text = Some(text.clone());
                    self.append_notify(EventKind::AssistantText { text }).await;
                }
                ResponseItem::FunctionCall { name, arguments, call_id } => {
                    self.pending_function_calls
                        .push((call_id.clone(), name.clone(), arguments.clone()));
                    self.append_notify(EventKind::ToolCall { name, args_json: arguments, call_id })
                        .await;
                }
                ResponseItem::Reasoning { data } => {
                    self.append_notify(EventKind::Reasoning {
                        data,
                        response_id: response_id.clone(),
                    })
                    .await;
                }
            }
        }

        // Per §4.5's tie-break: if BOTH assistant_text and tool calls were
        // produced, tool calls run first and the text is deferred.
        if let Some(text) = assistant_text {
            if self.pending_function_calls.is_empty() {
                return Ok(Some(AgentOutcome::AssistantText(text)));
            }
        }
        Ok(None)
    }

    /// Returns `true` if any result persisted here carried
    /// `POLICY_DENIED_ABORT` — the caller must end the turn immediately in
    /// that case rather than continue to the next reducer pass.
    async fn execute_pending_tool_calls(&mut self, cancel: &CancellationToken) -> bool {
        let pending = std::mem::take(&mut self.pending_function_calls);
        if pending.is_empty() {
            return false;
        }

        let results: Vec<(String, ToolCallResult)> = if self.config.parallel_tool_calls {
            self.execute_parallel(pending, cancel).await
        } else {
            self.execute_serial(pending, cancel).await
        };

        let mut denied_abort = false;
        for (call_id, result) in results {
            if result.reserved_code == Some(ReservedPolicyCode::PolicyDeniedAbort) {
                denied_abort = true;
            }
            self.append_notify(EventKind::FunctionCallOutput {
                call_id,
                result: ToolCallResultRecord {
                    content_text: result.text(),
                    structured_content: result.structured_content,
                    is_error: result.is_error,
                    reserved_code: result.reserved_code.map(|c| c.code()),
                },
            })
            .await;
        }
        denied_abort
    }

    /// Preserves dispatch order, per §5's ordering guarantee.
    async fn execute_serial(
        &self,
        pending: Vec<PendingCall>,
        cancel: &CancellationToken,
    ) -> Vec<(String, ToolCallResult)> {
        let mut results = Vec::with_capacity(pending.len());
        for (call_id, name, args) in pending {
            let result = self.gateway.call(&call_id, &name, args, cancel).await;
            results.push((call_id, result));
        }
        results
    }

    /// Bounded fan-out; results are reordered back into dispatch order
    /// before returning, so the transcript never reflects completion
    /// order.
    async fn execute_parallel(
        &self,
        pending: Vec<PendingCall>,
        cancel: &CancellationToken,
    ) -> Vec<(String, ToolCallResult)> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.config.max_parallel_tool_calls.max(1)));
        let mut handles = Vec::with_capacity(pending.len());
        for (call_id, name, args) in pending {
            let semaphore = semaphore.clone();
            let gateway = self.gateway.clone();
            let cancel = cancel.clone();
            let task_call_id = call_id.clone();
            handles.push((
                call_id,
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("semaphore is never closed");
                    gateway.call(&task_call_id, &name, args, &cancel).await
                }),
            ));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (call_id, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| ToolCallResult::error(format!("tool task panicked: {e}")));
            results.push((call_id, result));
        }
        results
    }
}
