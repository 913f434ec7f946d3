//! Mock implementations for testing
//!
//! These mocks enable run-loop testing without a real model.

use super::traits::RunObserver;
use crate::llm::{
    fragment_stream, Fragment, FragmentStream, LanguageModel, LlmError, ModelRequest, StepResult,
    Usage,
};
use crate::tools::{Tool, ToolCallRecord, ToolContext, ToolError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Scripted Model
// ============================================================================

/// Model that replays queued fragment scripts, one per turn
pub struct ScriptedModel {
    model_id: String,
    turns: Mutex<VecDeque<Result<Vec<Fragment>, LlmError>>>,
    /// Replayed whenever the queue is empty
    fallback: Option<Vec<Fragment>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            turns: Mutex::new(VecDeque::new()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Replay `fragments` for every turn once the queue drains
    #[must_use]
    pub fn with_fallback(mut self, fragments: Vec<Fragment>) -> Self {
        self.fallback = Some(fragments);
        self
    }

    /// Queue one turn's fragments
    pub fn queue_turn(&self, fragments: Vec<Fragment>) {
        self.turns.lock().unwrap().push_back(Ok(fragments));
    }

    /// Queue a failure to open the stream
    pub fn queue_error(&self, error: LlmError) {
        self.turns.lock().unwrap().push_back(Err(error));
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn stream(
        &self,
        request: &ModelRequest,
        _cancel: CancellationToken,
    ) -> Result<FragmentStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self.turns.lock().unwrap().pop_front();
        match next {
            Some(turn) => turn.map(fragment_stream),
            None => self
                .fallback
                .clone()
                .map(fragment_stream)
                .ok_or_else(|| LlmError::invalid_request("No scripted turn queued")),
        }
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Tool
// ============================================================================

/// One recorded tool execution
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub call_id: String,
    pub args: Value,
    /// Number of messages visible to the tool
    pub context_len: usize,
}

/// Tool with a fixed outcome
pub struct MockTool {
    name: String,
    id: Option<String>,
    outcome: Result<Value, String>,
    delay: Option<Duration>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockTool {
    pub fn succeeding(name: impl Into<String>, result: Value) -> Self {
        Self::new(name, Ok(result))
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, Err(message.into()))
    }

    fn new(name: impl Into<String>, outcome: Result<Value, String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            outcome,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Sleep before completing; cancellation cuts the sleep short
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Shared handle to recorded executions
    pub fn calls(&self) -> Arc<Mutex<Vec<RecordedCall>>> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    fn description(&self) -> String {
        format!("Mock {}", self.name)
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn run(&self, args: Value, ctx: ToolContext) -> Result<Value, ToolError> {
        self.calls.lock().unwrap().push(RecordedCall {
            call_id: ctx.call_id.clone(),
            args,
            context_len: ctx.context_messages.len(),
        });

        if let Some(delay) = self.delay {
            tokio::select! {
                () = ctx.cancel.cancelled() => {
                    return Err(ToolError::Execution("cancelled".to_string()));
                }
                () = tokio::time::sleep(delay) => {}
            }
        }

        self.outcome.clone().map_err(ToolError::Execution)
    }
}

// ============================================================================
// Recording Observer
// ============================================================================

/// Observer that records every callback
#[derive(Default)]
pub struct RecordingObserver {
    fragments: Mutex<Vec<Fragment>>,
    errors: Mutex<Vec<String>>,
    tool_results: Mutex<Vec<ToolCallRecord>>,
    steps: Mutex<Vec<StepResult>>,
    finished: Mutex<Option<(usize, Usage)>>,
}

impl RecordingObserver {
    pub fn fragments(&self) -> Vec<Fragment> {
        self.fragments.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn tool_results(&self) -> Vec<ToolCallRecord> {
        self.tool_results.lock().unwrap().clone()
    }

    pub fn steps(&self) -> Vec<StepResult> {
        self.steps.lock().unwrap().clone()
    }

    /// Step count and usage passed to `on_finish`
    pub fn finished(&self) -> Option<(usize, Usage)> {
        *self.finished.lock().unwrap()
    }
}

impl RunObserver for RecordingObserver {
    fn on_fragment(&self, fragment: &Fragment) {
        self.fragments.lock().unwrap().push(fragment.clone());
    }

    fn on_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn on_tool_result(&self, call: &ToolCallRecord) {
        self.tool_results.lock().unwrap().push(call.clone());
    }

    fn on_step_finish(&self, step: &StepResult) {
        self.steps.lock().unwrap().push(step.clone());
    }

    fn on_finish(&self, steps: &[StepResult], usage: Usage) {
        *self.finished.lock().unwrap() = Some((steps.len(), usage));
    }
}
