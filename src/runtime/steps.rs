//! Steps of one loop iteration
//!
//! `RunTurn -> extract_tool_calls -> ExecuteTools -> MergeAndDecide`, each
//! advancing the pure phase machine in `policy`.

use async_trait::async_trait;
use std::sync::Arc;

use super::traits::RunObserver;
use crate::conversation::Conversation;
use crate::engine::{
    bail, proceed, run_step, Concurrency, ForEach, Step, StepContext, StepOutcome,
};
use crate::error::EngineError;
use crate::llm::{
    ContentPart, LanguageModel, Message, ModelRequest, RequestInfo, StepResult, ToolChoice,
};
use crate::policy::{
    transition, ContinuationPolicy, Decision, LoopPhase, PhaseEvent, TerminationReason,
    ToolSummary,
};
use crate::stream::{dispatch_turn, TurnOutcome};
use crate::tools::{invoke_tool, ToolCallRecord, ToolRegistry};

// ============================================================================
// Run state
// ============================================================================

/// Turn data carried between the steps of one iteration
#[derive(Debug, Clone)]
pub struct PendingTurn {
    request: RequestInfo,
    outcome: TurnOutcome,
    /// Messages merged so far this turn
    messages: Vec<Message>,
}

/// All state for one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub conversation: Conversation,
    pub steps: Vec<StepResult>,
    pub step_count: usize,
    pub phase: LoopPhase,
    pub termination: Option<TerminationReason>,
    turn: Option<PendingTurn>,
}

impl RunContext {
    pub fn new(run_id: impl Into<String>, conversation: Conversation) -> Self {
        Self {
            run_id: run_id.into(),
            conversation,
            steps: Vec::new(),
            step_count: 0,
            phase: LoopPhase::AwaitingTurn,
            termination: None,
            turn: None,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.phase.is_terminal()
    }

    fn advance(&mut self, step: &str, event: &PhaseEvent) -> Result<(), EngineError> {
        self.phase = transition(self.phase, event)
            .map_err(|e| EngineError::contract(step, e.to_string()))?;
        Ok(())
    }

    fn merge(&mut self, message: Message) {
        if let Some(turn) = self.turn.as_mut() {
            turn.messages.push(message.clone());
        }
        self.conversation.push(message);
    }
}

/// A run paused between stream end and tool settlement
#[derive(Debug, Clone)]
pub struct ToolPhase {
    pub context: RunContext,
    pub calls: Vec<ToolCallRecord>,
}

impl From<ToolPhase> for RunContext {
    fn from(phase: ToolPhase) -> Self {
        phase.context
    }
}

/// Pull the completed tool calls out of the pending turn
pub fn extract_tool_calls(mut context: RunContext) -> ToolPhase {
    let calls = context
        .turn
        .as_mut()
        .map(|turn| std::mem::take(&mut turn.outcome.tool_calls))
        .unwrap_or_default();
    ToolPhase { context, calls }
}

// ============================================================================
// RunTurn
// ============================================================================

/// Issue one model call and consume its fragment stream
pub struct RunTurn<M> {
    model: Arc<M>,
    tools: Arc<ToolRegistry>,
    tool_choice: ToolChoice,
    policy: Arc<ContinuationPolicy>,
    observer: Arc<dyn RunObserver>,
}

impl<M: LanguageModel> RunTurn<M> {
    pub fn new(
        model: Arc<M>,
        tools: Arc<ToolRegistry>,
        tool_choice: ToolChoice,
        policy: Arc<ContinuationPolicy>,
        observer: Arc<dyn RunObserver>,
    ) -> Self {
        Self {
            model,
            tools,
            tool_choice,
            policy,
            observer,
        }
    }
}

#[async_trait]
impl<M: LanguageModel> Step for RunTurn<M> {
    type Input = RunContext;
    type Output = RunContext;

    fn name(&self) -> &str {
        "run_turn"
    }

    fn validate_input(&self, ctx: &RunContext) -> Result<(), String> {
        if ctx.phase != LoopPhase::AwaitingTurn {
            return Err(format!("turn requested in phase {:?}", ctx.phase));
        }
        if ctx.step_count >= self.policy.max_steps() {
            return Err(format!(
                "step count {} already at bound {}",
                ctx.step_count,
                self.policy.max_steps()
            ));
        }
        if ctx.conversation.is_empty() {
            return Err("conversation is empty".to_string());
        }
        Ok(())
    }

    async fn run(&self, mut run: RunContext, ctx: &StepContext) -> StepOutcome<RunContext> {
        ctx.ensure_active()?;
        run.advance(self.name(), &PhaseEvent::TurnStarted)?;
        run.step_count += 1;

        let request = ModelRequest {
            messages: run.conversation.messages().to_vec(),
            tools: self.tools.definitions(),
            tool_choice: self.tool_choice.clone(),
        };
        tracing::info!(
            run_id = %run.run_id,
            step = run.step_count,
            attempt = ctx.attempt,
            messages = request.messages.len(),
            "Starting turn"
        );

        let stream = self.model.stream(&request, ctx.cancel.clone()).await?;
        let outcome = dispatch_turn(stream, self.observer.as_ref()).await;

        tracing::info!(
            run_id = %run.run_id,
            step = run.step_count,
            finish_reason = ?outcome.finish_reason,
            tool_calls = outcome.tool_calls.len(),
            output_tokens = outcome.usage.output_tokens,
            "Turn stream finished"
        );

        let content = outcome.content.clone();
        let errored = outcome.errored();
        run.turn = Some(PendingTurn {
            request: RequestInfo::from(&request),
            outcome,
            messages: Vec::new(),
        });
        if !content.is_empty() {
            run.merge(Message::assistant(content));
        }

        if errored {
            // No tool phase: finalize here and end the run
            tracing::warn!(
                run_id = %run.run_id,
                step = run.step_count,
                "Turn ended with stream error"
            );
            run.advance(self.name(), &PhaseEvent::TurnCompleted)?;
            finalize_step(
                &mut run,
                Vec::new(),
                &self.policy,
                self.observer.as_ref(),
                self.name(),
            )?;
            return bail(run);
        }

        proceed(run)
    }
}

// ============================================================================
// ExecuteTools
// ============================================================================

/// One tool call plus the user-authored snapshot it may read
pub struct ToolInvocation {
    pub call: ToolCallRecord,
    pub context_messages: Arc<[Message]>,
}

/// Execute a single call, isolating its failure in the record
pub struct InvokeTool {
    tools: Arc<ToolRegistry>,
    observer: Arc<dyn RunObserver>,
}

#[async_trait]
impl Step for InvokeTool {
    type Input = ToolInvocation;
    type Output = ToolCallRecord;

    fn name(&self) -> &str {
        "invoke_tool"
    }

    fn validate_input(&self, input: &ToolInvocation) -> Result<(), String> {
        if input.call.name.is_empty() {
            return Err(format!("tool call {} has no name", input.call.id));
        }
        Ok(())
    }

    async fn run(&self, input: ToolInvocation, ctx: &StepContext) -> StepOutcome<ToolCallRecord> {
        ctx.ensure_active()?;
        let record = invoke_tool(
            input.call,
            &self.tools,
            input.context_messages,
            ctx.cancel.clone(),
        )
        .await;
        if record.is_settled() {
            self.observer.on_tool_result(&record);
        }
        proceed(record)
    }
}

/// Run every tool call of the turn; all settle before the step returns
pub struct ExecuteTools {
    invoke: ForEach<InvokeTool>,
}

impl ExecuteTools {
    pub fn new(
        tools: Arc<ToolRegistry>,
        observer: Arc<dyn RunObserver>,
        concurrency: Concurrency,
    ) -> Self {
        Self {
            invoke: ForEach::new(InvokeTool { tools, observer }, concurrency),
        }
    }
}

#[async_trait]
impl Step for ExecuteTools {
    type Input = ToolPhase;
    type Output = ToolPhase;

    fn name(&self) -> &str {
        "execute_tools"
    }

    fn validate_input(&self, input: &ToolPhase) -> Result<(), String> {
        if input.context.phase != LoopPhase::TurnRunning {
            return Err(format!("tools requested in phase {:?}", input.context.phase));
        }
        Ok(())
    }

    fn validate_output(&self, output: &ToolPhase) -> Result<(), String> {
        if output.context.phase != LoopPhase::Merging {
            return Err(format!("tool phase ended in {:?}", output.context.phase));
        }
        Ok(())
    }

    async fn run(&self, input: ToolPhase, ctx: &StepContext) -> StepOutcome<ToolPhase> {
        let ToolPhase { mut context, calls } = input;

        if calls.is_empty() {
            context.advance(self.name(), &PhaseEvent::TurnCompleted)?;
            return proceed(ToolPhase { context, calls });
        }

        context.advance(self.name(), &PhaseEvent::ToolCallsReceived { count: calls.len() })?;
        tracing::debug!(run_id = %context.run_id, count = calls.len(), "Executing tool calls");

        let snapshot = context.conversation.user_snapshot();
        let items = calls
            .into_iter()
            .map(|call| ToolInvocation {
                call,
                context_messages: Arc::clone(&snapshot),
            })
            .collect();
        let calls = run_step(&self.invoke, items, ctx).await?.into_inner();

        context.advance(self.name(), &PhaseEvent::ToolsSettled)?;
        proceed(ToolPhase { context, calls })
    }
}

// ============================================================================
// MergeAndDecide
// ============================================================================

/// Fold tool results into history, finalize the step and decide continuation
pub struct MergeAndDecide {
    policy: Arc<ContinuationPolicy>,
    observer: Arc<dyn RunObserver>,
}

impl MergeAndDecide {
    pub fn new(policy: Arc<ContinuationPolicy>, observer: Arc<dyn RunObserver>) -> Self {
        Self { policy, observer }
    }
}

#[async_trait]
impl Step for MergeAndDecide {
    type Input = ToolPhase;
    type Output = RunContext;

    fn name(&self) -> &str {
        "merge_and_decide"
    }

    fn validate_input(&self, input: &ToolPhase) -> Result<(), String> {
        if input.context.turn.is_none() {
            return Err("no turn in progress".to_string());
        }
        Ok(())
    }

    fn validate_output(&self, output: &RunContext) -> Result<(), String> {
        if output.step_count > self.policy.max_steps() {
            return Err(format!(
                "step count {} exceeds bound {}",
                output.step_count,
                self.policy.max_steps()
            ));
        }
        if output.steps.len() != output.step_count {
            return Err(format!(
                "{} step results for {} steps",
                output.steps.len(),
                output.step_count
            ));
        }
        Ok(())
    }

    async fn run(&self, input: ToolPhase, _ctx: &StepContext) -> StepOutcome<RunContext> {
        let ToolPhase { mut context, calls } = input;
        finalize_step(&mut context, calls, &self.policy, self.observer.as_ref(), self.name())?;
        proceed(context)
    }
}

/// Merge the tool-role message, append the step result and apply the
/// continuation decision. Expects the `Merging` phase.
fn finalize_step(
    run: &mut RunContext,
    calls: Vec<ToolCallRecord>,
    policy: &ContinuationPolicy,
    observer: &dyn RunObserver,
    step_name: &str,
) -> Result<Decision, EngineError> {
    let results: Vec<ContentPart> = calls
        .iter()
        .filter(|call| call.is_settled())
        .map(ContentPart::tool_result)
        .collect();
    if !results.is_empty() {
        run.merge(Message::tool(results));
    }

    let turn = run
        .turn
        .take()
        .ok_or_else(|| EngineError::contract(step_name, "no turn in progress"))?;
    let outcome = turn.outcome;
    let mut response = outcome.response;
    response.messages = turn.messages;

    run.steps.push(StepResult {
        finish_reason: outcome.finish_reason,
        warnings: outcome.warnings,
        usage: outcome.usage,
        provider_metadata: outcome.provider_metadata,
        request: turn.request,
        response,
        tool_calls: calls,
        content: outcome.content,
        is_continued: false,
    });
    run.advance(step_name, &PhaseEvent::Merged)?;

    let summary = match run.steps.last() {
        Some(step) => ToolSummary::from_records(&step.tool_calls),
        None => ToolSummary::default(),
    };
    let decision = policy.decide(&run.steps, run.step_count, summary);

    if let Some(step) = run.steps.last_mut() {
        step.is_continued = decision.is_continue();
        observer.on_step_finish(step);
    }

    match &decision {
        Decision::Continue => {
            tracing::debug!(run_id = %run.run_id, step = run.step_count, "Continuing");
        }
        Decision::Terminate(reason) => {
            if *reason == TerminationReason::AllToolsFailed {
                tracing::warn!(run_id = %run.run_id, step = run.step_count, "All tool calls failed");
            }
            tracing::info!(run_id = %run.run_id, step = run.step_count, reason = ?reason, "Run terminating");
            run.termination = Some(reason.clone());
        }
    }
    run.advance(step_name, &PhaseEvent::Decided(decision.clone()))?;

    Ok(decision)
}
