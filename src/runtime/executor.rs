//! Agent run loop

use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::steps::{extract_tool_calls, ExecuteTools, MergeAndDecide, RunContext, RunTurn};
use super::traits::{NoopObserver, RunObserver};
use crate::config::AgentConfig;
use crate::conversation::Conversation;
use crate::engine::{transform, Pipeline, StepExt};
use crate::error::EngineError;
use crate::llm::{FinishReason, LanguageModel, StepResult, Usage};
use crate::policy::{ContinuationPolicy, TerminationReason};
use crate::tools::ToolRegistry;

/// Result of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct RunOutput {
    pub run_id: String,
    pub conversation: Conversation,
    pub steps: Vec<StepResult>,
    /// Summed over all steps
    pub usage: Usage,
    /// Finish reason of the last step
    pub finish_reason: FinishReason,
    pub termination: TerminationReason,
    /// Text of the last step
    pub text: String,
}

/// Drives `invoke model -> maybe run tools -> maybe invoke model again`
pub struct Agent<M> {
    model: Arc<M>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
    observer: Arc<dyn RunObserver>,
}

impl<M: LanguageModel + 'static> Agent<M> {
    pub fn new(model: M, tools: ToolRegistry, config: AgentConfig) -> Self {
        Self {
            model: Arc::new(model),
            tools: Arc::new(tools),
            config,
            observer: Arc::new(NoopObserver),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: impl RunObserver + 'static) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run until the continuation policy terminates.
    ///
    /// Model and tool failures are reported in the output; only
    /// infrastructure failures that outlast the retry budget, contract
    /// violations and cancellation surface as `Err`.
    pub async fn run(
        &self,
        conversation: impl Into<Conversation>,
        cancel: CancellationToken,
    ) -> Result<RunOutput, EngineError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let conversation = conversation.into();
        let policy = Arc::new(ContinuationPolicy::new(
            self.config.max_steps,
            self.config.stop_conditions.clone(),
        ));

        tracing::info!(
            run_id = %run_id,
            model = %self.model.model_id(),
            messages = conversation.len(),
            tools = self.tools.len(),
            max_steps = policy.max_steps(),
            "Starting run"
        );

        let turn = crate::sequence![
            RunTurn::new(
                Arc::clone(&self.model),
                Arc::clone(&self.tools),
                self.config.tool_choice.clone(),
                Arc::clone(&policy),
                Arc::clone(&self.observer),
            ),
            transform("extract_tool_calls", extract_tool_calls),
            ExecuteTools::new(
                Arc::clone(&self.tools),
                Arc::clone(&self.observer),
                self.config.tool_concurrency,
            ),
            MergeAndDecide::new(Arc::clone(&policy), Arc::clone(&self.observer)),
        ];
        let pipeline = Pipeline::new(
            turn.repeat_while(|run: &RunContext| !run.is_terminated(), policy.max_steps()),
        )
        .with_retries(self.config.max_retries, self.config.retry_delay);

        let run = match pipeline.run(RunContext::new(run_id.clone(), conversation), &cancel).await {
            Ok(run) => run,
            Err(e) => {
                tracing::error!(run_id = %run_id, error = %e, "Run failed");
                return Err(e);
            }
        };

        let usage = run
            .steps
            .iter()
            .fold(Usage::default(), |total, step| total.add(step.usage));
        self.observer.on_finish(&run.steps, usage);

        let termination = run.termination.unwrap_or(TerminationReason::MaxSteps);
        let last = run.steps.last();
        let finish_reason = last.map(|s| s.finish_reason).unwrap_or_default();
        let text = last.map(StepResult::text).unwrap_or_default();

        tracing::info!(
            run_id = %run_id,
            steps = run.step_count,
            total_tokens = usage.total_tokens,
            termination = ?termination,
            "Run finished"
        );

        Ok(RunOutput {
            run_id,
            conversation: run.conversation,
            steps: run.steps,
            usage,
            finish_reason,
            termination,
            text,
        })
    }
}
