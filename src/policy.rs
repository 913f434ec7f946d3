//! Continuation policy
//!
//! Decides after each turn whether the run loop issues another model call.
//! The phase machine in `transition` is pure; the runtime applies it.

mod state;
mod transition;

#[cfg(test)]
mod proptests;

pub use state::{Decision, LoopPhase, TerminationReason, ToolSummary};
pub use transition::{transition, PhaseEvent, TransitionError};

use std::fmt;
use std::sync::Arc;

use crate::llm::StepResult;

type StopFn = dyn Fn(&[StepResult]) -> bool + Send + Sync;

/// User stop predicate over the accumulated step results
#[derive(Clone)]
pub struct StopCondition {
    name: String,
    check: Arc<StopFn>,
}

impl StopCondition {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&[StepResult]) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    /// Stop once `count` steps have completed
    pub fn step_count_is(count: usize) -> Self {
        Self::new(format!("step_count_is({count})"), move |steps| {
            steps.len() >= count
        })
    }

    /// Stop after a step that called the named tool
    pub fn has_tool_call(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        Self::new(format!("has_tool_call({tool})"), move |steps| {
            steps.last().is_some_and(|step| step.has_tool_call(&tool))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_met(&self, steps: &[StepResult]) -> bool {
        (self.check)(steps)
    }
}

impl fmt::Debug for StopCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StopCondition").field(&self.name).finish()
    }
}

/// Termination rules evaluated in the `Deciding` phase
#[derive(Debug, Clone)]
pub struct ContinuationPolicy {
    max_steps: usize,
    stop_conditions: Vec<StopCondition>,
}

impl ContinuationPolicy {
    pub fn new(max_steps: usize, stop_conditions: Vec<StopCondition>) -> Self {
        Self {
            max_steps: max_steps.max(1),
            stop_conditions,
        }
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Decide whether another turn runs.
    ///
    /// An all-failed tool phase terminates regardless of finish reason. A
    /// new turn requires a tool-call finish with tool calls that all have
    /// local outcomes.
    pub fn decide(&self, steps: &[StepResult], step_count: usize, tools: ToolSummary) -> Decision {
        let Some(last) = steps.last() else {
            return Decision::Continue;
        };

        if tools.all_failed() {
            return Decision::Terminate(TerminationReason::AllToolsFailed);
        }
        if tools.has_pending() {
            return Decision::Terminate(TerminationReason::AwaitingExternalResults);
        }
        if last.finish_reason.is_terminal() {
            return Decision::Terminate(TerminationReason::TerminalFinish);
        }
        if tools.total == 0 {
            return Decision::Terminate(TerminationReason::NoToolCalls);
        }
        if step_count >= self.max_steps {
            return Decision::Terminate(TerminationReason::MaxSteps);
        }
        if let Some(condition) = self.stop_conditions.iter().find(|c| c.is_met(steps)) {
            tracing::debug!(condition = %condition.name(), "Stop condition met");
            return Decision::Terminate(TerminationReason::StopCondition);
        }

        Decision::Continue
    }
}

impl Default for ContinuationPolicy {
    fn default() -> Self {
        Self::new(5, Vec::new())
    }
}
