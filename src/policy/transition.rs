//! Pure phase transition function

use thiserror::Error;

use super::state::{Decision, LoopPhase};

/// Events that advance the run loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseEvent {
    /// A model call was issued
    TurnStarted,
    /// The fragment stream ended with tool calls to run
    ToolCallsReceived { count: usize },
    /// The fragment stream ended with no tool phase (including errored turns)
    TurnCompleted,
    /// Every tool call reached success or error
    ToolsSettled,
    /// Turn folded into history
    Merged,
    Decided(Decision),
}

/// Errors that can occur during transition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Run already terminated")]
    Terminated,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function.
///
/// `AwaitingTurn -> TurnRunning -> [ToolsRunning] -> Merging -> Deciding ->
/// {AwaitingTurn | Terminated}`
pub fn transition(phase: LoopPhase, event: &PhaseEvent) -> Result<LoopPhase, TransitionError> {
    match (phase, event) {
        (LoopPhase::Terminated, _) => Err(TransitionError::Terminated),

        (LoopPhase::AwaitingTurn, PhaseEvent::TurnStarted) => Ok(LoopPhase::TurnRunning),

        (LoopPhase::TurnRunning, PhaseEvent::ToolCallsReceived { count }) if *count > 0 => {
            Ok(LoopPhase::ToolsRunning)
        }
        (LoopPhase::TurnRunning, PhaseEvent::TurnCompleted)
        | (LoopPhase::ToolsRunning, PhaseEvent::ToolsSettled) => Ok(LoopPhase::Merging),

        (LoopPhase::Merging, PhaseEvent::Merged) => Ok(LoopPhase::Deciding),

        (LoopPhase::Deciding, PhaseEvent::Decided(Decision::Continue)) => {
            Ok(LoopPhase::AwaitingTurn)
        }
        (LoopPhase::Deciding, PhaseEvent::Decided(Decision::Terminate(_))) => {
            Ok(LoopPhase::Terminated)
        }

        (phase, event) => Err(TransitionError::InvalidTransition(format!(
            "{event:?} in phase {phase:?}"
        ))),
    }
}
