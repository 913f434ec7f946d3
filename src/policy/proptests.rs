//! Property-based tests for the continuation policy
//!
//! A simulated run loop drives the policy with arbitrary model behavior.

use super::*;
use crate::llm::{FinishReason, Usage};
use proptest::prelude::*;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_finish_reason() -> impl Strategy<Value = FinishReason> {
    prop_oneof![
        1 => Just(FinishReason::Stop),
        1 => Just(FinishReason::Length),
        1 => Just(FinishReason::Error),
        1 => Just(FinishReason::Other),
        1 => Just(FinishReason::Unknown),
        // Weighted so simulated runs tend to go long
        4 => Just(FinishReason::ToolCalls),
    ]
}

/// One simulated turn: finish reason plus tool settlement
#[derive(Debug, Clone)]
struct Turn {
    finish_reason: FinishReason,
    tools: ToolSummary,
}

fn arb_turn() -> impl Strategy<Value = Turn> {
    (arb_finish_reason(), 0usize..4, 0usize..4).prop_map(|(finish_reason, total, failed)| Turn {
        finish_reason,
        tools: ToolSummary {
            total,
            failed: failed.min(total),
            pending: 0,
        },
    })
}

fn arb_phase() -> impl Strategy<Value = LoopPhase> {
    prop_oneof![
        Just(LoopPhase::AwaitingTurn),
        Just(LoopPhase::TurnRunning),
        Just(LoopPhase::ToolsRunning),
        Just(LoopPhase::Merging),
        Just(LoopPhase::Deciding),
        Just(LoopPhase::Terminated),
    ]
}

fn arb_event() -> impl Strategy<Value = PhaseEvent> {
    prop_oneof![
        Just(PhaseEvent::TurnStarted),
        (0usize..3).prop_map(|count| PhaseEvent::ToolCallsReceived { count }),
        Just(PhaseEvent::TurnCompleted),
        Just(PhaseEvent::ToolsSettled),
        Just(PhaseEvent::Merged),
        Just(PhaseEvent::Decided(Decision::Continue)),
        Just(PhaseEvent::Decided(Decision::Terminate(
            TerminationReason::TerminalFinish
        ))),
    ]
}

/// Run the policy until it terminates, cycling through `turns`
fn simulate(policy: &ContinuationPolicy, turns: &[Turn]) -> (usize, TerminationReason) {
    let mut steps = Vec::new();
    let mut step_count = 0;

    for turn in turns.iter().cycle() {
        step_count += 1;
        steps.push(StepResult {
            finish_reason: turn.finish_reason,
            usage: Usage::new(1, 1),
            ..Default::default()
        });
        if let Decision::Terminate(reason) = policy.decide(&steps, step_count, turn.tools) {
            return (step_count, reason);
        }
    }
    unreachable!("turns is non-empty")
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// The step count never exceeds the bound, whatever the model does
    #[test]
    fn prop_step_count_bounded(
        max_steps in 1usize..8,
        turns in proptest::collection::vec(arb_turn(), 1..6),
    ) {
        let policy = ContinuationPolicy::new(max_steps, vec![]);
        let (step_count, _) = simulate(&policy, &turns);
        prop_assert!(step_count <= max_steps);
    }

    /// A model that always requests working tools runs exactly `max_steps` turns
    #[test]
    fn prop_always_tool_calls_hits_bound(max_steps in 1usize..8, calls in 1usize..4) {
        let policy = ContinuationPolicy::new(max_steps, vec![]);
        let turn = Turn {
            finish_reason: FinishReason::ToolCalls,
            tools: ToolSummary { total: calls, failed: 0, pending: 0 },
        };
        let (step_count, reason) = simulate(&policy, &[turn]);
        prop_assert_eq!(step_count, max_steps);
        prop_assert_eq!(reason, TerminationReason::MaxSteps);
    }

    /// All tool calls erroring forces termination regardless of finish reason
    #[test]
    fn prop_all_failed_terminates(
        finish_reason in arb_finish_reason(),
        calls in 1usize..5,
        step_count in 1usize..5,
    ) {
        let policy = ContinuationPolicy::new(10, vec![]);
        let steps = vec![StepResult { finish_reason, ..Default::default() }];
        let tools = ToolSummary { total: calls, failed: calls, pending: 0 };
        prop_assert_eq!(
            policy.decide(&steps, step_count, tools),
            Decision::Terminate(TerminationReason::AllToolsFailed)
        );
    }

    /// Only a tool-call finish can continue the loop
    #[test]
    fn prop_terminal_finish_never_continues(turn in arb_turn()) {
        let policy = ContinuationPolicy::new(10, vec![]);
        let steps = vec![StepResult { finish_reason: turn.finish_reason, ..Default::default() }];
        let decision = policy.decide(&steps, 1, turn.tools);
        if decision.is_continue() {
            prop_assert_eq!(turn.finish_reason, FinishReason::ToolCalls);
            prop_assert!(turn.tools.total > turn.tools.failed);
        }
    }

    /// Once terminated, no event moves the phase
    #[test]
    fn prop_terminated_is_absorbing(events in proptest::collection::vec(arb_event(), 0..10)) {
        for event in &events {
            prop_assert_eq!(
                transition(LoopPhase::Terminated, event),
                Err(TransitionError::Terminated)
            );
        }
    }

    /// A new turn can start only from `AwaitingTurn`
    #[test]
    fn prop_turn_starts_only_when_awaiting(phase in arb_phase()) {
        let result = transition(phase, &PhaseEvent::TurnStarted);
        prop_assert_eq!(result.is_ok(), phase == LoopPhase::AwaitingTurn);
    }
}
