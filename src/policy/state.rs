//! Loop phase and termination types

use serde::{Deserialize, Serialize};

use crate::tools::ToolCallRecord;

/// Phase of the run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// Ready to issue the next model call
    #[default]
    AwaitingTurn,
    /// Fragment stream in progress
    TurnRunning,
    /// Executing the turn's tool calls
    ToolsRunning,
    /// Folding the turn into history
    Merging,
    /// Evaluating the continuation policy
    Deciding,
    Terminated,
}

impl LoopPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopPhase::Terminated)
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The last turn finished with a terminal finish reason
    TerminalFinish,
    /// Step bound reached
    MaxSteps,
    /// A user stop condition matched
    StopCondition,
    /// Every tool call in the last turn errored
    AllToolsFailed,
    /// Tool calls are waiting on results produced out of band
    AwaitingExternalResults,
    /// Tool-call finish without any tool calls to run
    NoToolCalls,
}

/// Outcome of one continuation decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Terminate(TerminationReason),
}

impl Decision {
    pub fn is_continue(&self) -> bool {
        matches!(self, Decision::Continue)
    }
}

/// Settlement counts for one turn's tool calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolSummary {
    pub total: usize,
    pub failed: usize,
    /// Calls with no local outcome (declarative or provider-executed)
    pub pending: usize,
}

impl ToolSummary {
    pub fn from_records(records: &[ToolCallRecord]) -> Self {
        records.iter().fold(Self::default(), |mut summary, record| {
            summary.total += 1;
            if record.is_error() {
                summary.failed += 1;
            } else if !record.is_settled() {
                summary.pending += 1;
            }
            summary
        })
    }

    pub fn all_failed(&self) -> bool {
        self.total > 0 && self.failed == self.total
    }

    pub fn has_pending(&self) -> bool {
        self.pending > 0
    }
}
