//! Run loop for multi-turn model interactions
//!
//! Each iteration runs one turn pipeline:
//! `run_turn -> extract_tool_calls -> execute_tools -> merge_and_decide`,
//! repeated until the continuation policy terminates the run.

mod executor;
mod steps;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{Agent, RunOutput};
pub use steps::{
    extract_tool_calls, ExecuteTools, InvokeTool, MergeAndDecide, PendingTurn, RunContext,
    RunTurn, ToolInvocation, ToolPhase,
};
pub use traits::*;
