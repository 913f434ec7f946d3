//! Per-turn stream accumulation
//!
//! The dispatcher consumes a turn's fragments one at a time and drives an
//! owned `TurnAccumulator`, which commits finalized content parts on
//! fragment-kind transitions.

mod accumulator;
mod dispatcher;

#[cfg(test)]
mod proptests;

pub use accumulator::{
    DispatchEffect, FragmentError, PendingStepResult, Processed, TurnAccumulator, TurnOutcome,
};
pub use dispatcher::dispatch_turn;
