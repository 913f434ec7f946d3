//! Generic step composition engine
//!
//! Steps are typed async units with input/output contracts. They compose
//! with `then`, `for_each` and `repeat_while`, and a `Pipeline` runs the
//! composed step with whole-run retry on infrastructure failure. Early
//! termination is explicit data (`Flow::Bail`), never an error.

mod combinators;
mod pipeline;
mod step;

pub use combinators::{
    transform, Concurrency, ForEach, Predicate, RepeatWhile, StepExt, Then, Transform,
};
pub use pipeline::{retry_delay, Pipeline};
pub use step::{bail, proceed, run_step, Flow, Step, StepContext, StepOutcome};
