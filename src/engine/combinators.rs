//! Composition primitives over `Step`

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::marker::PhantomData;

use super::step::{proceed, run_step, Flow, Step, StepContext, StepOutcome};

// ============================================================================
// Then
// ============================================================================

/// Run `first`, then feed its output to `second`.
///
/// A bail from `first` skips `second`; the bailed value is converted into
/// `second`'s output type.
pub struct Then<A, B> {
    first: A,
    second: B,
    name: String,
}

impl<A: Step, B: Step> Then<A, B> {
    pub fn new(first: A, second: B) -> Self {
        let name = format!("{} > {}", first.name(), second.name());
        Self {
            first,
            second,
            name,
        }
    }
}

#[async_trait]
impl<A, B> Step for Then<A, B>
where
    A: Step,
    B: Step<Input = A::Output>,
    B::Output: From<A::Output>,
{
    type Input = A::Input;
    type Output = B::Output;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: A::Input, ctx: &StepContext) -> StepOutcome<B::Output> {
        match run_step(&self.first, input, ctx).await? {
            Flow::Continue(value) => run_step(&self.second, value, ctx).await,
            Flow::Bail(value) => {
                tracing::debug!(step = %self.first.name(), "Step bailed, skipping remainder");
                Ok(Flow::Bail(value.into()))
            }
        }
    }
}

// ============================================================================
// Transform
// ============================================================================

/// Pure mapping step
pub struct Transform<F, I, O> {
    name: String,
    f: F,
    _types: PhantomData<fn(I) -> O>,
}

/// Build a pure mapping step
pub fn transform<F, I, O>(name: impl Into<String>, f: F) -> Transform<F, I, O>
where
    F: Fn(I) -> O + Send + Sync,
{
    Transform {
        name: name.into(),
        f,
        _types: PhantomData,
    }
}

#[async_trait]
impl<F, I, O> Step for Transform<F, I, O>
where
    F: Fn(I) -> O + Send + Sync,
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: I, _ctx: &StepContext) -> StepOutcome<O> {
        proceed((self.f)(input))
    }
}

// ============================================================================
// ForEach
// ============================================================================

/// How `ForEach` schedules its items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Concurrency {
    #[default]
    Sequential,
    /// At most `n` items in flight
    Bounded(usize),
}

impl Concurrency {
    pub fn limit(self) -> usize {
        match self {
            Self::Sequential => 1,
            Self::Bounded(n) => n.max(1),
        }
    }
}

/// Run a step once per item, collecting outputs in input order.
///
/// Every item runs to completion. The collection bails if any item bailed;
/// the first error in input order is returned after all items finish.
pub struct ForEach<S> {
    step: S,
    concurrency: Concurrency,
    name: String,
}

impl<S: Step> ForEach<S> {
    pub fn new(step: S, concurrency: Concurrency) -> Self {
        let name = format!("for_each({})", step.name());
        Self {
            step,
            concurrency,
            name,
        }
    }
}

#[async_trait]
impl<S: Step> Step for ForEach<S> {
    type Input = Vec<S::Input>;
    type Output = Vec<S::Output>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, items: Vec<S::Input>, ctx: &StepContext) -> StepOutcome<Vec<S::Output>> {
        let results: Vec<StepOutcome<S::Output>> = match self.concurrency.limit() {
            1 => {
                let mut results = Vec::with_capacity(items.len());
                for item in items {
                    results.push(run_step(&self.step, item, ctx).await);
                }
                results
            }
            limit => {
                let pending: Vec<_> = items
                    .into_iter()
                    .map(|item| run_step(&self.step, item, ctx))
                    .collect();
                stream::iter(pending).buffered(limit).collect().await
            }
        };

        let mut outputs = Vec::with_capacity(results.len());
        let mut bailed = false;
        for result in results {
            let flow = result?;
            bailed |= flow.is_bail();
            outputs.push(flow.into_inner());
        }

        if bailed {
            Ok(Flow::Bail(outputs))
        } else {
            proceed(outputs)
        }
    }
}

// ============================================================================
// RepeatWhile
// ============================================================================

/// Loop condition evaluated on each iteration's full output
#[async_trait]
pub trait Predicate<T>: Send + Sync {
    async fn test(&self, value: &T) -> bool;
}

#[async_trait]
impl<T, F> Predicate<T> for F
where
    T: Sync,
    F: Fn(&T) -> bool + Send + Sync,
{
    async fn test(&self, value: &T) -> bool {
        self(value)
    }
}

/// Re-run a step on its own output while the predicate holds, up to
/// `max_iterations` runs.
pub struct RepeatWhile<S, P> {
    step: S,
    predicate: P,
    max_iterations: usize,
    name: String,
}

impl<S: Step, P> RepeatWhile<S, P> {
    pub fn new(step: S, predicate: P, max_iterations: usize) -> Self {
        let name = format!("repeat_while({})", step.name());
        Self {
            step,
            predicate,
            max_iterations,
            name,
        }
    }
}

#[async_trait]
impl<S, T, P> Step for RepeatWhile<S, P>
where
    T: Send + Sync + 'static,
    S: Step<Input = T, Output = T>,
    P: Predicate<T>,
{
    type Input = T;
    type Output = T;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, input: T, ctx: &StepContext) -> StepOutcome<T> {
        let mut value = input;
        let mut iteration = 0usize;

        loop {
            ctx.ensure_active()?;
            iteration += 1;

            match run_step(&self.step, value, ctx).await? {
                Flow::Bail(output) => return Ok(Flow::Bail(output)),
                Flow::Continue(output) => {
                    if iteration >= self.max_iterations {
                        tracing::debug!(iteration, "Iteration cap reached");
                        return proceed(output);
                    }
                    if !self.predicate.test(&output).await {
                        return proceed(output);
                    }
                    value = output;
                }
            }
        }
    }
}

// ============================================================================
// Extension methods
// ============================================================================

pub trait StepExt: Step + Sized {
    fn then<B>(self, next: B) -> Then<Self, B>
    where
        B: Step<Input = Self::Output>,
        B::Output: From<Self::Output>,
    {
        Then::new(self, next)
    }

    fn for_each(self, concurrency: Concurrency) -> ForEach<Self> {
        ForEach::new(self, concurrency)
    }

    fn repeat_while<P>(self, predicate: P, max_iterations: usize) -> RepeatWhile<Self, P>
    where
        P: Predicate<Self::Output>,
    {
        RepeatWhile::new(self, predicate, max_iterations)
    }
}

impl<S: Step> StepExt for S {}

/// Chain steps in order, each output feeding the next input
#[macro_export]
macro_rules! sequence {
    ($only:expr $(,)?) => {
        $only
    };
    ($first:expr, $($rest:expr),+ $(,)?) => {
        $crate::engine::StepExt::then($first, $crate::sequence!($($rest),+))
    };
}
