//! The step contract

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;

/// Tagged step output.
///
/// `Bail` forces the enclosing pipeline to stop with this value, skipping
/// the remaining steps of the current iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow<T> {
    Continue(T),
    Bail(T),
}

impl<T> Flow<T> {
    pub fn into_inner(self) -> T {
        match self {
            Flow::Continue(value) | Flow::Bail(value) => value,
        }
    }

    pub fn is_bail(&self) -> bool {
        matches!(self, Flow::Bail(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Flow<U> {
        match self {
            Flow::Continue(value) => Flow::Continue(f(value)),
            Flow::Bail(value) => Flow::Bail(f(value)),
        }
    }
}

pub type StepOutcome<T> = Result<Flow<T>, EngineError>;

/// Continue with `value`
#[allow(clippy::unnecessary_wraps)]
pub fn proceed<T>(value: T) -> StepOutcome<T> {
    Ok(Flow::Continue(value))
}

/// Terminate the pipeline immediately with `value`
#[allow(clippy::unnecessary_wraps)]
pub fn bail<T>(value: T) -> StepOutcome<T> {
    Ok(Flow::Bail(value))
}

/// Per-attempt execution context shared by every step
#[derive(Debug, Clone)]
pub struct StepContext {
    pub cancel: CancellationToken,
    /// 1-based pipeline attempt
    pub attempt: u32,
}

impl StepContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel, attempt: 1 }
    }

    #[must_use]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// Refuse to start new work once cancellation is observed
    pub fn ensure_active(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A unit of work with a typed input/output contract
#[async_trait]
pub trait Step: Send + Sync {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Step name, used in logs and contract errors
    fn name(&self) -> &str;

    /// Input contract, checked at entry
    fn validate_input(&self, _input: &Self::Input) -> Result<(), String> {
        Ok(())
    }

    /// Output contract, checked on the value the step produced
    fn validate_output(&self, _output: &Self::Output) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, input: Self::Input, ctx: &StepContext) -> StepOutcome<Self::Output>;
}

/// Run a step with its contract enforced.
///
/// A violation fails fast as a non-retryable `ContractViolation`.
pub async fn run_step<S>(step: &S, input: S::Input, ctx: &StepContext) -> StepOutcome<S::Output>
where
    S: Step + ?Sized,
{
    step.validate_input(&input)
        .map_err(|message| EngineError::contract(step.name(), message))?;

    let flow = step.run(input, ctx).await?;

    let output = match &flow {
        Flow::Continue(value) | Flow::Bail(value) => value,
    };
    step.validate_output(output)
        .map_err(|message| EngineError::contract(step.name(), message))?;

    Ok(flow)
}
