//! Top-level pipeline with whole-run retry

use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::step::{run_step, Step, StepContext};
use crate::error::EngineError;

/// Runs a composed step as a unit.
///
/// A retryable failure re-runs the whole step from the original input, up
/// to `max_retries` times, before the error is surfaced.
pub struct Pipeline<S> {
    step: S,
    max_retries: u32,
    retry_delay: Duration,
}

impl<S> Pipeline<S>
where
    S: Step,
    S::Input: Clone,
{
    pub fn new(step: S) -> Self {
        Self {
            step,
            max_retries: 0,
            retry_delay: Duration::from_millis(500),
        }
    }

    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    pub fn name(&self) -> &str {
        self.step.name()
    }

    /// Run to completion. A bail ends the run with the bailed value.
    pub async fn run(
        &self,
        input: S::Input,
        cancel: &CancellationToken,
    ) -> Result<S::Output, EngineError> {
        let mut attempt: u32 = 1;

        loop {
            let ctx = StepContext::new(cancel.clone()).with_attempt(attempt);

            match run_step(&self.step, input.clone(), &ctx).await {
                Ok(flow) => {
                    if flow.is_bail() {
                        tracing::debug!(pipeline = %self.step.name(), attempt, "Pipeline bailed");
                    }
                    return Ok(flow.into_inner());
                }
                Err(e) if e.is_retryable() && attempt <= self.max_retries => {
                    let delay = self.delay_for(&e, attempt);
                    tracing::warn!(
                        pipeline = %self.step.name(),
                        attempt,
                        max_retries = self.max_retries,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Pipeline failed, retrying"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => return Err(EngineError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        tracing::error!(
                            pipeline = %self.step.name(),
                            attempts = attempt,
                            error = %e,
                            "Pipeline failed, retries exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }

    fn delay_for(&self, error: &EngineError, attempt: u32) -> Duration {
        match error {
            EngineError::Model(e) => e
                .retry_after
                .unwrap_or_else(|| retry_delay(self.retry_delay, attempt)),
            _ => retry_delay(self.retry_delay, attempt),
        }
    }
}

/// Exponential backoff: base, 2x base, 4x base, ...
pub fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1 << exp)
}
