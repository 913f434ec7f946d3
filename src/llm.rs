//! Model collaborator abstraction
//!
//! The model itself lives outside this crate. Implementations open a
//! fragment stream for a conversation and tool schema list.

mod error;
mod fragment;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use fragment::{channel_stream, fragment_stream, Fragment, FragmentStream};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Common interface for model providers
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Open the fragment stream for one turn.
    ///
    /// The stream must end with exactly one `finish` or `error` fragment.
    /// Returning `Err` is an infrastructure failure and may trigger a
    /// whole-pipeline retry.
    async fn stream(
        &self,
        request: &ModelRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

#[async_trait]
impl<T: LanguageModel + ?Sized> LanguageModel for Arc<T> {
    async fn stream(
        &self,
        request: &ModelRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, LlmError> {
        (**self).stream(request, cancel).await
    }

    fn model_id(&self) -> &str {
        (**self).model_id()
    }
}

/// Logging wrapper for models
pub struct LoggingModel<M> {
    inner: M,
    model_id: String,
}

impl<M: LanguageModel> LoggingModel<M> {
    pub fn new(inner: M) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for LoggingModel<M> {
    async fn stream(
        &self,
        request: &ModelRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, LlmError> {
        let start = std::time::Instant::now();
        let result = self.inner.stream(request, cancel).await;
        let duration = start.elapsed();

        match &result {
            Ok(_) => {
                tracing::info!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    messages = request.messages.len(),
                    tools = request.tools.len(),
                    "Model stream opened"
                );
            }
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %duration.as_millis(),
                    error = %e.message,
                    retryable = e.is_retryable(),
                    "Model stream failed to open"
                );
            }
        }

        result
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
