//! Observer interface for run progress
//!
//! Observers must tolerate concurrent, out-of-order notifications while a
//! turn's tools run.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::llm::{Fragment, StepResult, Usage};
use crate::tools::ToolCallRecord;

/// Receives run progress. Every method defaults to a no-op.
pub trait RunObserver: Send + Sync {
    /// Externally visible fragment, in processed order
    fn on_fragment(&self, _fragment: &Fragment) {}

    /// Turn-level stream error
    fn on_error(&self, _message: &str) {}

    /// A tool call settled
    fn on_tool_result(&self, _call: &ToolCallRecord) {}

    /// A turn's step result was finalized
    fn on_step_finish(&self, _step: &StepResult) {}

    /// The run ended
    fn on_finish(&self, _steps: &[StepResult], _usage: Usage) {}
}

impl<T: RunObserver + ?Sized> RunObserver for Arc<T> {
    fn on_fragment(&self, fragment: &Fragment) {
        (**self).on_fragment(fragment);
    }

    fn on_error(&self, message: &str) {
        (**self).on_error(message);
    }

    fn on_tool_result(&self, call: &ToolCallRecord) {
        (**self).on_tool_result(call);
    }

    fn on_step_finish(&self, step: &StepResult) {
        (**self).on_step_finish(step);
    }

    fn on_finish(&self, steps: &[StepResult], usage: Usage) {
        (**self).on_finish(steps, usage);
    }
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

/// Events relayed by `BroadcastObserver`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    Fragment(Fragment),
    Error { message: String },
    ToolResult(ToolCallRecord),
    StepFinished(Box<StepResult>),
    Finished { steps: usize, usage: Usage },
}

/// Relays observer callbacks to any number of subscribers.
///
/// Sends with no subscribers are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<RunEvent>,
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}

impl RunObserver for BroadcastObserver {
    fn on_fragment(&self, fragment: &Fragment) {
        self.send(RunEvent::Fragment(fragment.clone()));
    }

    fn on_error(&self, message: &str) {
        self.send(RunEvent::Error {
            message: message.to_string(),
        });
    }

    fn on_tool_result(&self, call: &ToolCallRecord) {
        self.send(RunEvent::ToolResult(call.clone()));
    }

    fn on_step_finish(&self, step: &StepResult) {
        self.send(RunEvent::StepFinished(Box::new(step.clone())));
    }

    fn on_finish(&self, steps: &[StepResult], usage: Usage) {
        self.send(RunEvent::Finished {
            steps: steps.len(),
            usage,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_broadcast_relays_in_order() {
        let observer = BroadcastObserver::new(16);
        let mut rx = observer.subscribe();

        observer.on_fragment(&Fragment::text("hi"));
        observer.on_error("overloaded");
        observer.on_finish(&[StepResult::default()], Usage::new(2, 3));

        assert!(matches!(rx.try_recv(), Ok(RunEvent::Fragment(Fragment::TextDelta { .. }))));
        assert!(matches!(rx.try_recv(), Ok(RunEvent::Error { message }) if message == "overloaded"));
        assert!(matches!(
            rx.try_recv(),
            Ok(RunEvent::Finished { steps: 1, usage }) if usage.total_tokens == 5
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_without_subscribers_is_silent() {
        let observer = BroadcastObserver::new(1);
        observer.on_error("nobody listening");
    }

    #[test]
    fn test_event_wire_shape() {
        let event = RunEvent::Error {
            message: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({ "event": "error", "data": { "message": "boom" } })
        );
    }
}
