//! Typed partial-output fragments streamed by a model

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::types::{FinishReason, Source, Usage};

/// A single typed unit of streamed model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Fragment {
    StreamStart {
        #[serde(default)]
        warnings: Vec<String>,
    },
    ResponseMetadata {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
        #[serde(default)]
        model_id: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    TextDelta {
        text: String,
    },
    ReasoningDelta {
        text: String,
    },
    ReasoningSignature {
        signature: String,
    },
    RedactedReasoning {
        data: String,
    },
    /// Synthesized once per turn, ahead of the first `ToolCallDelta`
    ToolCallStreamingStart {
        tool_call_id: String,
        tool_name: String,
    },
    ToolCallDelta {
        tool_call_id: String,
        tool_name: String,
        args_text_delta: String,
    },
    /// A complete tool call; `args` is the raw JSON argument text
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: String,
    },
    Source(Source),
    File {
        data: String,
        mime_type: String,
    },
    Error {
        message: String,
    },
    Finish {
        finish_reason: FinishReason,
        #[serde(default)]
        usage: Usage,
        #[serde(default)]
        provider_metadata: Option<Value>,
    },
}

impl Fragment {
    pub fn text(text: impl Into<String>) -> Self {
        Fragment::TextDelta { text: text.into() }
    }

    pub fn reasoning(text: impl Into<String>) -> Self {
        Fragment::ReasoningDelta { text: text.into() }
    }

    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, args: &Value) -> Self {
        Fragment::ToolCall {
            tool_call_id: id.into(),
            tool_name: name.into(),
            args: args.to_string(),
        }
    }

    pub fn finish(finish_reason: FinishReason, usage: Usage) -> Self {
        Fragment::Finish {
            finish_reason,
            usage,
            provider_metadata: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Fragment::Error {
            message: message.into(),
        }
    }

    /// Reasoning-family fragments never close the reasoning buffer
    pub fn is_reasoning_family(&self) -> bool {
        matches!(
            self,
            Fragment::ReasoningDelta { .. }
                | Fragment::ReasoningSignature { .. }
                | Fragment::RedactedReasoning { .. }
        )
    }

    /// Kind tag used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Fragment::StreamStart { .. } => "stream-start",
            Fragment::ResponseMetadata { .. } => "response-metadata",
            Fragment::TextDelta { .. } => "text-delta",
            Fragment::ReasoningDelta { .. } => "reasoning-delta",
            Fragment::ReasoningSignature { .. } => "reasoning-signature",
            Fragment::RedactedReasoning { .. } => "redacted-reasoning",
            Fragment::ToolCallStreamingStart { .. } => "tool-call-streaming-start",
            Fragment::ToolCallDelta { .. } => "tool-call-delta",
            Fragment::ToolCall { .. } => "tool-call",
            Fragment::Source(_) => "source",
            Fragment::File { .. } => "file",
            Fragment::Error { .. } => "error",
            Fragment::Finish { .. } => "finish",
        }
    }
}

/// Ordered, asynchronously-delivered fragment sequence for one turn
pub type FragmentStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

/// Build a fragment stream over an in-memory script
pub fn fragment_stream(fragments: Vec<Fragment>) -> FragmentStream {
    Box::pin(futures::stream::iter(fragments))
}

/// Bounded channel between a producer task and the dispatcher.
///
/// The stream ends when every sender is dropped.
pub fn channel_stream(capacity: usize) -> (mpsc::Sender<Fragment>, FragmentStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, Box::pin(ReceiverStream::new(rx)))
}
