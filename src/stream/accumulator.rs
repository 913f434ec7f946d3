//! Per-turn delta accumulation
//!
//! `process` is pure with respect to the outside world: it mutates only the
//! owned turn state and returns the effects the dispatcher must apply.

use serde_json::Value;
use thiserror::Error;

use crate::llm::{ContentPart, FinishReason, Fragment, ResponseMetadata, Usage};
use crate::tools::ToolCallRecord;

/// Effects produced while processing one fragment
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchEffect {
    /// Forward a fragment to the observer
    Forward(Fragment),
    /// Notify the error collaborator
    NotifyError(String),
}

/// Result of processing one fragment
#[derive(Debug, Default)]
pub struct Processed {
    pub effects: Vec<DispatchEffect>,
    /// No further fragments are processed for this turn
    pub stop: bool,
}

impl Processed {
    fn forward(fragment: Fragment) -> Self {
        Self {
            effects: vec![DispatchEffect::Forward(fragment)],
            stop: false,
        }
    }

    fn none() -> Self {
        Self::default()
    }
}

/// Failure while processing a single fragment
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FragmentError {
    #[error("tool call {id} has an empty tool name")]
    EmptyToolName { id: String },
    #[error("invalid arguments for tool call {id}: {message}")]
    InvalidToolArgs { id: String, message: String },
}

/// Step fields captured from the stream before the turn is finalized
#[derive(Debug, Clone, Default)]
pub struct PendingStepResult {
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub provider_metadata: Option<Value>,
    pub warnings: Vec<String>,
    pub finished: bool,
}

/// Everything one turn's fragment stream produced
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// Assistant content in commit order, tool-call parts last
    pub content: Vec<ContentPart>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub provider_metadata: Option<Value>,
    pub warnings: Vec<String>,
    pub response: ResponseMetadata,
    pub error: Option<String>,
}

impl TurnOutcome {
    pub fn errored(&self) -> bool {
        self.error.is_some()
    }
}

/// Ephemeral state for one turn. Created per turn and consumed by `finish`.
#[derive(Debug, Default)]
pub struct TurnAccumulator {
    is_streaming_text: bool,
    text_deltas: Vec<String>,
    is_streaming_reasoning: bool,
    reasoning_deltas: Vec<String>,
    has_tool_streaming_started: bool,
    has_errored: bool,
    error: Option<String>,
    response_metadata: ResponseMetadata,
    pending: PendingStepResult,
    content: Vec<ContentPart>,
    tool_calls: Vec<ToolCallRecord>,
}

impl TurnAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_errored(&self) -> bool {
        self.has_errored
    }

    pub fn is_streaming_text(&self) -> bool {
        self.is_streaming_text
    }

    pub fn is_streaming_reasoning(&self) -> bool {
        self.is_streaming_reasoning
    }

    pub fn pending(&self) -> &PendingStepResult {
        &self.pending
    }

    /// Parts committed so far
    pub fn content(&self) -> &[ContentPart] {
        &self.content
    }

    /// Process one fragment in arrival order
    pub fn process(&mut self, fragment: Fragment) -> Result<Processed, FragmentError> {
        if self.has_errored {
            return Ok(Processed {
                effects: vec![],
                stop: true,
            });
        }

        if !matches!(fragment, Fragment::TextDelta { .. }) && !fragment.is_reasoning_family() {
            self.close_text();
        }
        if !fragment.is_reasoning_family() {
            self.close_reasoning(None);
        }

        let processed = match fragment {
            Fragment::StreamStart { warnings } => {
                self.pending.warnings.extend(warnings);
                Processed::none()
            }

            Fragment::ResponseMetadata {
                id,
                timestamp,
                model_id,
                headers,
            } => {
                let meta = &mut self.response_metadata;
                meta.id = id.or(meta.id.take());
                meta.timestamp = timestamp.or(meta.timestamp.take());
                meta.model_id = model_id.or(meta.model_id.take());
                meta.headers.extend(headers);
                Processed::none()
            }

            Fragment::TextDelta { text } => {
                self.is_streaming_text = true;
                self.text_deltas.push(text.clone());
                Processed::forward(Fragment::TextDelta { text })
            }

            Fragment::ReasoningDelta { text } => {
                self.is_streaming_reasoning = true;
                self.reasoning_deltas.push(text.clone());
                Processed::forward(Fragment::ReasoningDelta { text })
            }

            Fragment::ReasoningSignature { signature } => {
                self.close_reasoning(Some(signature.clone()));
                Processed::forward(Fragment::ReasoningSignature { signature })
            }

            Fragment::RedactedReasoning { data } => {
                self.content.push(ContentPart::RedactedReasoning { data });
                Processed::none()
            }

            Fragment::ToolCallStreamingStart {
                tool_call_id,
                tool_name,
            } => {
                if self.has_tool_streaming_started {
                    Processed::none()
                } else {
                    self.has_tool_streaming_started = true;
                    Processed::forward(Fragment::ToolCallStreamingStart {
                        tool_call_id,
                        tool_name,
                    })
                }
            }

            Fragment::ToolCallDelta {
                tool_call_id,
                tool_name,
                args_text_delta,
            } => {
                let mut effects = Vec::with_capacity(2);
                if !self.has_tool_streaming_started {
                    self.has_tool_streaming_started = true;
                    effects.push(DispatchEffect::Forward(Fragment::ToolCallStreamingStart {
                        tool_call_id: tool_call_id.clone(),
                        tool_name: tool_name.clone(),
                    }));
                }
                effects.push(DispatchEffect::Forward(Fragment::ToolCallDelta {
                    tool_call_id,
                    tool_name,
                    args_text_delta,
                }));
                Processed {
                    effects,
                    stop: false,
                }
            }

            Fragment::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => {
                if tool_name.is_empty() {
                    return Err(FragmentError::EmptyToolName { id: tool_call_id });
                }
                let parsed = parse_args(&tool_call_id, &args)?;
                self.tool_calls
                    .push(ToolCallRecord::new(tool_call_id.clone(), tool_name.clone(), parsed));
                Processed::forward(Fragment::ToolCall {
                    tool_call_id,
                    tool_name,
                    args,
                })
            }

            Fragment::Source(source) => {
                self.content.push(ContentPart::Source(source.clone()));
                Processed::forward(Fragment::Source(source))
            }

            Fragment::File { data, mime_type } => {
                self.content.push(ContentPart::File {
                    data: data.clone(),
                    mime_type: mime_type.clone(),
                });
                Processed::forward(Fragment::File { data, mime_type })
            }

            Fragment::Error { message } => {
                self.mark_errored(&message);
                Processed {
                    effects: vec![
                        DispatchEffect::Forward(Fragment::Error {
                            message: message.clone(),
                        }),
                        DispatchEffect::NotifyError(message),
                    ],
                    stop: true,
                }
            }

            Fragment::Finish {
                finish_reason,
                usage,
                provider_metadata,
            } => {
                self.pending.finish_reason = finish_reason;
                self.pending.usage = usage;
                self.pending.provider_metadata = provider_metadata;
                self.pending.finished = true;
                Processed {
                    effects: vec![],
                    stop: true,
                }
            }
        };

        Ok(processed)
    }

    /// Record a local processing failure as a turn error
    pub fn fail(&mut self, error: &FragmentError) -> Vec<DispatchEffect> {
        let message = error.to_string();
        self.mark_errored(&message);
        vec![
            DispatchEffect::Forward(Fragment::Error {
                message: message.clone(),
            }),
            DispatchEffect::NotifyError(message),
        ]
    }

    fn mark_errored(&mut self, message: &str) {
        self.has_errored = true;
        self.error = Some(message.to_string());
        self.pending.finish_reason = FinishReason::Error;
    }

    fn close_text(&mut self) {
        if !self.is_streaming_text {
            return;
        }
        self.is_streaming_text = false;
        let text: String = self.text_deltas.drain(..).collect();
        if !text.is_empty() {
            self.content.push(ContentPart::text(text));
        }
    }

    fn close_reasoning(&mut self, signature: Option<String>) {
        if !self.is_streaming_reasoning {
            return;
        }
        self.is_streaming_reasoning = false;
        let text: String = self.reasoning_deltas.drain(..).collect();
        if !text.is_empty() {
            self.content.push(ContentPart::reasoning(text, signature));
        }
    }

    /// Close buffers and produce the turn outcome.
    ///
    /// Completed tool calls are appended after all other content. Trailing
    /// text is committed only when there are none. An errored turn drops its
    /// tool calls so no tool phase runs.
    pub fn finish(mut self) -> TurnOutcome {
        let tool_calls = if self.has_errored {
            Vec::new()
        } else {
            std::mem::take(&mut self.tool_calls)
        };

        if tool_calls.is_empty() {
            self.close_text();
        } else if self.is_streaming_text {
            tracing::debug!(
                tool_calls = tool_calls.len(),
                "Dropping trailing text after completed tool calls"
            );
            self.is_streaming_text = false;
            self.text_deltas.clear();
        }
        self.close_reasoning(None);

        self.content.extend(
            tool_calls
                .iter()
                .map(|call| ContentPart::tool_call(&call.id, &call.name, call.args.clone())),
        );

        TurnOutcome {
            content: self.content,
            tool_calls,
            finish_reason: self.pending.finish_reason,
            usage: self.pending.usage,
            provider_metadata: self.pending.provider_metadata,
            warnings: self.pending.warnings,
            response: self.response_metadata,
            error: self.error,
        }
    }
}

fn parse_args(id: &str, args: &str) -> Result<Value, FragmentError> {
    if args.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(args).map_err(|e| FragmentError::InvalidToolArgs {
        id: id.to_string(),
        message: e.to_string(),
    })
}
