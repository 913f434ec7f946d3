//! Tool registry and tool-call records
//!
//! Tools are stateless: all per-call context arrives via `ToolContext`.

mod invoker;

pub use invoker::invoke_tool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::llm::{Message, ToolDefinition};

/// Outcome attached to a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success(Value),
    Failure(String),
}

/// A tool call requested by the model.
///
/// The outcome is attached at most once and the record is immutable after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    outcome: Option<ToolOutcome>,
}

/// Attempted to settle a record twice
#[derive(Debug, Error, PartialEq, Eq)]
#[error("tool call {0} already settled")]
pub struct AlreadySettled(pub String);

impl ToolCallRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
            outcome: None,
        }
    }

    pub fn attach_result(&mut self, result: Value) -> Result<(), AlreadySettled> {
        self.settle(ToolOutcome::Success(result))
    }

    pub fn attach_error(&mut self, error: impl Into<String>) -> Result<(), AlreadySettled> {
        self.settle(ToolOutcome::Failure(error.into()))
    }

    fn settle(&mut self, outcome: ToolOutcome) -> Result<(), AlreadySettled> {
        if self.outcome.is_some() {
            return Err(AlreadySettled(self.id.clone()));
        }
        self.outcome = Some(outcome);
        Ok(())
    }

    pub fn outcome(&self) -> Option<&ToolOutcome> {
        self.outcome.as_ref()
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Some(ToolOutcome::Success(value)) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Some(ToolOutcome::Failure(message)) => Some(message),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Some(ToolOutcome::Failure(_)))
    }
}

/// Failure reported by a tool
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Execution(String),
}

/// All context needed for a tool invocation.
///
/// Created fresh for each tool call.
#[derive(Clone)]
pub struct ToolContext {
    /// The call being executed
    pub call_id: String,

    /// Cancellation signal for long-running operations
    pub cancel: CancellationToken,

    /// User-authored messages only, shared read-only across concurrent calls
    pub context_messages: Arc<[Message]>,
}

impl ToolContext {
    pub fn new(
        call_id: impl Into<String>,
        cancel: CancellationToken,
        context_messages: Arc<[Message]>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            cancel,
            context_messages,
        }
    }
}

/// Trait for tools that can be executed by the agent
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Alternate identifier the model may call this tool by
    fn id(&self) -> Option<&str> {
        None
    }

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool.
    ///
    /// Tools that do long-running work should monitor `ctx.cancel`.
    async fn run(&self, args: Value, ctx: ToolContext) -> Result<Value, ToolError>;
}

/// Closed set of tool kinds a registry can hold
#[derive(Clone)]
pub enum ToolDescriptor {
    /// Executed locally
    Function(Arc<dyn Tool>),
    /// Declarative-only: advertised to the model, result supplied out-of-band
    Declarative {
        name: String,
        description: String,
        input_schema: Value,
    },
    /// Provider-defined: executed by the provider, addressable by its `id`
    ProviderDefined {
        id: String,
        name: String,
        args: Value,
    },
}

impl ToolDescriptor {
    pub fn name(&self) -> &str {
        match self {
            ToolDescriptor::Function(tool) => tool.name(),
            ToolDescriptor::Declarative { name, .. } | ToolDescriptor::ProviderDefined { name, .. } => {
                name
            }
        }
    }

    /// Alternate identifier the model may use instead of the name
    pub fn alternate_id(&self) -> Option<&str> {
        match self {
            ToolDescriptor::Function(tool) => tool.id(),
            ToolDescriptor::ProviderDefined { id, .. } => Some(id),
            ToolDescriptor::Declarative { .. } => None,
        }
    }

    pub fn is_executable(&self) -> bool {
        matches!(self, ToolDescriptor::Function(_))
    }

    pub fn definition(&self) -> ToolDefinition {
        match self {
            ToolDescriptor::Function(tool) => ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description(),
                input_schema: tool.input_schema(),
                provider_id: tool.id().map(str::to_string),
            },
            ToolDescriptor::Declarative {
                name,
                description,
                input_schema,
            } => ToolDefinition {
                name: name.clone(),
                description: description.clone(),
                input_schema: input_schema.clone(),
                provider_id: None,
            },
            ToolDescriptor::ProviderDefined { id, name, args } => ToolDefinition {
                name: name.clone(),
                description: String::new(),
                input_schema: args.clone(),
                provider_id: Some(id.clone()),
            },
        }
    }
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ToolDescriptor::Function(tool) => f.debug_tuple("Function").field(&tool.name()).finish(),
            ToolDescriptor::Declarative { name, .. } => {
                f.debug_struct("Declarative").field("name", name).finish_non_exhaustive()
            }
            ToolDescriptor::ProviderDefined { id, name, .. } => f
                .debug_struct("ProviderDefined")
                .field("id", id)
                .field("name", name)
                .finish_non_exhaustive(),
        }
    }
}

/// Collection of tools available to a run
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(ToolDescriptor::Function(Arc::new(tool)));
        self
    }

    #[must_use]
    pub fn with_descriptor(mut self, descriptor: ToolDescriptor) -> Self {
        self.tools.push(descriptor);
        self
    }

    /// Resolve by exact name, then by alternate identifier
    pub fn resolve(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .or_else(|| self.tools.iter().find(|t| t.alternate_id() == Some(name)))
    }

    /// Get all tool definitions for the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(ToolDescriptor::definition).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
