//! Execution core for multi-turn model runs with tool calls.
//!
//! An [`Agent`] drives `invoke model -> maybe run tools -> maybe invoke model
//! again`. Each turn's fragment stream is accumulated into ordered content
//! parts, requested tools run with per-call failure isolation, and a
//! continuation policy decides whether another turn is warranted.
//!
//! The composition primitives in [`engine`] are reusable on their own.

pub mod config;
pub mod conversation;
pub mod engine;
pub mod error;
pub mod llm;
pub mod logging;
pub mod policy;
pub mod runtime;
pub mod stream;
pub mod tools;

pub use config::AgentConfig;
pub use conversation::Conversation;
pub use error::EngineError;
pub use llm::{LanguageModel, LoggingModel};
pub use policy::{StopCondition, TerminationReason};
pub use runtime::{Agent, BroadcastObserver, NoopObserver, RunEvent, RunObserver, RunOutput};
pub use tools::{Tool, ToolContext, ToolDescriptor, ToolError, ToolRegistry};
