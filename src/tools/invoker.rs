//! Executes one tool call and classifies its outcome

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{ToolCallRecord, ToolContext, ToolDescriptor, ToolError, ToolRegistry};
use crate::llm::Message;

/// Resolve and execute a tool call.
///
/// Failures are attached to the returned record and never propagated. A call
/// to a declarative-only tool is returned unsettled; its result arrives
/// out-of-band.
pub async fn invoke_tool(
    mut call: ToolCallRecord,
    registry: &ToolRegistry,
    context_messages: Arc<[Message]>,
    cancel: CancellationToken,
) -> ToolCallRecord {
    if call.is_settled() {
        return call;
    }

    let tool = match registry.resolve(&call.name) {
        Some(ToolDescriptor::Function(tool)) => Arc::clone(tool),
        Some(descriptor) => {
            tracing::debug!(
                tool = %call.name,
                call_id = %call.id,
                kind = ?descriptor,
                "Declarative tool, leaving call for out-of-band result"
            );
            return call;
        }
        None => {
            tracing::warn!(tool = %call.name, call_id = %call.id, "Tool not found");
            let missing = ToolError::NotFound(call.name.clone());
            settle(&mut call, Err(missing));
            return call;
        }
    };

    let span = tracing::info_span!("tool_call", tool = %call.name, call_id = %call.id);
    let ctx = ToolContext::new(call.id.clone(), cancel, context_messages);
    let outcome = tool.run(call.args.clone(), ctx).instrument(span).await;

    match &outcome {
        Ok(_) => tracing::debug!(tool = %call.name, call_id = %call.id, "Tool succeeded"),
        Err(e) => tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool failed"),
    }

    settle(&mut call, outcome);
    call
}

fn settle(call: &mut ToolCallRecord, outcome: Result<serde_json::Value, ToolError>) {
    let attached = match outcome {
        Ok(value) => call.attach_result(value),
        Err(e) => call.attach_error(e.to_string()),
    };
    // Unsettled on entry, so this cannot fail
    if let Err(e) = attached {
        tracing::error!(error = %e, "Tool call settled twice");
    }
}
