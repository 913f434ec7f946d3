//! Drives one turn's fragment stream through the accumulator

use futures::{Stream, StreamExt};

use super::accumulator::{DispatchEffect, TurnAccumulator, TurnOutcome};
use crate::llm::Fragment;
use crate::runtime::RunObserver;

/// Consume a turn's fragments strictly in arrival order.
///
/// Processing failures are recorded on the outcome rather than returned;
/// callers observe them through the forwarded `error` fragment and the
/// outcome's finish reason.
pub async fn dispatch_turn<S>(mut stream: S, observer: &dyn RunObserver) -> TurnOutcome
where
    S: Stream<Item = Fragment> + Unpin + Send,
{
    let mut acc = TurnAccumulator::new();
    let mut processed_count = 0usize;

    while let Some(fragment) = stream.next().await {
        processed_count += 1;
        let kind = fragment.kind();
        tracing::trace!(kind, "Processing fragment");

        match acc.process(fragment) {
            Ok(processed) => {
                apply(observer, processed.effects);
                if processed.stop {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(kind, error = %e, "Fragment processing failed, ending turn");
                let effects = acc.fail(&e);
                apply(observer, effects);
                break;
            }
        }
    }

    if !acc.pending().finished && !acc.has_errored() {
        tracing::warn!(
            fragments = processed_count,
            "Fragment stream ended without finish"
        );
    }

    let outcome = acc.finish();
    tracing::debug!(
        fragments = processed_count,
        parts = outcome.content.len(),
        tool_calls = outcome.tool_calls.len(),
        finish_reason = ?outcome.finish_reason,
        "Turn stream consumed"
    );
    outcome
}

fn apply(observer: &dyn RunObserver, effects: Vec<DispatchEffect>) {
    for effect in effects {
        match effect {
            DispatchEffect::Forward(fragment) => observer.on_fragment(&fragment),
            DispatchEffect::NotifyError(message) => observer.on_error(&message),
        }
    }
}
