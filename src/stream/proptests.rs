//! Property-based tests for delta accumulation
//!
//! These tests verify the buffering invariants hold for arbitrary fragment
//! sequences.

use super::accumulator::TurnAccumulator;
use crate::llm::{ContentPart, FinishReason, Fragment, Usage};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Strategies
// ============================================================================

fn arb_delta_text() -> impl Strategy<Value = String> {
    "[a-zA-Z ,.!]{0,12}"
}

#[derive(Debug, Clone)]
enum Delta {
    Text(String),
    Reasoning(String),
}

fn arb_delta() -> impl Strategy<Value = Delta> {
    prop_oneof![
        arb_delta_text().prop_map(Delta::Text),
        arb_delta_text().prop_map(Delta::Reasoning),
    ]
}

fn run(fragments: Vec<Fragment>) -> Vec<ContentPart> {
    let mut acc = TurnAccumulator::new();
    for fragment in fragments {
        let processed = acc.process(fragment).expect("valid fragment");
        if processed.stop {
            break;
        }
    }
    acc.finish().content
}

fn texts(parts: &[ContentPart]) -> Vec<&str> {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn reasonings(parts: &[ContentPart]) -> Vec<&str> {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Reasoning { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// Concatenating every text delta equals the committed text part
    #[test]
    fn prop_text_deltas_concatenate(deltas in proptest::collection::vec(arb_delta_text(), 1..20)) {
        let expected: String = deltas.concat();
        let mut fragments: Vec<Fragment> = deltas.into_iter().map(Fragment::text).collect();
        fragments.push(Fragment::finish(FinishReason::Stop, Usage::default()));

        let parts = run(fragments);
        let committed = texts(&parts);

        if expected.is_empty() {
            prop_assert!(committed.is_empty());
        } else {
            prop_assert_eq!(committed, vec![expected.as_str()]);
        }
    }

    /// Reasoning deltas never split the text buffer
    #[test]
    fn prop_interleaved_reasoning_keeps_one_text_part(deltas in proptest::collection::vec(arb_delta(), 1..30)) {
        let expected_text: String = deltas
            .iter()
            .filter_map(|d| match d {
                Delta::Text(t) => Some(t.as_str()),
                Delta::Reasoning(_) => None,
            })
            .collect();
        let expected_reasoning: String = deltas
            .iter()
            .filter_map(|d| match d {
                Delta::Reasoning(r) => Some(r.as_str()),
                Delta::Text(_) => None,
            })
            .collect();

        let mut fragments: Vec<Fragment> = deltas
            .into_iter()
            .map(|d| match d {
                Delta::Text(t) => Fragment::text(t),
                Delta::Reasoning(r) => Fragment::reasoning(r),
            })
            .collect();
        fragments.push(Fragment::finish(FinishReason::Stop, Usage::default()));

        let parts = run(fragments);
        prop_assert!(texts(&parts).len() <= 1);
        prop_assert_eq!(texts(&parts).concat(), expected_text);
        prop_assert_eq!(reasonings(&parts).concat(), expected_reasoning);
    }

    /// One uninterrupted reasoning run commits at most one reasoning part
    #[test]
    fn prop_reasoning_run_commits_once(
        deltas in proptest::collection::vec(arb_delta_text(), 1..20),
        signature in proptest::option::of("[a-f0-9]{8}"),
    ) {
        let expected: String = deltas.concat();
        let mut fragments: Vec<Fragment> = deltas.into_iter().map(Fragment::reasoning).collect();
        if let Some(signature) = signature.clone() {
            fragments.push(Fragment::ReasoningSignature { signature });
        }
        fragments.push(Fragment::finish(FinishReason::Stop, Usage::default()));

        let parts = run(fragments);
        let committed: Vec<_> = parts
            .iter()
            .filter(|p| matches!(p, ContentPart::Reasoning { .. }))
            .collect();

        if expected.is_empty() {
            prop_assert!(committed.is_empty());
        } else {
            prop_assert_eq!(committed.len(), 1);
            prop_assert_eq!(
                committed[0],
                &ContentPart::reasoning(expected, signature)
            );
        }
    }

    /// Tool-call parts come last, in emission order
    #[test]
    fn prop_tool_calls_follow_content(
        text in "[a-z]{1,10}",
        names in proptest::collection::vec("[a-z_]{3,10}", 1..5),
    ) {
        let mut fragments = vec![Fragment::text(text.clone())];
        for (i, name) in names.iter().enumerate() {
            fragments.push(Fragment::tool_call(format!("call-{i}"), name, &json!({ "i": i })));
        }
        fragments.push(Fragment::finish(FinishReason::ToolCalls, Usage::default()));

        let parts = run(fragments);
        prop_assert_eq!(parts.len(), names.len() + 1);
        prop_assert_eq!(&parts[0], &ContentPart::text(text));
        for (i, name) in names.iter().enumerate() {
            prop_assert_eq!(
                &parts[i + 1],
                &ContentPart::tool_call(format!("call-{i}"), name.clone(), json!({ "i": i }))
            );
        }
    }
}
