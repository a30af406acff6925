//! Handler composition: the reducer that drives loop-control decisions.
//!
//! Supplemented from the spec — the teacher's orchestrator is a single
//! monolithic function with no reducer concept. Built in the teacher's
//! trait-object-list idiom (`Vec<Arc<dyn PreToolHook>>` in
//! `ToolRegistry`), generalized to `Vec<Arc<dyn Handler>>` folded by the
//! free function `reduce`.

pub mod builtin;

use std::sync::Arc;

use async_trait::async_trait;

use crate::event::{Event, EventKind, Transcript};

/// What the loop should do after one reducer pass.
#[derive(Debug, Clone, PartialEq)]
pub enum LoopDecision {
    NoAction,
    InjectItems { items: Vec<EventKind> },
    Abort,
    Compact { keep: usize },
}

/// One participant in the reducer. Event hooks default to no-ops so a
/// handler only needs to implement what it cares about; `on_before_sample`
/// is the sole decision point.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn on_before_sample(&self, _transcript: &Transcript) -> LoopDecision {
        LoopDecision::NoAction
    }

    /// Called once for every event appended to the transcript, including
    /// ones this handler itself injected, so handlers can keep per-run
    /// counters (e.g. turns elapsed) without re-deriving state from the
    /// transcript on every pass.
    async fn on_event(&self, _event: &Event) {}

    fn name(&self) -> &str {
        "handler"
    }
}

/// A programming error raised by `reduce` rather than swallowed: a bug in
/// handler composition, not a runtime failure a caller can recover from.
#[derive(Debug, thiserror::Error)]
#[error("reducer conflict: {0}")]
pub struct ReducerConflict(pub String);

/// Fold every handler's `on_before_sample` decision into one, per §4.6's
/// merge rules.
pub async fn reduce(
    handlers: &[Arc<dyn Handler>],
    transcript: &Transcript,
) -> Result<LoopDecision, ReducerConflict> {
    let mut abort = false;
    let mut injected: Vec<EventKind> = Vec::new();
    let mut compact_keep: Option<usize> = None;

    for handler in handlers {
        match handler.on_before_sample(transcript).await {
            LoopDecision::NoAction => {}
            LoopDecision::Abort => abort = true,
            LoopDecision::InjectItems { items } => injected.extend(items),
            LoopDecision::Compact { keep } => {
                compact_keep = Some(compact_keep.map_or(keep, |current| current.min(keep)));
            }
        }
    }

    if abort {
        if !injected.is_empty() || compact_keep.is_some() {
            return Err(ReducerConflict(
                "Abort conflicts with a Continue-like decision (InjectItems/Compact) from another handler"
                    .to_string(),
            ));
        }
        return Ok(LoopDecision::Abort);
    }

    if !injected.is_empty() {
        return Ok(LoopDecision::InjectItems { items: injected });
    }

    if let Some(keep) = compact_keep {
        return Ok(LoopDecision::Compact { keep });
    }

    Ok(LoopDecision::NoAction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    struct AbortHandler;
    #[async_trait]
    impl Handler for AbortHandler {
        async fn on_before_sample(&self, _transcript: &Transcript) -> LoopDecision {
            LoopDecision::Abort
        }
    }

    struct InjectHandler(&'static str);
    #[async_trait]
    impl Handler for InjectHandler {
        async fn on_before_sample(&self, _transcript: &Transcript) -> LoopDecision {
            LoopDecision::InjectItems {
                items: vec![EventKind::SystemText {
                    text: self.0.to_string(),
                }],
            }
        }
    }

    struct CompactHandler(usize);
    #[async_trait]
    impl Handler for CompactHandler {
        async fn on_before_sample(&self, _transcript: &Transcript) -> LoopDecision {
            LoopDecision::Compact { keep: self.0 }
        }
    }

    #[tokio::test]
    async fn all_no_action_yields_no_action() {
        struct Noop;
        #[async_trait]
        impl Handler for Noop {}

        let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(Noop), Arc::new(Noop)];
        let transcript = Transcript::new();
        let decision = reduce(&handlers, &transcript).await.unwrap();
        assert_eq!(decision, LoopDecision::NoAction);
    }

    #[tokio::test]
    async fn abort_wins_over_no_action() {
        struct Noop;
        #[async_trait]
        impl Handler for Noop {}

        let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(Noop), Arc::new(AbortHandler)];
        let transcript = Transcript::new();
        let decision = reduce(&handlers, &transcript).await.unwrap();
        assert_eq!(decision, LoopDecision::Abort);
    }

    #[tokio::test]
    async fn abort_conflicting_with_inject_raises() {
        let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(AbortHandler), Arc::new(InjectHandler("x"))];
        let transcript = Transcript::new();
        let result = reduce(&handlers, &transcript).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn multiple_injects_concatenate_preserving_order() {
        let handlers: Vec<Arc<dyn Handler>> =
            vec![Arc::new(InjectHandler("first")), Arc::new(InjectHandler("second"))];
        let transcript = Transcript::new();
        let decision = reduce(&handlers, &transcript).await.unwrap();
        match decision {
            LoopDecision::InjectItems { items } => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[0], EventKind::SystemText{text} if text == "first"));
                assert!(matches!(&items[1], EventKind::SystemText{text} if text == "second"));
            }
            other => panic!("expected InjectItems, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn compact_takes_minimum_keep() {
        let handlers: Vec<Arc<dyn Handler>> = vec![Arc::new(CompactHandler(5)), Arc::new(CompactHandler(2))];
        let transcript = Transcript::new();
        let decision = reduce(&handlers, &transcript).await.unwrap();
        assert_eq!(decision, LoopDecision::Compact { keep: 2 });
    }
}
