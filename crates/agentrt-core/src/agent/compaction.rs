//! Compact-decision timing.
//!
//! The source material leaves open whether a `Compact` decision should
//! abort in-flight tool calls. This runtime's answer (an Open Question
//! decision recorded in `DESIGN.md`): `Compact` only takes effect between
//! turns, after `pending_function_calls` has drained. A `Compact` arriving
//! while calls are still pending is deferred, not dropped — the next
//! reducer pass (once the queue empties) will see it again only if a
//! handler still wants it, which is the handler's own responsibility.

use crate::event::Transcript;

/// Apply `keep` to `transcript` if the pending-call queue is empty.
/// Returns whether compaction actually ran.
pub fn apply(transcript: &mut Transcript, pending_calls_empty: bool, keep: usize) -> bool {
    if !pending_calls_empty {
        return false;
    }
    transcript.compact(keep);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn deferred_while_calls_pending() {
        let mut t = Transcript::new();
        t.append(EventKind::UserText { text: "hi".into() });
        let applied = apply(&mut t, false, 1);
        assert!(!applied);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn applies_once_queue_is_empty() {
        let mut t = Transcript::new();
        t.append(EventKind::UserText { text: "hi".into() });
        let applied = apply(&mut t, true, 1);
        assert!(applied);
    }
}
