//! Built-in handlers with loop-control-only side effects: counting turns,
//! enforcing a maximum turn count, and a fixed-interval compaction nudge.
//! None of these touch tool dispatch or policy — they only ever return
//! `Abort`, `Compact`, or `NoAction` from `on_before_sample`.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::event::{Event, EventKind, Transcript};

use super::{Handler, LoopDecision};

/// Counts `UserText` events as turns (a new turn begins whenever the user
/// speaks) and aborts once `max_turns` is reached, independent of
/// `AgentLoopConfig::max_iterations` (which bounds sample/tool-call round
/// trips, not conversational turns).
pub struct MaxTurnsHandler {
    max_turns: usize,
    turns_seen: AtomicUsize,
}

impl MaxTurnsHandler {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            turns_seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Handler for MaxTurnsHandler {
    async fn on_event(&self, event: &Event) {
        if matches!(event.kind, EventKind::UserText { .. }) {
            self.turns_seen.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn on_before_sample(&self, _transcript: &Transcript) -> LoopDecision {
        if self.turns_seen.load(Ordering::SeqCst) >= self.max_turns {
            LoopDecision::Abort
        } else {
            LoopDecision::NoAction
        }
    }

    fn name(&self) -> &str {
        "max_turns"
    }
}

/// Requests compaction once the transcript crosses `trigger_len` events,
/// keeping the most recent `keep_turns` turns. Re-fires on every pass past
/// the threshold; harmless since `Transcript::compact` is idempotent once
/// the tail is already within `keep_turns`.
pub struct LengthCompactionHandler {
    trigger_len: usize,
    keep_turns: usize,
}

impl LengthCompactionHandler {
    pub fn new(trigger_len: usize, keep_turns: usize) -> Self {
        Self {
            trigger_len,
            keep_turns,
        }
    }
}

#[async_trait]
impl Handler for LengthCompactionHandler {
    async fn on_before_sample(&self, transcript: &Transcript) -> LoopDecision {
        if transcript.len() >= self.trigger_len {
            LoopDecision::Compact {
                keep: self.keep_turns,
            }
        } else {
            LoopDecision::NoAction
        }
    }

    fn name(&self) -> &str {
        "length_compaction"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn max_turns_aborts_once_reached() {
        let handler = MaxTurnsHandler::new(2);
        let transcript = Transcript::new();

        for _ in 0..2 {
            handler
                .on_event(&Event {
                    sequence_num: 0,
                    kind: EventKind::UserText {
                        text: "hi".into(),
                    },
                })
                .await;
        }

        assert_eq!(
            handler.on_before_sample(&transcript).await,
            LoopDecision::Abort
        );
    }

    #[tokio::test]
    async fn max_turns_allows_under_threshold() {
        let handler = MaxTurnsHandler::new(5);
        let transcript = Transcript::new();
        handler
            .on_event(&Event {
                sequence_num: 0,
                kind: EventKind::UserText {
                    text: "hi".into(),
                },
            })
            .await;
        assert_eq!(
            handler.on_before_sample(&transcript).await,
            LoopDecision::NoAction
        );
    }

    #[tokio::test]
    async fn length_compaction_triggers_past_threshold() {
        let handler = LengthCompactionHandler::new(2, 1);
        let mut transcript = Transcript::new();
        transcript.append(EventKind::UserText { text: "1".into() });
        transcript.append(EventKind::AssistantText { text: "2".into() });

        assert_eq!(
            handler.on_before_sample(&transcript).await,
            LoopDecision::Compact { keep: 1 }
        );
    }
}
