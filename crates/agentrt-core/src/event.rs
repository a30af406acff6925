//! The transcript event model.
//!
//! `Event` is a tagged union mirroring `ai::types::Content` in the teacher
//! (`ToolUse`/`ToolResult` become `ToolCall`/`FunctionCallOutput`), widened
//! to also carry the loop-level records the spec requires (`ApiRequest`,
//! `Response`). Every event is `serde`-derived so it round-trips through
//! `persistence` unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::types::Usage;

/// One entry in the append-only transcript.
///
/// `sequence_num` is stamped by the persistence layer at append time, never
/// trusted from the caller — the same pattern as
/// `storage::messages::MessageStore::save_message` setting `created_at`
/// itself rather than accepting a caller-supplied timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub sequence_num: u64,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// The variant payload of an `Event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    SystemText { text: String },
    UserText { text: String },
    AssistantText { text: String },
    ToolCall {
        name: String,
        args_json: Value,
        call_id: String,
    },
    FunctionCallOutput {
        call_id: String,
        result: ToolCallResultRecord,
    },
    Reasoning {
        /// Opaque provider-private payload; never replayed across a
        /// different `response_id`.
        data: Value,
        response_id: String,
    },
    ApiRequest {
        request: Value,
        model: String,
        request_id: String,
        phase_number: u64,
    },
    Response {
        response_id: String,
        request_id: String,
        usage: Usage,
        model: String,
        created_at: chrono::DateTime<chrono::Utc>,
    },
}

/// The `function_call_output` payload, a persisted mirror of `ToolCallResult`
/// (see `tool.rs`) so a tool result round-trips without losing its shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResultRecord {
    pub content_text: String,
    pub structured_content: Option<Value>,
    pub is_error: bool,
    /// Set by the policy gateway on reserved-code failures; `None` for an
    /// ordinary tool error.
    pub reserved_code: Option<i64>,
}

impl EventKind {
    pub fn is_assistant_text(&self) -> bool {
        matches!(self, EventKind::AssistantText { .. })
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, EventKind::ToolCall { .. })
    }

    pub fn is_reasoning(&self) -> bool {
        matches!(self, EventKind::Reasoning { .. })
    }

    /// The `call_id` this event is keyed by, for `ToolCall` and
    /// `FunctionCallOutput` events.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            EventKind::ToolCall { call_id, .. } => Some(call_id),
            EventKind::FunctionCallOutput { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

/// The in-memory transcript: an append-only log plus the invariant checks
/// the spec requires at append time.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    events: Vec<Event>,
    next_sequence: u64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a transcript from a persisted, already-ordered event log
    /// (used by replay — the events already carry their sequence numbers).
    pub fn from_events(events: Vec<Event>) -> Self {
        let next_sequence = events.last().map(|e| e.sequence_num + 1).unwrap_or(0);
        Self {
            events,
            next_sequence,
        }
    }

    /// Append a new event, stamping its `sequence_num`.
    ///
    /// Panics (a programming error per the spec's error taxonomy, not a
    /// recoverable failure) if a `FunctionCallOutput` references a
    /// `call_id` with no preceding `ToolCall`.
    pub fn append(&mut self, kind: EventKind) -> &Event {
        if let EventKind::FunctionCallOutput { call_id, .. } = &kind {
            let has_matching_call = self.events.iter().any(|e| {
                matches!(&e.kind, EventKind::ToolCall { call_id: c, .. } if c == call_id)
            });
            assert!(
                has_matching_call,
                "function_call_output {call_id} has no preceding tool_call in this transcript"
            );
        }
        let sequence_num = self.next_sequence;
        self.next_sequence += 1;
        self.events.push(Event { sequence_num, kind });
        self.events.last().expect("just pushed")
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Truncate to the last `keep` logical turns, dropping reasoning blocks
    /// outside that tail. A turn starts at a `UserText` event; everything
    /// from the `keep`-th turn start (counting from the end) onward is
    /// preserved verbatim minus any `Reasoning` events now outside the tail.
    pub fn compact(&mut self, keep: usize) {
        if keep == 0 {
            self.events.clear();
            return;
        }
        let turn_starts: Vec<usize> = self
            .events
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.kind, EventKind::UserText { .. }))
            .map(|(i, _)| i)
            .collect();

        if turn_starts.len() <= keep {
            return;
        }

        let cut_from = turn_starts[turn_starts.len() - keep];
        self.events = self
            .events
            .split_off(cut_from)
            .into_iter()
            .filter(|e| !e.kind.is_reasoning())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_monotonic() {
        let mut t = Transcript::new();
        t.append(EventKind::UserText {
            text: "hi".into(),
        });
        t.append(EventKind::AssistantText {
            text: "there".into(),
        });
        let seqs: Vec<u64> = t.events().iter().map(|e| e.sequence_num).collect();
        assert_eq!(seqs, vec![0, 1]);
    }

    #[test]
    #[should_panic(expected = "has no preceding tool_call")]
    fn function_call_output_requires_preceding_tool_call() {
        let mut t = Transcript::new();
        t.append(EventKind::FunctionCallOutput {
            call_id: "missing".into(),
            result: ToolCallResultRecord {
                content_text: String::new(),
                structured_content: None,
                is_error: false,
                reserved_code: None,
            },
        });
    }

    #[test]
    fn compact_drops_reasoning_outside_tail() {
        let mut t = Transcript::new();
        t.append(EventKind::UserText { text: "1".into() });
        t.append(EventKind::Reasoning {
            data: Value::Null,
            response_id: "r1".into(),
        });
        t.append(EventKind::AssistantText { text: "a1".into() });
        t.append(EventKind::UserText { text: "2".into() });
        t.append(EventKind::AssistantText { text: "a2".into() });

        t.compact(1);
        assert_eq!(t.events().len(), 2);
        assert!(matches!(t.events()[0].kind, EventKind::UserText { .. }));
        assert!(!t.events().iter().any(|e| e.kind.is_reasoning()));
    }
}
