//! Pure fold from the event log to the UI's item list, per §4.8.
//!
//! Grounded on the same shape as `event.rs`'s own transcript model: no I/O,
//! no async, just `fold(events) -> Vec<UiItem>` so a caller (a CLI renderer,
//! a web view) can reconstruct what a user should see without re-deriving
//! the projection rules themselves.

use std::collections::HashMap;

use serde::Serialize;

use crate::event::{Event, EventKind, ToolCallResultRecord};

/// One renderable item. `system_text` events are dropped entirely (they are
/// never user-visible) and so have no corresponding variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiItem {
    UserMessage {
        text: String,
    },
    AssistantMarkdown {
        text: String,
    },
    /// The separator produced by a `ui.end_turn` tool call and its output;
    /// the call itself never becomes a `Tool` item.
    EndTurn,
    Tool {
        name: String,
        call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<ToolCallResultRecord>,
    },
}

/// Reserved tool names that the projection treats specially rather than as
/// ordinary tool calls (they carry loop-level UI meaning, not a mounted
/// tool's result).
const END_TURN_TOOL: &str = "ui.end_turn";
const SEND_MESSAGE_TOOL: &str = "ui.send_message";

enum Slot {
    /// Index into `items` of the `Tool` entry awaiting its result.
    Tool(usize),
    EndTurn,
    SendMessage,
}

/// Fold a full or partial event log into the ordered list of UI items.
pub fn fold(events: &[Event]) -> Vec<UiItem> {
    let mut items: Vec<UiItem> = Vec::new();
    let mut slots: HashMap<String, Slot> = HashMap::new();

    for event in events {
        match &event.kind {
            EventKind::SystemText { .. }
            | EventKind::Reasoning { .. }
            | EventKind::ApiRequest { .. }
            | EventKind::Response { .. } => {}

            EventKind::UserText { text } => items.push(UiItem::UserMessage { text: text.clone() }),

            EventKind::AssistantText { text } => {
                items.push(UiItem::AssistantMarkdown { text: text.clone() })
            }

            EventKind::ToolCall {
                name,
                call_id,
                args_json: _,
            } => match name.as_str() {
                END_TURN_TOOL => {
                    slots.insert(call_id.clone(), Slot::EndTurn);
                }
                SEND_MESSAGE_TOOL => {
                    slots.insert(call_id.clone(), Slot::SendMessage);
                }
                _ => {
                    let idx = items.len();
                    items.push(UiItem::Tool {
                        name: name.clone(),
                        call_id: call_id.clone(),
                        result: None,
                    });
                    slots.insert(call_id.clone(), Slot::Tool(idx));
                }
            },

            EventKind::FunctionCallOutput { call_id, result } => match slots.get(call_id) {
                Some(Slot::EndTurn) => items.push(UiItem::EndTurn),
                Some(Slot::SendMessage) => items.push(UiItem::AssistantMarkdown {
                    text: result.content_text.clone(),
                }),
                Some(Slot::Tool(idx)) => {
                    if let Some(UiItem::Tool { result: slot, .. }) = items.get_mut(*idx) {
                        *slot = Some(result.clone());
                    }
                }
                None => {}
            },
        }
    }

    items
}
