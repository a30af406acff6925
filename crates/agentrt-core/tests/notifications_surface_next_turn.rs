//! End-to-end scenario 4: a mounted server emits notifications while a
//! tool call from turn N is executing; the coalesced `<system
//! notification>` envelope is injected as a `user_text` only starting at
//! turn N+1 — never inside the same iteration as the triggering tool
//! call.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use agentrt_core::agent::{Agent, AgentLoopConfig, AgentOutcome, ToolPolicy};
use agentrt_core::compositor::{Compositor, MountNotification};
use agentrt_core::event::EventKind;
use agentrt_core::notifications::NotificationsBuffer;
use agentrt_core::policy::{PolicyEngine, PolicyGateway};
use agentrt_core::tool::{ToolCallResult, ToolProvider, ToolSchema};
use agentrt_core::NotificationsHandler;
use tokio_util::sync::CancellationToken;

use common::{text_response, tool_call_response, ScriptedProvider};

/// A tool whose single call both returns a result and, as a side effect,
/// records a notification on the buffer — standing in for a mounted
/// server emitting `resources/updated` while its own tool call is still
/// in flight.
struct NotifyingTool {
    buffer: Arc<NotificationsBuffer>,
}

#[async_trait]
impl ToolProvider for NotifyingTool {
    async fn list_tools(&self) -> Vec<ToolSchema> {
        vec![ToolSchema {
            name: "touch".to_string(),
            description: "touches a resource".to_string(),
            input_schema: json!({"type": "object"}),
            output_schema: None,
        }]
    }

    async fn call_tool(&self, _name: &str, _args: Value) -> ToolCallResult {
        self.buffer
            .record(MountNotification::ListChanged {
                prefix: "docs".to_string(),
            })
            .await;
        self.buffer
            .record(MountNotification::ResourceUpdated {
                prefix: "docs".to_string(),
                uri: "resource://docs/a.md".to_string(),
            })
            .await;
        ToolCallResult::success("touched")
    }
}

#[tokio::test]
async fn notification_recorded_during_tool_call_surfaces_on_the_following_turn() {
    let buffer = Arc::new(NotificationsBuffer::new());

    let compositor = Compositor::new(PathBuf::from("."));
    compositor
        .mount_inproc(
            "docs",
            Arc::new(NotifyingTool {
                buffer: buffer.clone(),
            }),
            false,
        )
        .unwrap();

    let engine = Arc::new(PolicyEngine::new(PathBuf::from("."), Duration::from_secs(5)));
    let gateway = Arc::new(PolicyGateway::new(
        compositor.clone() as Arc<dyn ToolProvider>,
        engine.clone(),
    ));

    let provider = ScriptedProvider::new(vec![
        tool_call_response("resp-1", "docs_touch", "call-1", json!({})),
        text_response("resp-2", "done"),
    ]);

    let handlers: Vec<Arc<dyn agentrt_core::Handler>> =
        vec![Arc::new(NotificationsHandler::new(buffer.clone(), engine))];

    let mut agent = Agent::new(
        "agent-notify",
        "test-model",
        provider,
        gateway,
        ToolPolicy::AllowAnyToolOrText,
        handlers,
        AgentLoopConfig::default(),
    );

    let cancel = CancellationToken::new();
    let outcome = agent.run(&cancel).await.unwrap();
    assert!(matches!(outcome, AgentOutcome::AssistantText(ref t) if t == "done"));

    let events = agent.transcript().events();

    let call_idx = events
        .iter()
        .position(|e| matches!(&e.kind, EventKind::ToolCall { call_id, .. } if call_id == "call-1"))
        .expect("tool call recorded");
    let output_idx = events
        .iter()
        .position(|e| matches!(&e.kind, EventKind::FunctionCallOutput { call_id, .. } if call_id == "call-1"))
        .expect("function_call_output recorded");
    assert!(output_idx > call_idx);

    let notice_idx = events
        .iter()
        .position(|e| matches!(&e.kind, EventKind::UserText { text } if text.starts_with("<system notification>")))
        .expect("notification injected as a user_text event");

    // The notification must not appear until after the tool call that
    // triggered it has fully recorded its output — i.e. strictly on a
    // later iteration, not folded into the same step.
    assert!(notice_idx > output_idx);

    let notice_text = match &events[notice_idx].kind {
        EventKind::UserText { text } => text.clone(),
        _ => unreachable!(),
    };
    assert!(notice_text.contains("docs"));
    assert!(notice_text.contains("resource://docs/a.md"));

    // Buffer is drained by the time the loop terminates.
    let drained = buffer.poll(0).await;
    assert!(drained.is_empty());
}
