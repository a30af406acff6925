//! End-to-end: a policy that always returns DENY_ABORT for a given tool.
//! Unlike DENY_CONTINUE, the reserved error ends the turn immediately
//! after it's persisted — the loop never reaches another reducer pass or
//! sampling call.

mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agentrt_core::agent::{Agent, AgentLoopConfig, AgentOutcome, ToolPolicy};
use agentrt_core::compositor::Compositor;
use agentrt_core::error::ReservedPolicyCode;
use agentrt_core::event::EventKind;
use agentrt_core::policy::{PolicyEngine, PolicyGateway};
use agentrt_core::tool::ToolProvider;
use tokio_util::sync::CancellationToken;

use common::{fixed_decision_script, text_response, tool_call_response, EchoTool, ScriptedProvider};

#[tokio::test]
async fn deny_abort_ends_the_turn_without_a_further_sample() {
    let compositor = Compositor::new(PathBuf::from("."));
    compositor
        .mount_inproc("echo", Arc::new(EchoTool), false)
        .unwrap();

    let engine = Arc::new(PolicyEngine::new(PathBuf::from("."), Duration::from_secs(5)));
    engine
        .set_policy(fixed_decision_script(
            r#"{"decision": "DENY_ABORT", "rationale": "not allowed at all"}"#,
        ))
        .await
        .unwrap();
    let gateway = Arc::new(PolicyGateway::new(
        compositor.clone() as Arc<dyn ToolProvider>,
        engine,
    ));

    // A second scripted response exists only to prove it's never consumed:
    // a bug that fell through to another sampling pass would return this
    // text instead of Aborted.
    let provider = ScriptedProvider::new(vec![
        tool_call_response("resp-1", "echo_echo", "call-1", serde_json::json!({"text": "hi"})),
        text_response("resp-2", "should never be reached"),
    ]);

    let mut agent = Agent::new(
        "agent-deny-abort",
        "test-model",
        provider,
        gateway.clone(),
        ToolPolicy::AllowAnyToolOrText,
        vec![],
        AgentLoopConfig::default(),
    );

    let cancel = CancellationToken::new();
    let outcome = agent.run(&cancel).await.unwrap();

    assert!(
        matches!(outcome, AgentOutcome::Aborted),
        "expected Aborted, got {outcome:?}"
    );

    let events = agent.transcript().events();

    let output = events
        .iter()
        .find_map(|e| match &e.kind {
            EventKind::FunctionCallOutput { call_id, result } if call_id == "call-1" => Some(result.clone()),
            _ => None,
        })
        .expect("denied call still produced a function_call_output");
    assert!(output.is_error);
    assert_eq!(
        output.reserved_code,
        Some(ReservedPolicyCode::PolicyDeniedAbort.code())
    );

    // The loop halted on step 4 itself: no assistant_text was ever
    // recorded, because that would require a second sampling pass.
    assert!(!events
        .iter()
        .any(|e| matches!(&e.kind, EventKind::AssistantText { .. })));

    assert!(gateway.pending_calls().is_empty());
}
