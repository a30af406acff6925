//! End-to-end: events appended by one `EventStore` handle survive a close
//! and a fresh `open` against the same file, and the restored transcript
//! resumes sequence numbering correctly and projects the same UI items.

use agentrt_core::event::{EventKind, Transcript};
use agentrt_core::persistence::projection::{fold, UiItem};
use agentrt_core::persistence::EventStore;

#[tokio::test]
async fn transcript_and_projection_survive_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("events.db");

    let mut transcript = Transcript::new();
    transcript.append(EventKind::UserText {
        text: "summarize the repo".to_string(),
    });
    transcript.append(EventKind::ToolCall {
        name: "fs_read".to_string(),
        args_json: serde_json::json!({"path": "README.md"}),
        call_id: "call-1".to_string(),
    });
    transcript.append(EventKind::FunctionCallOutput {
        call_id: "call-1".to_string(),
        result: agentrt_core::event::ToolCallResultRecord {
            content_text: "a readme".to_string(),
            structured_content: None,
            is_error: false,
            reserved_code: None,
        },
    });
    transcript.append(EventKind::AssistantText {
        text: "it's a readme".to_string(),
    });

    {
        let store = EventStore::open(&db_path).unwrap();
        for event in transcript.events() {
            store.append("agent-restart", event).await.unwrap();
        }
        store.close().await.unwrap();
    }

    // Simulate a process restart: a brand new `EventStore` over the same
    // file, with no in-memory state carried over.
    let restarted = EventStore::open(&db_path).unwrap();
    let loaded = restarted.load_events("agent-restart").unwrap();
    assert_eq!(loaded.len(), transcript.events().len());

    let resumed = Transcript::from_events(loaded.clone());
    assert_eq!(resumed.events(), transcript.events());

    // Appending after restore continues the sequence rather than
    // restarting it from zero.
    let mut resumed = resumed;
    let next = resumed.append(EventKind::UserText {
        text: "thanks".to_string(),
    });
    assert_eq!(next.sequence_num, transcript.events().len() as u64);

    let items = fold(&loaded);
    assert_eq!(
        items,
        vec![
            UiItem::UserMessage {
                text: "summarize the repo".to_string()
            },
            UiItem::Tool {
                name: "fs_read".to_string(),
                call_id: "call-1".to_string(),
                result: Some(agentrt_core::event::ToolCallResultRecord {
                    content_text: "a readme".to_string(),
                    structured_content: None,
                    is_error: false,
                    reserved_code: None,
                }),
            },
            UiItem::AssistantMarkdown {
                text: "it's a readme".to_string()
            },
        ]
    );

    restarted.close().await.unwrap();
}
