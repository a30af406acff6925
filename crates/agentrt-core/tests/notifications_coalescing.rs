//! End-to-end: several `MountNotification`s land on one session's
//! `NotificationsBuffer` (the same type the compositor emits on its
//! multicast channel), plus an installed-policy version bump, and are
//! coalesced into one flushable envelope.

use std::path::PathBuf;
use std::time::Duration;

use agentrt_core::compositor::MountNotification;
use agentrt_core::notifications::NotificationsBuffer;
use agentrt_core::policy::engine::PolicyProgram;
use agentrt_core::policy::PolicyEngine;

#[tokio::test]
async fn coalesces_mount_notifications_and_reports_policy_bump_once() {
    let buffer = NotificationsBuffer::new();

    buffer
        .record(MountNotification::ListChanged {
            prefix: "docs".to_string(),
        })
        .await;
    buffer
        .record(MountNotification::ResourceUpdated {
            prefix: "docs".to_string(),
            uri: "resource://docs/a.md".to_string(),
        })
        .await;
    buffer
        .record(MountNotification::ResourceUpdated {
            prefix: "docs".to_string(),
            uri: "resource://docs/a.md".to_string(),
        })
        .await;
    buffer
        .record(MountNotification::ResourceUpdated {
            prefix: "wiki".to_string(),
            uri: "resource://wiki/b.md".to_string(),
        })
        .await;

    let engine = PolicyEngine::new(PathBuf::from("."), Duration::from_secs(5));
    engine
        .set_policy(PolicyProgram {
            command: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "if [ -n \"$AGENTRT_POLICY_SELFTEST\" ]; then exit 0; fi; echo '{}'".to_string(),
            ],
            env: Default::default(),
        })
        .await
        .unwrap();

    let envelope = buffer.poll(engine.version()).await;
    assert!(envelope.policy.changed);

    let docs = envelope.resources.get("docs").unwrap();
    assert!(docs.list_changed);
    assert_eq!(docs.updated.len(), 1, "duplicate updates to the same uri coalesce");

    let wiki = envelope.resources.get("wiki").unwrap();
    assert!(!wiki.list_changed);
    assert_eq!(wiki.updated.len(), 1);

    let rendered = NotificationsBuffer::format(&envelope);
    assert!(rendered.starts_with("<system notification>"));
    assert!(rendered.contains("docs"));

    // Draining again, with no new notifications and no further policy
    // version bump, reports an empty envelope.
    let empty = buffer.poll(engine.version()).await;
    assert!(empty.resources.is_empty());
    assert!(!empty.policy.changed);
}
