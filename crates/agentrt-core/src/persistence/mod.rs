//! Append-only event persistence.
//!
//! Grounded on `storage::messages::MessageStore`/`storage::sessions::SessionManager`:
//! one `Database` handle, `rusqlite` with the `bundled` feature,
//! `anyhow::Result` return types, `chrono::Utc::now().to_rfc3339()`
//! timestamps. Generalized from "save one chat message" to "append one
//! typed event with a monotonic `sequence_num`".
//!
//! Writes are handed to a background task over an unbounded channel so
//! `append` never blocks the agent loop beyond a local channel send;
//! `EventStore::close` drains it and aggregates any write failures into a
//! `CloseError` (the Open Question's "raising form", see `crate::error`).

pub mod projection;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::error::CloseError;
use crate::event::{Event, EventKind};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    agent_id TEXT NOT NULL,
    sequence_num INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    event_type TEXT NOT NULL,
    payload_json TEXT NOT NULL,
    PRIMARY KEY (agent_id, sequence_num)
);
";

/// The wire shape from §6: `{agent_id, sequence_num, timestamp, event_type, payload}`.
#[derive(Debug, Clone)]
pub struct EventRecord {
    pub agent_id: String,
    pub sequence_num: u64,
    pub timestamp: String,
    pub event_type: String,
    pub payload_json: serde_json::Value,
}

fn event_to_record(agent_id: &str, event: &Event) -> Result<EventRecord> {
    let payload = serde_json::to_value(&event.kind).context("serialize event kind")?;
    let event_type = payload
        .get("event_type")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    Ok(EventRecord {
        agent_id: agent_id.to_string(),
        sequence_num: event.sequence_num,
        timestamp: chrono::Utc::now().to_rfc3339(),
        event_type,
        payload_json: payload,
    })
}

fn record_to_event(record: &EventRecord) -> Result<Event> {
    let kind: EventKind = serde_json::from_value(record.payload_json.clone())
        .context("deserialize persisted event payload")?;
    Ok(Event {
        sequence_num: record.sequence_num,
        kind,
    })
}

fn insert(conn: &Connection, record: &EventRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO events (agent_id, sequence_num, timestamp, event_type, payload_json)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record.agent_id,
            record.sequence_num as i64,
            record.timestamp,
            record.event_type,
            record.payload_json.to_string(),
        ],
    )
    .context("insert event record")?;
    Ok(())
}

/// One agent run's append-only log, backed by a single sqlite file shared
/// across agents (rows are namespaced by `agent_id`). Shareable via `Arc`:
/// `append`/`load_events` only need `&self`, and `close` uses interior
/// mutability so a `Runtime` can hand the same store to every handler that
/// needs to write and still drain it once at shutdown.
pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
    tx: AsyncMutex<Option<mpsc::UnboundedSender<EventRecord>>>,
    worker: AsyncMutex<Option<JoinHandle<Vec<anyhow::Error>>>>,
}

impl EventStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("create db directory")?;
        }
        let conn = Connection::open(path).context("open sqlite database")?;
        conn.execute_batch(SCHEMA).context("apply schema")?;
        let conn = Arc::new(Mutex::new(conn));

        let (tx, rx) = mpsc::unbounded_channel();
        let worker_conn = conn.clone();
        let worker = tokio::spawn(run_writer(worker_conn, rx));

        Ok(Self {
            conn,
            tx: AsyncMutex::new(Some(tx)),
            worker: AsyncMutex::new(Some(worker)),
        })
    }

    /// Queue one event for persistence. Never blocks on disk I/O; a failed
    /// send (the background task died) is silently dropped here and
    /// surfaces instead through `close()`.
    pub async fn append(&self, agent_id: &str, event: &Event) -> Result<()> {
        let record = event_to_record(agent_id, event)?;
        if let Some(tx) = self.tx.lock().await.as_ref() {
            let _ = tx.send(record);
        }
        Ok(())
    }

    /// Full ordered event log for one agent, used by replay.
    pub fn load_events(&self, agent_id: &str) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT agent_id, sequence_num, timestamp, event_type, payload_json
             FROM events WHERE agent_id = ?1 ORDER BY sequence_num",
        )?;
        let rows = stmt.query_map(params![agent_id], |row| {
            Ok(EventRecord {
                agent_id: row.get(0)?,
                sequence_num: row.get::<_, i64>(1)? as u64,
                timestamp: row.get(2)?,
                event_type: row.get(3)?,
                payload_json: serde_json::from_str(&row.get::<_, String>(4)?)
                    .unwrap_or(serde_json::Value::Null),
            })
        })?;

        let mut events = Vec::new();
        for row in rows {
            events.push(record_to_event(&row?)?);
        }
        Ok(events)
    }

    /// Drain all in-flight writes, aggregating any failures. Idempotent:
    /// calling `close` again after the worker has already stopped returns
    /// `Ok(())`.
    pub async fn close(&self) -> Result<(), CloseError> {
        self.tx.lock().await.take();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            match worker.await {
                Ok(errors) if errors.is_empty() => Ok(()),
                Ok(errors) => Err(CloseError(errors)),
                Err(join_error) => Err(CloseError(vec![anyhow::anyhow!(join_error)])),
            }
        } else {
            Ok(())
        }
    }
}

async fn run_writer(
    conn: Arc<Mutex<Connection>>,
    mut rx: mpsc::UnboundedReceiver<EventRecord>,
) -> Vec<anyhow::Error> {
    let mut errors = Vec::new();
    while let Some(record) = rx.recv().await {
        let conn = conn.clone();
        let result = tokio::task::spawn_blocking(move || insert(&conn.lock(), &record)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => errors.push(e),
            Err(join_error) => errors.push(anyhow::anyhow!(join_error)),
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Transcript;

    #[tokio::test]
    async fn append_and_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(&dir.path().join("events.db")).unwrap();

        let mut transcript = Transcript::new();
        transcript.append(EventKind::UserText {
            text: "hi".to_string(),
        });
        transcript.append(EventKind::AssistantText {
            text: "there".to_string(),
        });

        for event in transcript.events() {
            store.append("agent-1", event).await.unwrap();
        }
        store.close().await.unwrap();

        let store = EventStore::open(&dir.path().join("events.db")).unwrap();
        let loaded = store.load_events("agent-1").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].sequence_num, 0);
        assert!(matches!(loaded[0].kind, EventKind::UserText { .. }));
    }

    #[tokio::test]
    async fn events_are_namespaced_by_agent_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = EventStore::open(&dir.path().join("events.db")).unwrap();
        let mut t = Transcript::new();
        t.append(EventKind::UserText {
            text: "a".to_string(),
        });
        store.append("agent-a", &t.events()[0]).await.unwrap();
        store.append("agent-b", &t.events()[0]).await.unwrap();
        store.close().await.unwrap();

        let store = EventStore::open(&dir.path().join("events.db")).unwrap();
        assert_eq!(store.load_events("agent-a").unwrap().len(), 1);
        assert_eq!(store.load_events("agent-b").unwrap().len(), 1);
        assert!(store.load_events("agent-c").unwrap().is_empty());
    }
}
