use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::{Document, DocumentStore, Fields, Filter, LiveQuery, Snapshot};
use crate::error::StoreError;

/// How many undelivered snapshots a live query may hold
const SNAPSHOT_BUFFER: usize = 16;

/// Capacity of the change notification channel shared by all live queries
const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// Document store backed by a SQLite `documents` table.
///
/// Each document is one row holding its fields as JSON text. Every write
/// broadcasts the collection name; live queries re-read their full result
/// set when their collection changes.
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<String>,
}

impl SqliteDocumentStore {
    pub fn open(path: &Path) -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> rusqlite::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> rusqlite::Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                collection      TEXT NOT NULL,
                id              TEXT NOT NULL,
                fields          TEXT NOT NULL,
                written_at      INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )",
            [],
        )?;

        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn write(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError> {
        let json = serde_json::to_string(&fields).map_err(|e| StoreError::Serialize {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

        let conn = Arc::clone(&self.conn);
        let (coll, doc_id) = (collection.to_string(), id.to_string());
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let conn = conn
                .lock()
                .map_err(|_| StoreError::Write("document database lock poisoned".to_string()))?;
            conn.execute(
                "INSERT OR REPLACE INTO documents (collection, id, fields, written_at)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![&coll, &doc_id, &json, Utc::now().timestamp_millis()],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Write(format!("Task join error: {}", e)))??;

        debug!("Wrote {}/{}", collection, id);

        // Ignore send errors (no live queries open)
        let _ = self.changes.send(collection.to_string());
        Ok(())
    }

    async fn live_query(&self, collection: &str, filter: Filter) -> Result<LiveQuery, StoreError> {
        let (tx, rx) = mpsc::channel(SNAPSHOT_BUFFER);

        // Subscribe before the first read so no write can slip between the two
        let mut changes = self.changes.subscribe();
        let conn = Arc::clone(&self.conn);
        let collection = collection.to_string();

        let worker = tokio::spawn(async move {
            loop {
                let snapshot = read_snapshot(&conn, &collection, &filter).await;
                if tx.send(snapshot).await.is_err() {
                    // Receiver gone: the query was released
                    return;
                }

                loop {
                    match changes.recv().await {
                        Ok(changed) if changed == collection => break,
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            // The next full read covers whatever was missed
                            debug!("Live query on {} lagged by {} changes", collection, missed);
                            break;
                        }
                        Err(broadcast::error::RecvError::Closed) => return,
                    }
                }
            }
        });

        Ok(LiveQuery::new(rx, Some(worker)))
    }
}

/// Read every document of a collection that passes the filter, in insertion order
async fn read_snapshot(
    conn: &Arc<Mutex<Connection>>,
    collection: &str,
    filter: &Filter,
) -> Result<Snapshot, StoreError> {
    let conn = Arc::clone(conn);
    let collection = collection.to_string();
    let filter = filter.clone();

    tokio::task::spawn_blocking(move || {
        let conn = conn
            .lock()
            .map_err(|_| StoreError::Query("document database lock poisoned".to_string()))?;

        let mut stmt = conn
            .prepare("SELECT id, fields FROM documents WHERE collection = ?1 ORDER BY rowid")
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows = stmt
            .query_map([&collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut snapshot = Vec::new();
        for row in rows {
            let (id, json) = row.map_err(|e| StoreError::Query(e.to_string()))?;
            let fields: Fields = match serde_json::from_str(&json) {
                Ok(fields) => fields,
                Err(e) => {
                    warn!("Skipping malformed document {}/{}: {}", collection, id, e);
                    continue;
                }
            };
            if filter.matches(&fields) {
                snapshot.push(Document { id, fields });
            }
        }

        Ok(snapshot)
    })
    .await
    .map_err(|e| StoreError::Query(format!("Task join error: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn fields(value: Value) -> Fields {
        value.as_object().cloned().unwrap()
    }

    fn ids(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_live_query_starts_with_current_result_set() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store.write("farms", "1", fields(json!({ "uid": "alice" }))).await.unwrap();
        store.write("farms", "2", fields(json!({ "uid": "bob" }))).await.unwrap();

        let mut query = store.live_query("farms", Filter::eq("uid", "alice")).await.unwrap();
        let snapshot = query.next().await.unwrap().unwrap();

        assert_eq!(ids(&snapshot), vec!["1"]);
    }

    #[tokio::test]
    async fn test_writes_push_full_snapshots() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let mut query = store.live_query("farms", Filter::eq("uid", "alice")).await.unwrap();
        assert!(query.next().await.unwrap().unwrap().is_empty());

        store.write("farms", "1", fields(json!({ "uid": "alice" }))).await.unwrap();
        assert_eq!(ids(&query.next().await.unwrap().unwrap()), vec!["1"]);

        store.write("farms", "2", fields(json!({ "uid": "alice" }))).await.unwrap();
        assert_eq!(ids(&query.next().await.unwrap().unwrap()), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_other_collections_do_not_wake_query() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let mut query = store.live_query("farms", Filter::eq("uid", "alice")).await.unwrap();
        query.next().await.unwrap().unwrap();

        store.write("barns", "1", fields(json!({ "uid": "alice" }))).await.unwrap();
        store.write("farms", "9", fields(json!({ "uid": "alice" }))).await.unwrap();

        // The barns write produced nothing; the next snapshot is the farms one
        assert_eq!(ids(&query.next().await.unwrap().unwrap()), vec!["9"]);
    }

    #[tokio::test]
    async fn test_write_overwrites_same_id() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .write("farms", "1", fields(json!({ "uid": "alice", "name": "old" })))
            .await
            .unwrap();
        store
            .write("farms", "1", fields(json!({ "uid": "alice", "name": "new" })))
            .await
            .unwrap();

        let mut query = store.live_query("farms", Filter::eq("uid", "alice")).await.unwrap();
        let snapshot = query.next().await.unwrap().unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].fields["name"], json!("new"));
    }

    #[tokio::test]
    async fn test_cancel_stops_snapshots() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        let mut query = store.live_query("farms", Filter::eq("uid", "alice")).await.unwrap();
        query.next().await.unwrap().unwrap();

        query.cancel();
        store.write("farms", "1", fields(json!({ "uid": "alice" }))).await.unwrap();

        assert!(query.next().await.is_none());
    }
}
