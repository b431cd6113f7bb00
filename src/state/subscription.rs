/// Live, owner-scoped farm list
///
/// Wraps a live query on the farms collection filtered by the session uid.
/// Every snapshot replaces the whole list, which is then sorted by creation.
/// Releasing the subscription cancels the query; nothing reaches the list
/// afterwards.

use serde_json::Value;
use tracing::{debug, info, warn};

use super::data::{sort_by_creation, FarmRecord};
use crate::backend::{DocumentStore, Filter, LiveQuery, Session, Snapshot};
use crate::error::StoreError;

/// Owner value used when nobody is signed in. It is a number, and uids are
/// strings, so the query matches nothing.
pub const NO_SESSION_OWNER: i64 = 0;

/// Filter selecting the farms visible to `session`
pub fn owner_filter(session: Option<&Session>) -> Filter {
    match session {
        Some(session) => Filter::eq("uid", session.uid.clone()),
        None => Filter::eq("uid", Value::from(NO_SESSION_OWNER)),
    }
}

pub struct FarmListSubscription {
    owner: Filter,
    query: LiveQuery,
    farms: Vec<FarmRecord>,
    last_error: Option<StoreError>,
    released: bool,
}

impl FarmListSubscription {
    /// Open the live query for `session` (or an always-empty one without a session)
    pub async fn activate(
        documents: &dyn DocumentStore,
        collection: &str,
        session: Option<&Session>,
    ) -> Result<Self, StoreError> {
        let owner = owner_filter(session);
        let query = documents.live_query(collection, owner.clone()).await?;

        info!(
            "Farm list subscription opened for {}",
            session.map(|s| s.email.as_str()).unwrap_or("<no session>")
        );
        Ok(Self::from_query(owner, query))
    }

    pub fn from_query(owner: Filter, query: LiveQuery) -> Self {
        Self {
            owner,
            query,
            farms: Vec::new(),
            last_error: None,
            released: false,
        }
    }

    /// Wait for the next snapshot and apply it.
    ///
    /// Returns `false` once the subscription is released or the query ended.
    /// A query error keeps the current list and is exposed via `last_error`.
    pub async fn changed(&mut self) -> bool {
        if self.released {
            return false;
        }

        match self.query.next().await {
            Some(Ok(snapshot)) => self.apply_snapshot(snapshot),
            Some(Err(e)) => {
                warn!("Farm list query error, keeping last list: {}", e);
                self.last_error = Some(e);
                true
            }
            None => false,
        }
    }

    /// Replace the whole list with the snapshot. Ignored after release.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot) -> bool {
        if self.released {
            debug!("Dropping snapshot received after release");
            return false;
        }

        let mut farms = Vec::with_capacity(snapshot.len());
        for document in snapshot {
            // Only records owned by this session are ever listed
            if !self.owner.matches(&document.fields) {
                continue;
            }
            let id = document.id.clone();
            match FarmRecord::from_document(document) {
                Ok(farm) => farms.push(farm),
                Err(e) => warn!("Skipping unreadable farm {}: {}", id, e),
            }
        }
        sort_by_creation(&mut farms);

        debug!("Farm list now has {} entries", farms.len());
        self.farms = farms;
        self.last_error = None;
        true
    }

    pub fn farms(&self) -> &[FarmRecord] {
        &self.farms
    }

    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    /// Stop the live query. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.query.cancel();
        info!("Farm list subscription released");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for FarmListSubscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Document, SqliteDocumentStore};
    use crate::state::forms::FarmForm;
    use crate::state::submit::FarmRecordSubmitter;
    use crate::state::upload::tests::BrokenBlobStore;
    use crate::state::upload::ImageUploadPipeline;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn session(uid: &str) -> Session {
        Session {
            uid: uid.to_string(),
            email: format!("{}@test.com", uid),
        }
    }

    fn doc(id: &str, uid: &str) -> Document {
        Document {
            id: id.to_string(),
            fields: json!({ "uid": uid, "display_name": id, "name": id, "image": "" })
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn ids(subscription: &FarmListSubscription) -> Vec<&str> {
        subscription.farms().iter().map(|f| f.id.as_str()).collect()
    }

    fn manual(owner: &str) -> (mpsc::Sender<Result<Snapshot, StoreError>>, FarmListSubscription) {
        let (tx, rx) = mpsc::channel(8);
        let subscription = FarmListSubscription::from_query(
            owner_filter(Some(&session(owner))),
            LiveQuery::new(rx, None),
        );
        (tx, subscription)
    }

    #[tokio::test]
    async fn test_snapshot_replaces_whole_list_sorted() {
        let (tx, mut subscription) = manual("alice");

        tx.send(Ok(vec![doc("30", "alice"), doc("10", "alice")])).await.unwrap();
        assert!(subscription.changed().await);
        assert_eq!(ids(&subscription), vec!["10", "30"]);

        tx.send(Ok(vec![doc("20", "alice")])).await.unwrap();
        assert!(subscription.changed().await);
        assert_eq!(ids(&subscription), vec!["20"]);
    }

    #[tokio::test]
    async fn test_foreign_records_never_listed() {
        let (tx, mut subscription) = manual("alice");

        tx.send(Ok(vec![doc("1", "alice"), doc("2", "bob")])).await.unwrap();
        subscription.changed().await;

        assert_eq!(ids(&subscription), vec!["1"]);
    }

    #[tokio::test]
    async fn test_error_keeps_last_list() {
        let (tx, mut subscription) = manual("alice");

        tx.send(Ok(vec![doc("1", "alice")])).await.unwrap();
        subscription.changed().await;
        tx.send(Err(StoreError::Query("connection reset".to_string()))).await.unwrap();

        assert!(subscription.changed().await);
        assert_eq!(ids(&subscription), vec!["1"]);
        assert!(subscription.last_error().is_some());
    }

    #[tokio::test]
    async fn test_nothing_applies_after_release() {
        let (tx, mut subscription) = manual("alice");
        tx.send(Ok(vec![doc("1", "alice")])).await.unwrap();
        subscription.changed().await;

        subscription.release();

        assert!(!subscription.apply_snapshot(vec![doc("2", "alice")]));
        assert!(!subscription.changed().await);
        assert_eq!(ids(&subscription), vec!["1"]);
        assert!(tx.send(Ok(vec![doc("3", "alice")])).await.is_err());
        assert!(subscription.is_released());
    }

    #[tokio::test]
    async fn test_no_session_sees_nothing() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .write("farms", "1", doc("1", "0").fields)
            .await
            .unwrap();

        let mut subscription = FarmListSubscription::activate(&store, "farms", None)
            .await
            .unwrap();

        assert!(subscription.changed().await);
        assert!(subscription.farms().is_empty());
    }

    #[tokio::test]
    async fn test_submitted_farms_reach_owner_only() {
        let store = Arc::new(SqliteDocumentStore::open_in_memory().unwrap());
        let submitter = FarmRecordSubmitter::with_parts(
            store.clone(),
            ImageUploadPipeline::new(Arc::new(BrokenBlobStore), "farms/"),
            "farms",
        );
        let (alice, bob) = (session("alice"), session("bob"));

        let mut alice_list = FarmListSubscription::activate(store.as_ref(), "farms", Some(&alice))
            .await
            .unwrap();
        let mut bob_list = FarmListSubscription::activate(store.as_ref(), "farms", Some(&bob))
            .await
            .unwrap();
        alice_list.changed().await;
        bob_list.changed().await;

        let form = FarmForm {
            display_name: "Green Acres".to_string(),
            name: "acres1".to_string(),
            ..Default::default()
        };
        let created = submitter.submit(Some(&alice), &form, None).await.unwrap();

        assert!(alice_list.changed().await);
        assert_eq!(alice_list.farms(), &[created]);

        assert!(bob_list.changed().await);
        assert!(bob_list.farms().is_empty());
    }
}
