/// Backend collaborators
///
/// The application talks to three services through the traits below:
/// - `AuthGateway`: sessions (auth.rs holds the local implementation)
/// - `DocumentStore`: farm records and live queries (documents.rs)
/// - `BlobStore`: uploaded images and their durable URLs (blobs.rs)
///
/// `Backend` bundles one of each and is passed explicitly to every screen.

pub mod auth;
pub mod blobs;
pub mod documents;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fs;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AuthError, BackendError, BlobError, StoreError};

pub use auth::LocalAuthGateway;
pub use blobs::FsBlobStore;
pub use documents::SqliteDocumentStore;

/// An authenticated identity, valid until sign-out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub uid: String,
    pub email: String,
}

/// Document body: a flat JSON object
pub type Fields = Map<String, Value>;

/// A stored document together with its id
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

/// The complete result set of a live query at one point in time
pub type Snapshot = Vec<Document>;

/// Equality filter on a single top-level field
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, fields: &Fields) -> bool {
        fields.get(&self.field) == Some(&self.value)
    }
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;

    fn current_session(&self) -> Option<Session>;

    /// Receiver that observes every session change (sign-in, sign-up, sign-out)
    fn on_session_change(&self) -> watch::Receiver<Option<Session>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or overwrite a single document. Atomic per document.
    async fn write(&self, collection: &str, id: &str, fields: Fields) -> Result<(), StoreError>;

    /// Open a live query. The first snapshot is the current result set;
    /// a new full snapshot follows every change to the collection.
    async fn live_query(&self, collection: &str, filter: Filter) -> Result<LiveQuery, StoreError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), BlobError>;

    async fn get(&self, key: &str) -> Result<Vec<u8>, BlobError>;

    async fn durable_url(&self, key: &str) -> Result<String, BlobError>;

    /// Key behind a durable URL this store handed out, if it is one of ours
    fn key_for_url(&self, url: &str) -> Option<String>;

    /// Bytes behind a durable URL
    async fn get_by_url(&self, url: &str) -> Result<Vec<u8>, BlobError> {
        let key = self
            .key_for_url(url)
            .ok_or_else(|| BlobError::UnknownUrl(url.to_string()))?;
        self.get(&key).await
    }
}

/// Handle to a running live query.
///
/// Snapshots arrive in the order the store produced them. Cancelling (or
/// dropping) the handle stops the producer and no further snapshot is returned.
pub struct LiveQuery {
    snapshots: mpsc::Receiver<Result<Snapshot, StoreError>>,
    worker: Option<JoinHandle<()>>,
    cancelled: bool,
}

impl LiveQuery {
    pub fn new(
        snapshots: mpsc::Receiver<Result<Snapshot, StoreError>>,
        worker: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            snapshots,
            worker,
            cancelled: false,
        }
    }

    /// Wait for the next snapshot. `None` once cancelled or the producer ended.
    pub async fn next(&mut self) -> Option<Result<Snapshot, StoreError>> {
        if self.cancelled {
            return None;
        }
        self.snapshots.recv().await
    }

    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.snapshots.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Process-wide service context, created once at startup
#[derive(Clone)]
pub struct Backend {
    pub auth: Arc<dyn AuthGateway>,
    pub documents: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

impl Backend {
    /// Open the local backend under the configured data directory
    pub fn open_local(config: &AppConfig) -> Result<Self, BackendError> {
        fs::create_dir_all(&config.data_dir)?;

        let db_path = config.database_path();
        let auth = LocalAuthGateway::open(&db_path)?;
        let documents = SqliteDocumentStore::open(&db_path)?;
        let blobs = FsBlobStore::open(config.blobs_dir(), &config.public_base_url)?;

        info!("📁 Local backend ready at {}", config.data_dir.display());

        Ok(Self {
            auth: Arc::new(auth),
            documents: Arc::new(documents),
            blobs: Arc::new(blobs),
        })
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("session", &self.auth.current_session())
            .finish()
    }
}
