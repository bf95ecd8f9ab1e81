//! Remote document store abstraction.
//!
//! A store holds flat collections of JSON documents keyed by id. Consumers
//! read whole documents, write whole documents (optionally merged), and can
//! follow a collection through a change feed that yields a full snapshot on
//! every change.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::{Map, Value};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, trace};

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// Snapshots buffered per change-feed subscriber.
const FEED_BUFFER: usize = 64;

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Fields,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Error types for store operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Write refused by the store
    #[error("Write rejected: {0}")]
    Rejected(String),
}

/// Live feed of full collection snapshots.
pub type ChangeFeed = BoxStream<'static, Result<Vec<Document>, StoreError>>;

/// Core trait for remote document stores.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Identifier of the backing project or database, for diagnostics.
    fn project_id(&self) -> &str;

    /// Insert a document under a store-generated id. Returns the id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError>;

    /// Write a document under `id`, replacing it or merging into it.
    async fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> Result<(), StoreError>;

    /// Delete a document. Deleting a missing document succeeds.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Fetch every document of a collection once.
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Follow a collection.
    ///
    /// The feed yields the current snapshot first, then a new snapshot after
    /// every change.
    async fn subscribe(&self, collection: &str) -> Result<ChangeFeed, StoreError>;
}

#[derive(Default)]
struct Collections {
    documents: HashMap<String, BTreeMap<String, Fields>>,
    feeds: HashMap<String, broadcast::Sender<Vec<Document>>>,
}

impl Collections {
    fn snapshot(&self, collection: &str) -> Vec<Document> {
        self.documents
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn publish(&self, collection: &str) {
        if let Some(feed) = self.feeds.get(collection) {
            let receivers = feed.send(self.snapshot(collection)).unwrap_or(0);
            trace!(collection, receivers, "Published snapshot");
        }
    }
}

/// In-process document store.
///
/// Backs tests and offline runs; nothing outlives the process. Availability
/// can be toggled to exercise failure paths.
pub struct MemoryDocumentStore {
    project_id: String,
    available: AtomicBool,
    collections: RwLock<Collections>,
}

impl MemoryDocumentStore {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            available: AtomicBool::new(true),
            collections: RwLock::new(Collections::default()),
        }
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.set_available(available);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of documents in a collection.
    pub async fn len(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.documents.get(collection).map(BTreeMap::len).unwrap_or(0)
    }

    /// Fetch one document.
    pub async fn get(&self, collection: &str, id: &str) -> Option<Fields> {
        let collections = self.collections.read().await;
        collections.documents.get(collection)?.get(id).cloned()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "project '{}' is offline",
                self.project_id
            )))
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new("local")
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        self.check_available()?;
        let id = uuid::Uuid::new_v4().simple().to_string();

        let mut collections = self.collections.write().await;
        collections
            .documents
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        collections.publish(collection);

        debug!(collection, id = %id, "Document added");
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> Result<(), StoreError> {
        self.check_available()?;
        if id.is_empty() {
            return Err(StoreError::Rejected("document id must not be empty".to_string()));
        }

        let mut collections = self.collections.write().await;
        let docs = collections.documents.entry(collection.to_string()).or_default();
        match docs.entry(id.to_string()) {
            Entry::Occupied(mut entry) if merge => entry.get_mut().extend(fields),
            Entry::Occupied(mut entry) => {
                entry.insert(fields);
            }
            Entry::Vacant(entry) => {
                entry.insert(fields);
            }
        }
        collections.publish(collection);

        debug!(collection, id, merge, "Document written");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.check_available()?;

        let mut collections = self.collections.write().await;
        let removed = collections
            .documents
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .is_some();
        if removed {
            collections.publish(collection);
        }

        debug!(collection, id, removed, "Document deleted");
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.check_available()?;
        Ok(self.collections.read().await.snapshot(collection))
    }

    async fn subscribe(&self, collection: &str) -> Result<ChangeFeed, StoreError> {
        self.check_available()?;

        // Snapshot and subscribe under one lock so no change falls in between
        let mut collections = self.collections.write().await;
        let receiver = collections
            .feeds
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(FEED_BUFFER).0)
            .subscribe();
        let initial = collections.snapshot(collection);
        drop(collections);

        let collection = collection.to_string();
        let changes = BroadcastStream::new(receiver).filter_map(move |item| {
            let collection = collection.clone();
            async move {
                match item {
                    Ok(snapshot) => Some(Ok(snapshot)),
                    Err(lagged) => {
                        // Every snapshot is complete, the next one catches up
                        debug!(collection = %collection, error = %lagged, "Change feed lagged");
                        None
                    }
                }
            }
        });

        Ok(stream::once(async move { Ok(initial) }).chain(changes).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[tokio::test]
    async fn test_add_generates_unique_ids() {
        let store = MemoryDocumentStore::default();
        let a = store.add("events", fields(json!({"name": "a"}))).await.unwrap();
        let b = store.add("events", fields(json!({"name": "b"}))).await.unwrap();
        assert!(!a.is_empty());
        assert_ne!(a, b);
        assert_eq!(store.len("events").await, 2);
    }

    #[tokio::test]
    async fn test_set_merge_and_replace() {
        let store = MemoryDocumentStore::default();
        store
            .set("presence", "v1", fields(json!({"zone": "A", "lat": 1.0})), false)
            .await
            .unwrap();
        store
            .set("presence", "v1", fields(json!({"zone": "B"})), true)
            .await
            .unwrap();
        let doc = store.get("presence", "v1").await.unwrap();
        assert_eq!(doc["zone"], "B");
        assert_eq!(doc["lat"], 1.0);

        store
            .set("presence", "v1", fields(json!({"zone": "C"})), false)
            .await
            .unwrap();
        let doc = store.get("presence", "v1").await.unwrap();
        assert!(doc.get("lat").is_none());
    }

    #[tokio::test]
    async fn test_feed_starts_with_snapshot_then_follows_changes() {
        let store = MemoryDocumentStore::default();
        store.set("events", "e1", fields(json!({"name": "a"})), false).await.unwrap();

        let mut feed = store.subscribe("events").await.unwrap();
        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store.delete("events", "e1").await.unwrap();
        let second = feed.next().await.unwrap().unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_store_rejects_everything() {
        let store = MemoryDocumentStore::new("offline").with_available(false);
        assert!(matches!(
            store.add("events", Fields::new()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.list("events").await.is_err());
        assert!(store.subscribe("events").await.is_err());
    }

    #[tokio::test]
    async fn test_set_rejects_blank_id() {
        let store = MemoryDocumentStore::default();
        let result = store.set("events", "", Fields::new(), false).await;
        assert!(matches!(result, Err(StoreError::Rejected(_))));
    }
}
