//! Remote mirrors.
//!
//! A mirror replicates one remote collection into a local [`StateStream`].
//! Every change batch is decoded document by document; documents that fail
//! to decode are logged and skipped, and the local list is replaced by the
//! decoded set.
//!
//! Writes run in a background task. The returned [`WriteHandle`] can be
//! awaited for the outcome or dropped.
//!
//! ```text
//!  remote collection ──change feed──▶ decode ──replace──▶ StateStream<Vec<T>>
//!         ▲                                                      │
//!         └──────────── WriteHandle (post/update/delete) ◀── caller
//! ```

pub mod events;
pub mod firestore;
pub mod lost;
pub mod presence;
pub mod store;

use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::models::now_millis;
use crate::stream::StateStream;
pub use events::EventMirror;
pub use firestore::{FirestoreConfig, FirestoreDocumentStore};
pub use lost::LostPersonMirror;
pub use presence::PresenceMirror;
pub use store::{ChangeFeed, Document, DocumentStore, Fields, MemoryDocumentStore, StoreError};

/// Error types for mirror writes.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// No remote store is configured
    #[error("Remote store not configured")]
    Unavailable,

    /// Update or delete without a document id
    #[error("Document id is blank")]
    MissingId,

    /// Value could not be turned into a document
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// The store refused or failed the operation
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Background write task did not complete
    #[error("Write task aborted: {0}")]
    Aborted(String),
}

/// Whether a mirror is attached to a remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorState {
    /// Listening to the remote collection
    Subscribed,
    /// No store could be constructed; reads stay empty, writes fail fast
    Unavailable,
}

/// Outcome of decoding one remote document.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    Ok(T),
    /// Decoded, but some fields were missing or garbled and fell back to
    /// defaults
    PartiallyDefaulted(T, Vec<String>),
    Failed(String),
}

impl<T> Decoded<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Decoded::Ok(value) | Decoded::PartiallyDefaulted(value, _) => Some(value),
            Decoded::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Decoded::Failed(_))
    }

    /// Transform the decoded value, keeping any warnings.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Decoded<U> {
        match self {
            Decoded::Ok(value) => Decoded::Ok(f(value)),
            Decoded::PartiallyDefaulted(value, warnings) => Decoded::PartiallyDefaulted(f(value), warnings),
            Decoded::Failed(reason) => Decoded::Failed(reason),
        }
    }

    pub fn warnings(&self) -> &[String] {
        match self {
            Decoded::PartiallyDefaulted(_, warnings) => warnings,
            _ => &[],
        }
    }
}

/// A record type kept in a remote collection.
pub trait MirrorDocument: Clone + Send + Sync + 'static {
    /// Remote collection name
    const COLLECTION: &'static str;

    fn decode(doc: &Document) -> Decoded<Self>;

    /// Order applied to every decoded snapshot.
    fn sort(_items: &mut [Self]) {}
}

/// Serialize a record into a document field map.
pub fn encode_fields<T: Serialize>(value: &T) -> Result<Fields, MirrorError> {
    match serde_json::to_value(value)? {
        Value::Object(fields) => Ok(fields),
        other => Err(MirrorError::Encode(serde::ser::Error::custom(format!(
            "expected an object, got {}",
            other
        )))),
    }
}

/// Deserialize a document's fields with serde, reporting failure as
/// [`Decoded::Failed`].
pub fn decode_with_serde<T: serde::de::DeserializeOwned>(doc: &Document) -> Decoded<T> {
    match serde_json::from_value(Value::Object(doc.fields.clone())) {
        Ok(value) => Decoded::Ok(value),
        Err(e) => Decoded::Failed(e.to_string()),
    }
}

/// Awaitable result of a background write.
///
/// Dropping the handle does not cancel the write.
#[must_use = "await the handle to observe the outcome, or drop it explicitly"]
pub struct WriteHandle<R> {
    inner: WriteInner<R>,
}

enum WriteInner<R> {
    Spawned(JoinHandle<Result<R, MirrorError>>),
    /// Failed before anything was sent to the store
    Rejected(Option<MirrorError>),
}

impl<R: Send + 'static> WriteHandle<R> {
    fn spawn<F>(operation: &'static str, write: F) -> Self
    where
        F: Future<Output = Result<R, MirrorError>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let result = write.await;
            match &result {
                Ok(_) => debug!(operation, "Remote write succeeded"),
                Err(e) => error!(operation, error = %e, "Remote write failed"),
            }
            result
        });
        Self {
            inner: WriteInner::Spawned(handle),
        }
    }

    pub(crate) fn rejected(operation: &'static str, error: MirrorError) -> Self {
        warn!(operation, error = %error, "Remote write rejected");
        Self {
            inner: WriteInner::Rejected(Some(error)),
        }
    }
}

impl<R> Future for WriteHandle<R> {
    type Output = Result<R, MirrorError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().inner {
            WriteInner::Spawned(handle) => Pin::new(handle).poll(cx).map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(MirrorError::Aborted(e.to_string())),
            }),
            WriteInner::Rejected(error) => Poll::Ready(Err(error
                .take()
                .unwrap_or_else(|| MirrorError::Aborted("polled after completion".to_string())))),
        }
    }
}

/// Local replica of one remote collection.
pub struct CollectionMirror<T> {
    store: Option<Arc<dyn DocumentStore>>,
    items: StateStream<Vec<T>>,
    last_updated: StateStream<i64>,
    _record: PhantomData<T>,
}

impl<T> Clone for CollectionMirror<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            items: self.items.clone(),
            last_updated: self.last_updated.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: MirrorDocument> CollectionMirror<T> {
    /// Attach to `store` and start following the collection.
    ///
    /// Without a store the mirror stays [`MirrorState::Unavailable`]. With a
    /// store this must be called inside a tokio runtime.
    pub fn new(store: Option<Arc<dyn DocumentStore>>) -> Self {
        let mirror = Self {
            store,
            items: StateStream::new(Vec::new()),
            last_updated: StateStream::new(0),
            _record: PhantomData,
        };

        match &mirror.store {
            Some(store) => {
                info!(
                    collection = T::COLLECTION,
                    project_id = store.project_id(),
                    "Attaching mirror"
                );
                mirror.spawn_listener(Arc::clone(store));
            }
            None => info!(
                collection = T::COLLECTION,
                "Remote store not available; mirror stays empty"
            ),
        }

        mirror
    }

    pub fn state(&self) -> MirrorState {
        if self.store.is_some() {
            MirrorState::Subscribed
        } else {
            MirrorState::Unavailable
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.store.as_deref().map(|store| store.project_id())
    }

    /// Decoded contents of the collection.
    pub fn items(&self) -> &StateStream<Vec<T>> {
        &self.items
    }

    /// Unix millis of the last applied snapshot, 0 before the first.
    pub fn last_updated(&self) -> &StateStream<i64> {
        &self.last_updated
    }

    /// Fetch the collection once and apply it, outside the change feed.
    pub fn fetch_once(&self) -> WriteHandle<usize> {
        let Some(store) = self.store.clone() else {
            return WriteHandle::rejected("fetch", MirrorError::Unavailable);
        };
        let mirror = self.clone();
        WriteHandle::spawn("fetch", async move {
            let docs = store.list(T::COLLECTION).await?;
            let applied = mirror.apply_snapshot(&docs);
            info!(collection = T::COLLECTION, count = applied, "Initial fetch complete");
            Ok(applied)
        })
    }

    /// Decode a snapshot and replace the local list with it.
    ///
    /// Returns the number of documents kept.
    pub fn apply_snapshot(&self, docs: &[Document]) -> usize {
        let mut decoded = Vec::with_capacity(docs.len());
        for doc in docs {
            match T::decode(doc) {
                Decoded::Ok(value) => decoded.push(value),
                Decoded::PartiallyDefaulted(value, warnings) => {
                    debug!(
                        collection = T::COLLECTION,
                        id = %doc.id,
                        ?warnings,
                        "Document decoded with defaults"
                    );
                    decoded.push(value);
                }
                Decoded::Failed(reason) => {
                    warn!(
                        collection = T::COLLECTION,
                        id = %doc.id,
                        reason = %reason,
                        "Skipping undecodable document"
                    );
                }
            }
        }
        T::sort(&mut decoded);

        let count = decoded.len();
        self.items.set(decoded);
        self.last_updated.set(now_millis());
        count
    }

    fn spawn_listener(&self, store: Arc<dyn DocumentStore>) {
        let mirror = self.clone();
        tokio::spawn(async move {
            let mut feed = match store.subscribe(T::COLLECTION).await {
                Ok(feed) => feed,
                Err(e) => {
                    error!(collection = T::COLLECTION, error = %e, "Failed to subscribe");
                    return;
                }
            };

            while let Some(batch) = feed.next().await {
                match batch {
                    Ok(docs) => {
                        let count = mirror.apply_snapshot(&docs);
                        debug!(collection = T::COLLECTION, count, "Snapshot applied");
                    }
                    Err(e) => warn!(collection = T::COLLECTION, error = %e, "Listener error"),
                }
            }
            debug!(collection = T::COLLECTION, "Change feed closed");
        });
    }

    /// Run a write against the store in the background.
    pub(crate) fn write<R, F, Fut>(&self, operation: &'static str, write: F) -> WriteHandle<R>
    where
        R: Send + 'static,
        F: FnOnce(Arc<dyn DocumentStore>) -> Fut,
        Fut: Future<Output = Result<R, MirrorError>> + Send + 'static,
    {
        match self.store.clone() {
            Some(store) => WriteHandle::spawn(operation, write(store)),
            None => WriteHandle::rejected(operation, MirrorError::Unavailable),
        }
    }

    /// Insert a new document; resolves to the store-assigned id.
    pub fn add(&self, fields: Fields) -> WriteHandle<String> {
        self.write("add", move |store| async move {
            Ok(store.add(T::COLLECTION, fields).await?)
        })
    }

    /// Write a whole document under `id`.
    pub fn set(&self, id: &str, fields: Fields, merge: bool) -> WriteHandle<()> {
        if id.trim().is_empty() {
            return WriteHandle::rejected("set", MirrorError::MissingId);
        }
        let id = id.to_string();
        self.write("set", move |store| async move {
            Ok(store.set(T::COLLECTION, &id, fields, merge).await?)
        })
    }

    /// Delete the document `id`.
    pub fn delete(&self, id: &str) -> WriteHandle<()> {
        if id.trim().is_empty() {
            return WriteHandle::rejected("delete", MirrorError::MissingId);
        }
        let id = id.to_string();
        self.write("delete", move |store| async move {
            Ok(store.delete(T::COLLECTION, &id).await?)
        })
    }
}
