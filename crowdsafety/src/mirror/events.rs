//! Mirror of the remote `events` collection.

use std::sync::Arc;

use super::{
    decode_with_serde, encode_fields, CollectionMirror, Decoded, Document, DocumentStore, MirrorDocument,
    MirrorState, WriteHandle,
};
use crate::models::Event;
use crate::stream::StateStream;

impl MirrorDocument for Event {
    const COLLECTION: &'static str = "events";

    fn decode(doc: &Document) -> Decoded<Self> {
        decode_with_serde::<Event>(doc).map(|event| Event {
            id: doc.id.clone(),
            ..event
        })
    }

    fn sort(items: &mut [Self]) {
        items.sort_by_key(|event| event.start_time);
    }
}

/// Events shared between devices, ordered by start time.
#[derive(Clone)]
pub struct EventMirror {
    inner: CollectionMirror<Event>,
}

impl EventMirror {
    pub fn new(store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self {
            inner: CollectionMirror::new(store),
        }
    }

    pub fn state(&self) -> MirrorState {
        self.inner.state()
    }

    pub fn events(&self) -> &StateStream<Vec<Event>> {
        self.inner.items()
    }

    /// Publish a new event. Resolves to the id the store assigned.
    pub fn post_event(&self, event: &Event) -> WriteHandle<String> {
        match encode_fields(event) {
            Ok(fields) => self.inner.add(fields),
            Err(e) => WriteHandle::rejected("post_event", e),
        }
    }

    /// Overwrite an existing event.
    pub fn update_event(&self, event: &Event) -> WriteHandle<()> {
        match encode_fields(event) {
            Ok(fields) => self.inner.set(&event.id, fields, false),
            Err(e) => WriteHandle::rejected("update_event", e),
        }
    }

    pub fn delete_event(&self, event_id: &str) -> WriteHandle<()> {
        self.inner.delete(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{MemoryDocumentStore, MirrorError};

    fn event(name: &str, start_time: i64) -> Event {
        Event {
            name: name.to_string(),
            start_time,
            end_time: start_time + 3_600_000,
            location: "Sangam Ghat".to_string(),
            ..Event::default()
        }
    }

    #[tokio::test]
    async fn test_posted_events_arrive_sorted_by_start() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        let mirror = EventMirror::new(Some(store));
        assert_eq!(mirror.state(), MirrorState::Subscribed);

        let late = mirror.post_event(&event("Aarti", 2_000)).await.unwrap();
        let early = mirror.post_event(&event("Snan", 1_000)).await.unwrap();

        let events = mirror.events().wait_until(|list| list.len() == 2).await;
        assert_eq!(events[0].id, early);
        assert_eq!(events[1].id, late);
        assert_eq!(events[0].name, "Snan");
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        let mirror = EventMirror::new(Some(store));

        let id = mirror.post_event(&event("Aarti", 1_000)).await.unwrap();
        let mut renamed = event("Ganga Aarti", 1_000);
        renamed.id = id.clone();
        mirror.update_event(&renamed).await.unwrap();

        let events = mirror
            .events()
            .wait_until(|list| list.first().map(|e| e.name == "Ganga Aarti").unwrap_or(false))
            .await;
        assert_eq!(events.len(), 1);

        mirror.delete_event(&id).await.unwrap();
        mirror.events().wait_until(|list| list.is_empty()).await;
    }

    #[tokio::test]
    async fn test_update_without_id_is_rejected() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::default());
        let mirror = EventMirror::new(Some(store));
        let result = mirror.update_event(&event("No id", 0)).await;
        assert!(matches!(result, Err(MirrorError::MissingId)));
    }
}
