//! Mirror of the remote `lost_people` collection.

use std::sync::Arc;
use tracing::{info, warn};

use super::{
    decode_with_serde, encode_fields, CollectionMirror, Decoded, Document, DocumentStore, MirrorDocument,
    MirrorState, WriteHandle,
};
use crate::models::{LostPersonReport, ReportStatus};
use crate::stream::StateStream;

impl MirrorDocument for LostPersonReport {
    const COLLECTION: &'static str = "lost_people";

    fn decode(doc: &Document) -> Decoded<Self> {
        decode_with_serde::<LostPersonReport>(doc).map(|report| LostPersonReport {
            id: doc.id.clone(),
            ..report
        })
    }

    fn sort(items: &mut [Self]) {
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
}

/// Lost-person reports shared between devices, newest first.
#[derive(Clone)]
pub struct LostPersonMirror {
    inner: CollectionMirror<LostPersonReport>,
}

impl LostPersonMirror {
    /// Attach to the store and fetch the current reports once, ahead of the
    /// first change batch.
    pub fn new(store: Option<Arc<dyn DocumentStore>>) -> Self {
        let inner = CollectionMirror::new(store);
        if let Some(project_id) = inner.project_id() {
            info!(project_id = %project_id, "Lost-person mirror attached");
            // Outcome is logged by the write task
            drop(inner.fetch_once());
        }
        Self { inner }
    }

    pub fn state(&self) -> MirrorState {
        self.inner.state()
    }

    pub fn reports(&self) -> &StateStream<Vec<LostPersonReport>> {
        self.inner.items()
    }

    /// Unix millis of the last applied snapshot.
    pub fn last_updated(&self) -> &StateStream<i64> {
        self.inner.last_updated()
    }

    /// Post a new report.
    ///
    /// Any id on `report` is discarded. On success the stored report, carrying
    /// the id assigned by the store, is put at the head of the local list
    /// without waiting for the change feed.
    pub fn post_report(&self, report: &LostPersonReport) -> WriteHandle<LostPersonReport> {
        let draft = LostPersonReport {
            id: String::new(),
            ..report.clone()
        };
        let fields = match encode_fields(&draft) {
            Ok(fields) => fields,
            Err(e) => return WriteHandle::rejected("post_report", e),
        };

        let reports = self.inner.items().clone();
        self.inner.write("post_report", move |store| async move {
            let id = store.add(LostPersonReport::COLLECTION, fields).await?;
            let saved = LostPersonReport { id, ..draft };
            reports.update(|list| {
                let mut next = Vec::with_capacity(list.len() + 1);
                next.push(saved.clone());
                next.extend(list.iter().filter(|r| r.id != saved.id).cloned());
                next
            });
            info!(id = %saved.id, "Posted lost-person report");
            Ok(saved)
        })
    }

    /// Overwrite a stored report.
    pub fn update_report(&self, report: &LostPersonReport) -> WriteHandle<()> {
        match encode_fields(report) {
            Ok(fields) => self.inner.set(&report.id, fields, false),
            Err(e) => WriteHandle::rejected("update_report", e),
        }
    }

    pub fn delete_report(&self, report_id: &str) -> WriteHandle<()> {
        self.inner.delete(report_id)
    }

    /// Mark a report resolved. Unknown ids are logged and left alone.
    pub fn resolve_report(&self, report_id: &str) -> Option<WriteHandle<()>> {
        let report = self
            .reports()
            .with(|list| list.iter().find(|r| r.id == report_id).cloned());
        match report {
            Some(report) if report.status == ReportStatus::Resolved => None,
            Some(report) => Some(self.update_report(&LostPersonReport {
                status: ReportStatus::Resolved,
                ..report
            })),
            None => {
                warn!(id = report_id, "Cannot resolve unknown lost-person report");
                None
            }
        }
    }
}
