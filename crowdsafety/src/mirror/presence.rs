//! Mirror of the remote `presence` collection.
//!
//! Presence documents are written by several client generations, so fields
//! are decoded one at a time and anything missing or garbled falls back to a
//! default instead of dropping the visitor.

use serde_json::{json, Value};
use std::sync::Arc;

use super::{CollectionMirror, Decoded, Document, DocumentStore, Fields, MirrorDocument, MirrorState, WriteHandle};
use crate::models::{now_millis, whole_number, ActiveVisitor, UserRole};
use crate::stream::StateStream;

impl MirrorDocument for ActiveVisitor {
    const COLLECTION: &'static str = "presence";

    fn decode(doc: &Document) -> Decoded<Self> {
        decode_presence(doc)
    }
}

/// Display name used when a document carries none: the part of the id
/// before the first `:`.
pub fn default_display_name(id: &str) -> String {
    id.split(':').next().unwrap_or(id).to_string()
}

struct FieldReader<'a> {
    fields: &'a Fields,
    warnings: Vec<String>,
}

impl<'a> FieldReader<'a> {
    fn read<T>(&mut self, key: &str, parse: impl Fn(&Value) -> Option<T>, default: impl FnOnce() -> T) -> T {
        match self.fields.get(key) {
            Some(value) => match parse(value) {
                Some(parsed) => parsed,
                None => {
                    self.warnings.push(format!("{} has unexpected value {}", key, value));
                    default()
                }
            },
            None => {
                self.warnings.push(format!("{} missing", key));
                default()
            }
        }
    }
}

/// Decode a presence document field by field.
///
/// Only a document without any fields fails.
pub fn decode_presence(doc: &Document) -> Decoded<ActiveVisitor> {
    if doc.fields.is_empty() {
        return Decoded::Failed(format!("presence document {} has no fields", doc.id));
    }

    let mut reader = FieldReader {
        fields: &doc.fields,
        warnings: Vec::new(),
    };
    let role = reader.read(
        "role",
        |v| v.as_str().and_then(|s| s.parse::<UserRole>().ok()),
        || UserRole::Visitor,
    );
    let lat = reader.read("lat", Value::as_f64, || 0.0);
    let lng = reader.read("lng", Value::as_f64, || 0.0);
    let zone = reader.read("zone", |v| v.as_str().map(str::to_string), String::new);
    let check_in_time = reader.read("checkInTime", whole_number, now_millis);
    let is_online = reader.read("isOnline", Value::as_bool, || true);
    let needs_assist = reader.read("needsAssist", Value::as_bool, || false);
    let assisted = reader.read("assisted", Value::as_bool, || false);
    let display_name = reader.read(
        "displayName",
        |v| v.as_str().map(str::to_string),
        || default_display_name(&doc.id),
    );

    let visitor = ActiveVisitor {
        id: doc.id.clone(),
        role,
        lat,
        lng,
        zone,
        check_in_time,
        display_name,
        is_online,
        needs_assist,
        assisted,
    };

    if reader.warnings.is_empty() {
        Decoded::Ok(visitor)
    } else {
        Decoded::PartiallyDefaulted(visitor, reader.warnings)
    }
}

fn presence_fields(visitor: &ActiveVisitor) -> Fields {
    let display_name = if visitor.display_name.trim().is_empty() {
        default_display_name(&visitor.id)
    } else {
        visitor.display_name.clone()
    };
    let payload = json!({
        "role": visitor.role.name(),
        "lat": visitor.lat,
        "lng": visitor.lng,
        "zone": visitor.zone,
        "checkInTime": visitor.check_in_time,
        "isOnline": true,
        "needsAssist": visitor.needs_assist,
        "assisted": visitor.assisted,
        "displayName": display_name,
    });
    match payload {
        Value::Object(fields) => fields,
        _ => Fields::new(),
    }
}

/// Who is online right now.
#[derive(Clone)]
pub struct PresenceMirror {
    inner: CollectionMirror<ActiveVisitor>,
}

impl PresenceMirror {
    pub fn new(store: Option<Arc<dyn DocumentStore>>) -> Self {
        Self {
            inner: CollectionMirror::new(store),
        }
    }

    pub fn state(&self) -> MirrorState {
        self.inner.state()
    }

    pub fn online(&self) -> &StateStream<Vec<ActiveVisitor>> {
        self.inner.items()
    }

    /// Upsert the visitor's presence document, merged into any existing one.
    pub fn set_online(&self, visitor: &ActiveVisitor) -> WriteHandle<()> {
        self.inner.set(&visitor.id, presence_fields(visitor), true)
    }

    pub fn set_offline(&self, visitor_id: &str) -> WriteHandle<()> {
        self.inner.delete(visitor_id)
    }
}
