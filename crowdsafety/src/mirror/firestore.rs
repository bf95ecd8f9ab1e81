//! Document store backed by the Firestore REST API.
//!
//! Collections live under
//! `{base_url}/v1/projects/{project_id}/databases/{database}/documents`.
//! Field values travel in Firestore's typed encoding (`stringValue`,
//! `integerValue`, ...) and are converted to plain JSON at this boundary.
//! The change feed polls the collection and yields a snapshot whenever it
//! differs from the previous one.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, trace};

use super::store::{ChangeFeed, Document, DocumentStore, Fields, StoreError};
use crate::clients::http_client;

/// Documents requested per list page.
const PAGE_SIZE: u32 = 300;

/// Firestore connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirestoreConfig {
    /// API root; point at the emulator with e.g. `http://127.0.0.1:8080`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_project_id")]
    pub project_id: String,

    #[serde(default = "default_database")]
    pub database: String,

    /// Web API key, sent as the `key` query parameter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// OAuth access token, sent as a bearer token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Delay between change-feed polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_base_url() -> String {
    "https://firestore.googleapis.com".to_string()
}
fn default_project_id() -> String {
    "crowdsafety".to_string()
}
fn default_database() -> String {
    "(default)".to_string()
}
fn default_timeout() -> u64 { 10_000 }
fn default_poll_interval() -> u64 { 2_000 }

impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project_id: default_project_id(),
            database: default_database(),
            api_key: None,
            access_token: None,
            timeout_ms: default_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl FirestoreConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Convert a plain JSON value to Firestore's typed encoding.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(encode_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

/// Encode every field of a document.
pub fn encode_fields(fields: &Fields) -> Fields {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Convert a Firestore typed value to plain JSON.
///
/// Timestamps, references and bytes become strings. Unknown kinds decode
/// to `null`.
pub fn decode_value(value: &Value) -> Value {
    let Some((kind, inner)) = value.as_object().and_then(|map| map.iter().next()) else {
        return Value::Null;
    };
    match kind.as_str() {
        "booleanValue" => inner.as_bool().map(Value::Bool).unwrap_or(Value::Null),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .or_else(|| inner.as_i64())
            .map(Value::from)
            .unwrap_or(Value::Null),
        "doubleValue" => inner.as_f64().map(Value::from).unwrap_or(Value::Null),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => inner.clone(),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().map(decode_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .and_then(Value::as_object)
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

/// Decode every field of a Firestore document.
pub fn decode_fields(fields: &Fields) -> Fields {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), decode_value(value)))
        .collect()
}

/// Field path for an update mask. Keys that are not plain identifiers are
/// quoted with backticks.
fn field_path(key: &str) -> String {
    let plain = key
        .chars()
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false)
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        key.to_string()
    } else {
        format!("`{}`", key.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

#[derive(Debug, Deserialize)]
struct RemoteDocument {
    name: String,
    #[serde(default)]
    fields: Fields,
}

impl RemoteDocument {
    fn into_document(self) -> Document {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_string();
        Document::new(id, decode_fields(&self.fields))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RemoteDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

fn network_error(e: reqwest::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// Document store talking to Firestore (or its emulator) over HTTPS.
#[derive(Clone)]
pub struct FirestoreDocumentStore {
    config: FirestoreConfig,
    http: reqwest::Client,
}

impl FirestoreDocumentStore {
    pub fn new(config: FirestoreConfig) -> Self {
        let http = http_client(Duration::from_millis(config.timeout_ms));
        Self { config, http }
    }

    pub fn config(&self) -> &FirestoreConfig {
        &self.config
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/projects/{}/databases/{}/documents/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.database,
            urlencoding::encode(collection)
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(collection), urlencoding::encode(id))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }
        if let Some(key) = &self.config.api_key {
            request = request.query(&[("key", key)]);
        }
        request
    }

    /// Send a request and map failures: transport errors, 5xx and 429 make
    /// the store unavailable, any other non-success status is a rejection.
    async fn send(&self, request: RequestBuilder) -> Result<Response, StoreError> {
        let response = request.send().await.map_err(network_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = format!("HTTP {} - {}", status.as_u16(), body.trim());
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(StoreError::Unavailable(message))
        } else {
            Err(StoreError::Rejected(message))
        }
    }
}

#[async_trait]
impl DocumentStore for FirestoreDocumentStore {
    fn project_id(&self) -> &str {
        &self.config.project_id
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, StoreError> {
        let url = self.collection_url(collection);
        let body = json!({ "fields": encode_fields(&fields) });
        let response = self.send(self.request(Method::POST, &url).json(&body)).await?;

        let created: RemoteDocument = response.json().await.map_err(|e| StoreError::Rejected(e.to_string()))?;
        let id = created.into_document().id;
        if id.is_empty() {
            return Err(StoreError::Rejected("created document has no name".to_string()));
        }
        debug!(collection, id = %id, "Document added");
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, fields: Fields, merge: bool) -> Result<(), StoreError> {
        if id.is_empty() {
            return Err(StoreError::Rejected("document id must not be empty".to_string()));
        }
        // An empty mask would replace the whole document
        if merge && fields.is_empty() {
            return Ok(());
        }

        let url = self.document_url(collection, id);
        let mut request = self.request(Method::PATCH, &url);
        if merge {
            let mask: Vec<(&str, String)> = fields
                .keys()
                .map(|key| ("updateMask.fieldPaths", field_path(key)))
                .collect();
            request = request.query(&mask);
        }
        let body = json!({ "fields": encode_fields(&fields) });
        self.send(request.json(&body)).await?;

        debug!(collection, id, merge, "Document written");
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let url = self.document_url(collection, id);
        match self.send(self.request(Method::DELETE, &url)).await {
            Ok(_) => {}
            Err(StoreError::Rejected(message)) if message.starts_with("HTTP 404") => {}
            Err(e) => return Err(e),
        }
        debug!(collection, id, "Document deleted");
        Ok(())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let url = self.collection_url(collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .request(Method::GET, &url)
                .query(&[("pageSize", PAGE_SIZE.to_string())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let page: ListResponse = match self.send(request).await {
                Ok(response) => response.json().await.map_err(|e| StoreError::Rejected(e.to_string()))?,
                // Collections that were never written do not exist yet
                Err(StoreError::Rejected(message)) if message.starts_with("HTTP 404") => break,
                Err(e) => return Err(e),
            };
            documents.extend(page.documents.into_iter().map(RemoteDocument::into_document));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        trace!(collection, count = documents.len(), "Listed collection");
        Ok(documents)
    }

    async fn subscribe(&self, collection: &str) -> Result<ChangeFeed, StoreError> {
        let initial = self.list(collection).await?;

        let store = self.clone();
        let collection = collection.to_string();
        let period = self.config.poll_interval();
        let changes = stream::unfold(initial.clone(), move |last| {
            let store = store.clone();
            let collection = collection.clone();
            async move {
                loop {
                    tokio::time::sleep(period).await;
                    match store.list(&collection).await {
                        Ok(docs) if docs == last => continue,
                        Ok(docs) => return Some((Ok(docs.clone()), docs)),
                        Err(e) => return Some((Err(e), last)),
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
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const LOST: &str = "/v1/projects/kumbh/databases/(default)/documents/lost_people";

    fn store(server: &MockServer) -> FirestoreDocumentStore {
        FirestoreDocumentStore::new(FirestoreConfig {
            base_url: server.uri(),
            project_id: "kumbh".to_string(),
            poll_interval_ms: 20,
            ..FirestoreConfig::default()
        })
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn remote_doc(id: &str, name: &str) -> Value {
        json!({
            "name": format!("projects/kumbh/databases/(default)/documents/lost_people/{id}"),
            "fields": {
                "name": { "stringValue": name },
                "age": { "integerValue": "8" },
                "timestamp": { "integerValue": "1736900000000" },
            }
        })
    }

    #[test]
    fn test_values_are_typed_on_the_wire() {
        let encoded = encode_fields(&fields(json!({
            "zone": "Zone A",
            "lat": 25.43,
            "checkInTime": 1_736_900_000_000i64,
            "isOnline": true,
            "photo": null,
            "tags": ["elderly"],
        })));
        assert_eq!(encoded["zone"], json!({ "stringValue": "Zone A" }));
        assert_eq!(encoded["lat"], json!({ "doubleValue": 25.43 }));
        assert_eq!(encoded["checkInTime"], json!({ "integerValue": "1736900000000" }));
        assert_eq!(encoded["isOnline"], json!({ "booleanValue": true }));
        assert_eq!(encoded["photo"], json!({ "nullValue": null }));
        assert_eq!(
            encoded["tags"],
            json!({ "arrayValue": { "values": [{ "stringValue": "elderly" }] } })
        );
    }

    #[test]
    fn test_decode_remote_kinds() {
        let decoded = decode_fields(&fields(json!({
            "age": { "integerValue": "72" },
            "lat": { "doubleValue": 25.4 },
            "seen": { "timestampValue": "2025-01-15T04:00:00Z" },
            "meta": { "mapValue": { "fields": { "gate": { "stringValue": "G4" } } } },
            "empty": { "arrayValue": {} },
            "odd": { "somethingNew": 1 },
        })));
        assert_eq!(decoded["age"], 72);
        assert_eq!(decoded["lat"], 25.4);
        assert_eq!(decoded["seen"], "2025-01-15T04:00:00Z");
        assert_eq!(decoded["meta"], json!({ "gate": "G4" }));
        assert_eq!(decoded["empty"], json!([]));
        assert_eq!(decoded["odd"], Value::Null);
    }

    #[test]
    fn test_field_path_quoting() {
        assert_eq!(field_path("isOnline"), "isOnline");
        assert_eq!(field_path("_x1"), "_x1");
        assert_eq!(field_path("zone name"), "`zone name`");
        assert_eq!(field_path("1st"), "`1st`");
    }

    #[tokio::test]
    async fn test_add_posts_typed_fields_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(LOST))
            .and(header("authorization", "Bearer t0ken"))
            .and(body_partial_json(json!({ "fields": { "name": { "stringValue": "Asha" } } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(remote_doc("abc123", "Asha")))
            .expect(1)
            .mount(&server)
            .await;

        let store = FirestoreDocumentStore::new(FirestoreConfig {
            access_token: Some("t0ken".to_string()),
            ..store(&server).config().clone()
        });
        let id = store.add("lost_people", fields(json!({ "name": "Asha" }))).await.unwrap();
        assert_eq!(id, "abc123");
    }

    #[tokio::test]
    async fn test_merge_sends_update_mask() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/projects/kumbh/databases/(default)/documents/presence/v1"))
            .and(query_param("updateMask.fieldPaths", "zone"))
            .and(query_param("key", "web-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let store = FirestoreDocumentStore::new(FirestoreConfig {
            api_key: Some("web-key".to_string()),
            ..store(&server).config().clone()
        });
        store
            .set("presence", "v1", fields(json!({ "zone": "Zone B" })), true)
            .await
            .unwrap();
        assert!(matches!(
            store.set("presence", "", Fields::new(), false).await,
            Err(StoreError::Rejected(_))
        ));
    }

    #[tokio::test]
    async fn test_list_follows_page_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOST))
            .and(query_param("pageToken", "p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documents": [remote_doc("r2", "Gopal")] })))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LOST))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [remote_doc("r1", "Asha")],
                "nextPageToken": "p2",
            })))
            .mount(&server)
            .await;

        let docs = store(&server).list("lost_people").await.unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["r1", "r2"]);
        assert_eq!(docs[0].fields["age"], 8);
        assert_eq!(docs[1].fields["name"], "Gopal");
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("PERMISSION_DENIED"))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store(&server);
        assert!(matches!(store.list("events").await, Err(StoreError::Unavailable(_))));
        match store.add("events", Fields::new()).await {
            Err(StoreError::Rejected(message)) => assert!(message.contains("PERMISSION_DENIED")),
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(store.delete("events", "gone").await.is_ok());
    }

    #[tokio::test]
    async fn test_feed_yields_snapshot_then_changes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LOST))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "documents": [remote_doc("r1", "Asha")] })))
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(LOST))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [remote_doc("r1", "Asha"), remote_doc("r2", "Gopal")],
            })))
            .mount(&server)
            .await;

        let mut feed = store(&server).subscribe("lost_people").await.unwrap();
        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        // The unchanged poll is skipped
        let second = tokio::time::timeout(Duration::from_secs(5), feed.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(second.len(), 2);
    }
}
