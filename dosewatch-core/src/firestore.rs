//! Cloud Firestore REST backend for the reminder store
//!
//! Layout: `{users}/{uid}/{medicines}/{auto-id}`. Appends create a document
//! with a server-generated id; scans list every user document (including
//! "missing" ones that only exist as parents of sub-collections) and then
//! every reminder under each, following `nextPageToken`.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::{Deserialize, Serialize};

use crate::config::StoreConfig;
use crate::models::{Reminder, StoredReminder};
use crate::oauth::TokenSource;
use crate::store::{ReminderStore, StoreError};

const LIST_PAGE_SIZE: u32 = 300;

// ============================================================================
// Firestore value encoding
// ============================================================================

/// A typed Firestore field value as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FirestoreValue {
    NullValue(()),
    BooleanValue(bool),
    /// int64 travels as a decimal string
    IntegerValue(String),
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(serde_json::Value),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<FirestoreValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: BTreeMap<String, FirestoreValue>,
}

impl FirestoreValue {
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => FirestoreValue::NullValue(()),
            Value::Bool(b) => FirestoreValue::BooleanValue(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FirestoreValue::IntegerValue(i.to_string()),
                None => FirestoreValue::DoubleValue(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => FirestoreValue::StringValue(s.clone()),
            Value::Array(items) => FirestoreValue::ArrayValue(ArrayValue {
                values: items.iter().map(FirestoreValue::from_json).collect(),
            }),
            Value::Object(map) => FirestoreValue::MapValue(MapValue {
                fields: map
                    .iter()
                    .map(|(k, v)| (k.clone(), FirestoreValue::from_json(v)))
                    .collect(),
            }),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            FirestoreValue::NullValue(()) => Value::Null,
            FirestoreValue::BooleanValue(b) => Value::Bool(*b),
            FirestoreValue::IntegerValue(s) => s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(s.clone())),
            FirestoreValue::DoubleValue(d) => Value::from(*d),
            FirestoreValue::TimestampValue(s)
            | FirestoreValue::StringValue(s)
            | FirestoreValue::BytesValue(s)
            | FirestoreValue::ReferenceValue(s) => Value::String(s.clone()),
            FirestoreValue::GeoPointValue(v) => v.clone(),
            FirestoreValue::ArrayValue(a) => Value::Array(a.values.iter().map(Self::to_json).collect()),
            FirestoreValue::MapValue(m) => Value::Object(
                m.fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Encode a reminder as Firestore document fields.
pub fn encode_reminder(reminder: &Reminder) -> Result<BTreeMap<String, FirestoreValue>, StoreError> {
    match serde_json::to_value(reminder) {
        Ok(serde_json::Value::Object(map)) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), FirestoreValue::from_json(v)))
            .collect()),
        Ok(other) => Err(StoreError::Decode(format!("reminder encoded as non-object: {}", other))),
        Err(e) => Err(StoreError::Decode(e.to_string())),
    }
}

/// Decode Firestore document fields into a reminder.
pub fn decode_reminder(fields: &BTreeMap<String, FirestoreValue>) -> Result<Reminder, StoreError> {
    let object: serde_json::Map<String, serde_json::Value> = fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    serde_json::from_value(serde_json::Value::Object(object)).map_err(|e| StoreError::Decode(e.to_string()))
}

// ============================================================================
// REST API structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, FirestoreValue>,
}

impl Document {
    fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct WriteDocument<'a> {
    fields: &'a BTreeMap<String, FirestoreValue>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
    error: Option<GoogleErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    code: u16,
    message: String,
}

// ============================================================================
// FirestoreReminderStore
// ============================================================================

#[derive(Debug)]
pub struct FirestoreReminderStore {
    client: Client,
    documents_url: String,
    users_collection: String,
    reminders_collection: String,
    tokens: TokenSource,
}

impl FirestoreReminderStore {
    pub fn new(config: &StoreConfig, project_id: &str, tokens: TokenSource) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self::with_client(client, config, project_id, tokens))
    }

    pub fn with_client(
        client: Client,
        config: &StoreConfig,
        project_id: &str,
        tokens: TokenSource,
    ) -> Self {
        let documents_url = format!(
            "{}/projects/{}/databases/{}/documents",
            config.base_url.trim_end_matches('/'),
            project_id,
            config.database
        );
        Self {
            client,
            documents_url,
            users_collection: config.users_collection.clone(),
            reminders_collection: config.reminders_collection.clone(),
            tokens,
        }
    }

    /// URL of a collection below the documents root. Each segment is
    /// percent-encoded, so a uid containing `/`, `?` or `#` stays one segment.
    fn collection_url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.documents_url).map_err(|e| StoreError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| StoreError::InvalidUrl(self.documents_url.clone()))?
            .extend(segments);
        Ok(url)
    }

    fn users_url(&self) -> Result<Url, StoreError> {
        self.collection_url(&[self.users_collection.as_str()])
    }

    fn reminders_url(&self, owner: &str) -> Result<Url, StoreError> {
        self.collection_url(&[self.users_collection.as_str(), owner, self.reminders_collection.as_str()])
    }

    /// Pass successful responses through; turn the rest into `StoreError::Api`.
    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let (code, message) = serde_json::from_str::<GoogleErrorResponse>(&body)
            .ok()
            .and_then(|e| e.error)
            .map(|e| (e.code, e.message))
            .unwrap_or((status.as_u16(), body));

        tracing::error!(code = code, message = %message, "Firestore API error");
        Err(StoreError::Api { code, message })
    }

    async fn list_page(
        &self,
        url: Url,
        page_size: u32,
        page_token: Option<&str>,
        show_missing: bool,
    ) -> Result<ListDocumentsResponse, StoreError> {
        let mut query = vec![("pageSize", page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }
        if show_missing {
            query.push(("showMissing", "true".to_string()));
        }

        let bearer = self.tokens.bearer().await?;
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer)
            .query(&query)
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn list_all(&self, url: Url, show_missing: bool) -> Result<Vec<Document>, StoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self
                .list_page(url.clone(), LIST_PAGE_SIZE, page_token.as_deref(), show_missing)
                .await?;
            documents.extend(page.documents);
            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }
}

#[async_trait]
impl ReminderStore for FirestoreReminderStore {
    async fn append(&self, owner: &str, reminder: &Reminder) -> Result<String, StoreError> {
        let fields = encode_reminder(reminder)?;
        let url = self.reminders_url(owner)?;

        let bearer = self.tokens.bearer().await?;
        let response = self
            .client
            .post(url)
            .bearer_auth(bearer)
            .json(&WriteDocument { fields: &fields })
            .send()
            .await?;

        let created: Document = Self::check(response).await?.json().await?;
        Ok(created.id().to_string())
    }

    async fn scan_all(&self) -> Result<Vec<StoredReminder>, StoreError> {
        let users = self.list_all(self.users_url()?, true).await?;
        let mut reminders = Vec::new();

        for user in &users {
            let owner = user.id();
            for doc in self.list_all(self.reminders_url(owner)?, false).await? {
                match decode_reminder(&doc.fields) {
                    Ok(reminder) => reminders.push(StoredReminder {
                        owner: owner.to_string(),
                        id: doc.id().to_string(),
                        reminder,
                    }),
                    Err(e) => {
                        tracing::warn!(document = %doc.name, error = %e, "Skipping undecodable reminder");
                    }
                }
            }
        }

        tracing::debug!(users = users.len(), reminders = reminders.len(), "Scanned reminders");
        Ok(reminders)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.list_page(self.users_url()?, 1, None, false).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "firestore"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCS: &str = "/projects/dosewatch-test/databases/(default)/documents";

    fn test_store(mock_server: &MockServer) -> FirestoreReminderStore {
        let config = StoreConfig {
            base_url: format!("{}/", mock_server.uri()),
            ..StoreConfig::default()
        };
        FirestoreReminderStore::new(&config, "dosewatch-test", TokenSource::Static("owner".to_string()))
            .expect("Failed to create store")
    }

    fn aspirin() -> Reminder {
        Reminder {
            medicine: "Aspirin".to_string(),
            dosage: "100mg".to_string(),
            time_of_day: "14:30".to_string(),
            daily: true,
            next_time: Some(DateTime::parse_from_rfc3339("2026-10-18T14:30:00+05:00").unwrap()),
            timestamp_set: Some(DateTime::parse_from_rfc3339("2026-10-18T14:29:00+05:00").unwrap()),
            sent: false,
        }
    }

    fn aspirin_fields() -> serde_json::Value {
        json!({
            "medicine": { "stringValue": "Aspirin" },
            "dosage": { "stringValue": "100mg" },
            "time_of_day": { "stringValue": "14:30" },
            "daily": { "booleanValue": true },
            "next_time": { "stringValue": "2026-10-18T14:30:00+05:00" },
            "timestamp_set": { "stringValue": "2026-10-18T14:29:00+05:00" },
            "sent": { "booleanValue": false }
        })
    }

    fn user_doc(uid: &str) -> serde_json::Value {
        json!({ "name": format!("projects/dosewatch-test/databases/(default)/documents/users/{}", uid) })
    }

    fn reminder_doc(uid: &str, id: &str, fields: serde_json::Value) -> serde_json::Value {
        json!({
            "name": format!("projects/dosewatch-test/databases/(default)/documents/users/{}/medicines/{}", uid, id),
            "fields": fields,
            "createTime": "2026-10-18T09:29:00.000000Z",
            "updateTime": "2026-10-18T09:29:00.000000Z"
        })
    }

    #[test]
    fn test_value_codec_handles_every_json_shape() {
        let original = json!({
            "s": "text",
            "b": false,
            "i": 42,
            "d": 1.5,
            "n": null,
            "a": [1, "two"],
            "m": { "inner": true }
        });
        let encoded = FirestoreValue::from_json(&original);
        let wire = serde_json::to_value(&encoded).unwrap();

        assert_eq!(wire["mapValue"]["fields"]["i"], json!({ "integerValue": "42" }));
        assert_eq!(wire["mapValue"]["fields"]["n"], json!({ "nullValue": null }));
        assert_eq!(wire["mapValue"]["fields"]["d"], json!({ "doubleValue": 1.5 }));
        assert_eq!(encoded.to_json(), original);
    }

    #[test]
    fn test_timestamp_values_decode_to_strings() {
        let v: FirestoreValue =
            serde_json::from_value(json!({ "timestampValue": "2026-10-18T09:30:00Z" })).unwrap();
        assert_eq!(v.to_json(), json!("2026-10-18T09:30:00Z"));
    }

    #[test]
    fn test_encode_reminder_uses_typed_fields() {
        let fields = encode_reminder(&aspirin()).unwrap();
        assert_eq!(serde_json::to_value(&fields).unwrap(), aspirin_fields());
    }

    #[test]
    fn test_decode_reminder_requires_time_of_day() {
        let mut fields = encode_reminder(&aspirin()).unwrap();
        assert_eq!(decode_reminder(&fields).unwrap(), aspirin());

        fields.remove("time_of_day");
        assert!(matches!(decode_reminder(&fields), Err(StoreError::Decode(_))));
    }

    #[tokio::test]
    async fn test_append_posts_fields_under_owner() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}/users/uid-alice/medicines", DOCS)))
            .and(header("authorization", "Bearer owner"))
            .and(body_json(json!({ "fields": aspirin_fields() })))
            .respond_with(ResponseTemplate::new(200).set_body_json(reminder_doc(
                "uid-alice",
                "AbCdEf123",
                aspirin_fields(),
            )))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let id = store.append("uid-alice", &aspirin()).await.unwrap();
        assert_eq!(id, "AbCdEf123");
    }

    #[tokio::test]
    async fn test_append_surfaces_api_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED" }
            })))
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        match store.append("uid-alice", &aspirin()).await {
            Err(StoreError::Api { code, message }) => {
                assert_eq!(code, 403);
                assert_eq!(message, "Missing or insufficient permissions.");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scan_all_walks_users_and_pages() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(format!("{}/users", DOCS)))
            .and(query_param("showMissing", "true"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [user_doc("uid-alice")],
                "nextPageToken": "users-p2"
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/users", DOCS)))
            .and(query_param("pageToken", "users-p2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [user_doc("uid-bob")]
            })))
            .mount(&mock_server)
            .await;

        let mut ibuprofen = aspirin_fields();
        ibuprofen["medicine"] = json!({ "stringValue": "Ibuprofen" });
        Mock::given(method("GET"))
            .and(path(format!("{}/users/uid-alice/medicines", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [reminder_doc("uid-alice", "r1", aspirin_fields())]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/users/uid-bob/medicines", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [
                    reminder_doc("uid-bob", "r2", ibuprofen),
                    reminder_doc("uid-bob", "r3", json!({ "medicine": { "stringValue": "no time" } }))
                ]
            })))
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let scanned = store.scan_all().await.unwrap();

        let summary: Vec<(&str, &str, &str)> = scanned
            .iter()
            .map(|r| (r.owner.as_str(), r.id.as_str(), r.reminder.medicine.as_str()))
            .collect();
        assert_eq!(summary, vec![("uid-alice", "r1", "Aspirin"), ("uid-bob", "r2", "Ibuprofen")]);
    }

    #[tokio::test]
    async fn test_scan_all_empty_collection() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/users", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        assert!(store.scan_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scan_all_propagates_listing_failure() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        match store.scan_all().await {
            Err(StoreError::Api { code, message }) => {
                assert_eq!(code, 503);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping_lists_a_single_user() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/users", DOCS)))
            .and(query_param("pageSize", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        assert!(store.ping().await.is_ok());
        assert_eq!(store.name(), "firestore");
    }
    #[tokio::test]
    async fn test_scan_keeps_reminders_without_timestamps() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("{}/users", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [user_doc("uid-legacy")]
            })))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path(format!("{}/users/uid-legacy/medicines", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [reminder_doc("uid-legacy", "old1", json!({
                    "medicine": { "stringValue": "Aspirin" },
                    "dosage": { "stringValue": "100mg" },
                    "time_of_day": { "stringValue": "14:30" },
                    "daily": { "booleanValue": true },
                    "sent": { "booleanValue": false }
                }))]
            })))
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let scanned = store.scan_all().await.unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].reminder.next_time, None);

        let now = chrono_tz::Asia::Karachi.with_ymd_and_hms(2026, 10, 18, 14, 30, 0).unwrap();
        let due = crate::alarm::find_due(&scanned, &now).unwrap();
        assert_eq!(due.message(), "Aspirin (100mg)");
    }

    #[tokio::test]
    async fn test_append_encodes_owner_as_one_segment() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{}/users/team%2Falice%3Fx%23y/medicines", DOCS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(reminder_doc(
                "team",
                "Enc0ded",
                aspirin_fields(),
            )))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = test_store(&mock_server);
        let id = store.append("team/alice?x#y", &aspirin()).await.unwrap();
        assert_eq!(id, "Enc0ded");
    }
}
