//! services/journal/src/adapters/firestore.rs
//!
//! This module provides the concrete implementation of the `DocumentStore` port
//! against the Firestore REST API.
//!
//! Documents live at `DailyRecords/{userId}/records/{dateKey}`. All writes go
//! through `:commit` so that `createdAt`/`updatedAt` are set from the server's
//! request time instead of the local clock.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use for_me_core::{
    domain::{record_document_path, records_collection_path, DailyRecord, DateKey, RecordFields, Score, UserId},
    ports::{DocumentStore, PortError, PortResult},
};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

pub const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";
const PAGE_SIZE: usize = 300;

//=========================================================================================
// Wire types
//=========================================================================================

/// A Firestore `Value`. Exactly one key is present on the wire, which maps
/// onto serde's externally tagged enum representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum FieldValue {
    StringValue(String),
    /// int64 values are transported as decimal strings.
    IntegerValue(String),
    DoubleValue(f64),
    BooleanValue(bool),
    TimestampValue(String),
    NullValue(serde_json::Value),
    ArrayValue(ArrayValue),
    // Never written by this adapter; accepted so foreign fields don't fail a read.
    MapValue(serde_json::Value),
    ReferenceValue(String),
    BytesValue(String),
    GeoPointValue(serde_json::Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ArrayValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    values: Vec<FieldValue>,
}

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
    #[serde(default)]
    fields: HashMap<String, FieldValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
    next_page_token: Option<String>,
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// The concrete document store adapter for Firestore.
#[derive(Clone)]
pub struct FirestoreAdapter {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    bearer_token: String,
}

impl FirestoreAdapter {
    /// Creates a new `FirestoreAdapter` talking to the production endpoint.
    pub fn new(http: reqwest::Client, project_id: String, bearer_token: String) -> Self {
        Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            project_id,
            bearer_token,
        }
    }

    /// Points the adapter at another endpoint, e.g. the local emulator.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// `projects/{p}/databases/(default)/documents`, the prefix of every document name.
    fn database_root(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn document_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.database_root(), path)
    }

    fn commit_url(&self) -> String {
        format!("{}/{}:commit", self.base_url, self.database_root())
    }

    async fn commit(&self, write: serde_json::Value) -> PortResult<()> {
        let response = self
            .http
            .post(self.commit_url())
            .bearer_auth(&self.bearer_token)
            .json(&json!({ "writes": [write] }))
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await?;
        Ok(())
    }
}

fn transport_error(e: reqwest::Error) -> PortError {
    error!("Firestore request failed: {:?}", e);
    PortError::Unavailable(e.to_string())
}

/// Passes a successful response through and turns anything else into a `PortError`.
async fn ensure_success(response: Response) -> PortResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!("Firestore answered {}: {}", status, body);
    Err(match status {
        StatusCode::NOT_FOUND => PortError::NotFound(body),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => PortError::Unavailable(body),
        _ => PortError::Rejected(format!("status {}: {}", status.as_u16(), body)),
    })
}

//=========================================================================================
// Field encoding
//=========================================================================================

fn encode_fields(fields: &RecordFields) -> HashMap<String, FieldValue> {
    let mut encoded = HashMap::new();
    encoded.insert("date".to_string(), FieldValue::StringValue(fields.date.to_string()));
    encoded.insert(
        "score".to_string(),
        FieldValue::IntegerValue(fields.score.value().to_string()),
    );
    encoded.insert(
        "tasks".to_string(),
        FieldValue::ArrayValue(ArrayValue {
            values: fields.tasks.iter().cloned().map(FieldValue::StringValue).collect(),
        }),
    );
    if let Some(summary) = &fields.summary {
        encoded.insert("summary".to_string(), FieldValue::StringValue(summary.clone()));
    }
    encoded
}

/// The field paths a write touches. `summary` is omitted when there is none.
fn field_mask(fields: &RecordFields) -> Vec<&'static str> {
    let mut mask = vec!["date", "score", "tasks"];
    if fields.summary.is_some() {
        mask.push("summary");
    }
    mask
}

fn decode_document(document: Document) -> PortResult<DailyRecord> {
    let fields = &document.fields;
    // Older documents may lack `date`; the document id is the same key.
    let raw_date = match fields.get("date") {
        Some(FieldValue::StringValue(date)) => date.clone(),
        _ => document.name.rsplit('/').next().unwrap_or_default().to_string(),
    };
    let date: DateKey = raw_date
        .parse()
        .map_err(|e: for_me_core::domain::DateKeyError| PortError::Unexpected(e.to_string()))?;

    let score = match fields.get("score") {
        Some(FieldValue::IntegerValue(raw)) => raw
            .parse::<u8>()
            .ok()
            .and_then(Score::new)
            .ok_or_else(|| PortError::Unexpected(format!("invalid score '{}' for {}", raw, date)))?,
        _ => Score::UNSET,
    };

    let tasks = match fields.get("tasks") {
        Some(FieldValue::ArrayValue(array)) => array
            .values
            .iter()
            .filter_map(|value| match value {
                FieldValue::StringValue(task) => Some(task.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    let summary = match fields.get("summary") {
        Some(FieldValue::StringValue(summary)) => Some(summary.clone()),
        _ => None,
    };

    Ok(DailyRecord {
        date,
        score,
        tasks,
        summary,
        created_at: decode_timestamp(fields.get("createdAt")),
        updated_at: decode_timestamp(fields.get("updatedAt")),
    })
}

fn decode_timestamp(value: Option<&FieldValue>) -> Option<DateTime<Utc>> {
    match value {
        Some(FieldValue::TimestampValue(raw)) => DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|timestamp| timestamp.with_timezone(&Utc)),
        _ => None,
    }
}

fn server_time(field_path: &str) -> serde_json::Value {
    json!({ "fieldPath": field_path, "setToServerValue": "REQUEST_TIME" })
}

//=========================================================================================
// `DocumentStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl DocumentStore for FirestoreAdapter {
    async fn get_record(&self, user_id: &UserId, date: &DateKey) -> PortResult<Option<DailyRecord>> {
        let url = self.document_url(&record_document_path(user_id, date));
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let document: Document = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;
        decode_document(document).map(Some)
    }

    async fn create_record(&self, user_id: &UserId, fields: &RecordFields) -> PortResult<()> {
        debug!("Creating record {} for user {}", fields.date, user_id);
        let name = format!("{}/{}", self.database_root(), record_document_path(user_id, &fields.date));
        self.commit(json!({
            "update": { "name": name, "fields": encode_fields(fields) },
            "updateTransforms": [server_time("createdAt"), server_time("updatedAt")],
            "currentDocument": { "exists": false },
        }))
        .await
    }

    async fn update_record(&self, user_id: &UserId, fields: &RecordFields) -> PortResult<()> {
        debug!("Updating record {} for user {}", fields.date, user_id);
        let name = format!("{}/{}", self.database_root(), record_document_path(user_id, &fields.date));
        self.commit(json!({
            "update": { "name": name, "fields": encode_fields(fields) },
            "updateMask": { "fieldPaths": field_mask(fields) },
            "updateTransforms": [server_time("updatedAt")],
            "currentDocument": { "exists": true },
        }))
        .await
    }

    async fn list_records(&self, user_id: &UserId) -> PortResult<Vec<DailyRecord>> {
        let collection_url = self.document_url(&records_collection_path(user_id));
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let url = match &page_token {
                Some(token) => format!("{}?pageSize={}&pageToken={}", collection_url, PAGE_SIZE, token),
                None => format!("{}?pageSize={}", collection_url, PAGE_SIZE),
            };
            let response = self
                .http
                .get(url)
                .bearer_auth(&self.bearer_token)
                .send()
                .await
                .map_err(transport_error)?;
            let page: ListResponse = ensure_success(response)
                .await?
                .json()
                .await
                .map_err(|e| PortError::Unexpected(e.to_string()))?;
            for document in page.documents {
                records.push(decode_document(document)?);
            }
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(records)
    }

    async fn delete_record(&self, user_id: &UserId, date: &DateKey) -> PortResult<()> {
        let url = self.document_url(&record_document_path(user_id, date));
        let response = self
            .http
            .delete(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omits_summary_from_mask_when_absent() {
        let fields = RecordFields {
            date: DateKey::from_ymd(2025, 3, 16).unwrap(),
            score: Score::new(4).unwrap(),
            tasks: vec!["walk".into()],
            summary: None,
        };
        assert_eq!(field_mask(&fields), vec!["date", "score", "tasks"]);
        assert!(!encode_fields(&fields).contains_key("summary"));
    }

    #[test]
    fn decodes_wire_document() {
        let document: Document = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/DailyRecords/U/records/2025-03-16",
            "fields": {
                "score": { "integerValue": "4" },
                "tasks": { "arrayValue": { "values": [{ "stringValue": "walk" }, { "stringValue": "read" }] } },
                "summary": { "stringValue": "A calm day" },
                "createdAt": { "timestampValue": "2025-03-16T09:00:00Z" },
                "updatedAt": { "timestampValue": "2025-03-16T21:30:00.123456Z" }
            }
        }))
        .unwrap();

        let record = decode_document(document).unwrap();
        assert_eq!(record.date.to_string(), "2025-03-16");
        assert_eq!(record.score.value(), 4);
        assert_eq!(record.tasks, vec!["walk", "read"]);
        assert_eq!(record.summary.as_deref(), Some("A calm day"));
        assert!(record.created_at.unwrap() < record.updated_at.unwrap());
    }

    #[test]
    fn empty_array_decodes_to_no_tasks() {
        let document: Document = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/DailyRecords/U/records/2025-03-17",
            "fields": {
                "date": { "stringValue": "2025-03-17" },
                "score": { "integerValue": "0" },
                "tasks": { "arrayValue": {} }
            }
        }))
        .unwrap();

        let record = decode_document(document).unwrap();
        assert!(record.tasks.is_empty());
        assert!(!record.score.is_set());
        assert_eq!(record.summary, None);
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let document: Document = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/DailyRecords/U/records/2025-03-17",
            "fields": { "score": { "integerValue": "9" } }
        }))
        .unwrap();
        assert!(matches!(decode_document(document), Err(PortError::Unexpected(_))));
    }

    #[test]
    fn foreign_field_types_are_ignored() {
        let document: Document = serde_json::from_value(json!({
            "name": "projects/p/databases/(default)/documents/DailyRecords/U/records/2025-03-18",
            "fields": {
                "score": { "integerValue": "2" },
                "meta": { "mapValue": { "fields": { "device": { "stringValue": "ipad" } } } },
                "owner": { "referenceValue": "projects/p/databases/(default)/documents/Users/U" },
                "avatar": { "bytesValue": "aGVsbG8=" },
                "place": { "geoPointValue": { "latitude": 52.5, "longitude": 13.4 } },
                "tasks": { "arrayValue": { "values": [{ "stringValue": "swim" }, { "mapValue": {} }] } }
            }
        }))
        .unwrap();

        let record = decode_document(document).unwrap();
        assert_eq!(record.date.to_string(), "2025-03-18");
        assert_eq!(record.score.value(), 2);
        assert_eq!(record.tasks, vec!["swim"]);
    }
}
