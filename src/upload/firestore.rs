//! Firestore REST sink. Each batch becomes one `documents:commit` call with an
//! `update` write per document, which Firestore applies atomically.

use super::sink::{Document, DocumentSink, SinkError};
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const FIRESTORE_ENDPOINT: &str = "https://firestore.googleapis.com/v1";

/// Encode plain JSON as a Firestore typed value.
pub fn to_firestore_value(v: &Value) -> Value {
    match v {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else if let Some(u) = n.as_u64() {
                json!({ "integerValue": u.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or(0.0) })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            let values: Vec<Value> = items.iter().map(to_firestore_value).collect();
            json!({ "arrayValue": { "values": values } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": to_firestore_fields(map) } }),
    }
}

pub fn to_firestore_fields(map: &Map<String, Value>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), to_firestore_value(v))).collect()
}

pub struct FirestoreSink {
    client: Client,
    endpoint: String,
    project_id: String,
    database: String,
    token: String,
}

impl FirestoreSink {
    /// `token` is an OAuth2 access token with datastore scope
    /// (e.g. `gcloud auth print-access-token`).
    pub fn new(project_id: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("build Firestore HTTP client")?;
        Ok(Self {
            client,
            endpoint: FIRESTORE_ENDPOINT.to_string(),
            project_id: project_id.into(),
            database: "(default)".to_string(),
            token: token.into(),
        })
    }

    /// Point at another REST root, such as a local emulator.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    fn documents_root(&self) -> String {
        format!("projects/{}/databases/{}/documents", self.project_id, self.database)
    }

    /// URL every batch is POSTed to.
    pub fn commit_url(&self) -> String {
        format!("{}/{}:commit", self.endpoint, self.documents_root())
    }

    /// Request body for one batch.
    pub fn commit_body(&self, collection: &str, batch: &[Document]) -> Result<Value, SinkError> {
        let root = self.documents_root();
        let mut writes = Vec::with_capacity(batch.len());
        for doc in batch {
            let Value::Object(fields) = &doc.body else {
                return Err(SinkError::InvalidDocument {
                    key: doc.key.clone(),
                    reason: "document body must be a JSON object".into(),
                });
            };
            if doc.key.is_empty() || doc.key.contains('/') {
                return Err(SinkError::InvalidDocument {
                    key: doc.key.clone(),
                    reason: "document id must be non-empty and contain no '/'".into(),
                });
            }
            writes.push(json!({
                "update": {
                    "name": format!("{root}/{collection}/{}", doc.key),
                    "fields": to_firestore_fields(fields),
                }
            }));
        }
        Ok(json!({ "writes": writes }))
    }
}

impl DocumentSink for FirestoreSink {
    fn commit(&self, collection: &str, batch: &[Document]) -> Result<(), SinkError> {
        let body = self.commit_body(collection, batch)?;
        let resp = self.client.post(self.commit_url()).bearer_auth(&self.token).json(&body).send()?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(SinkError::Status { status: status.as_u16(), body });
        }
        Ok(())
    }
}
