use std::time::Duration;

use anyhow::Result;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde_json::{json, Map, Value};

use super::http::{ndjson, HttpTransport};
use super::{parse_hits, BatchReport, DocumentFailure, EngineError, SearchBackend};
use crate::models::{CollectionSchema, Document, EngineKind, Hit, QueryExpr};

/// Elasticsearch backend speaking the REST API directly.
pub struct ElasticBackend {
    http: HttpTransport,
}

impl ElasticBackend {
    /// Create a backend targeting the given base URL
    /// (e.g. "http://localhost:9200").
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(base_url, EngineKind::Elasticsearch.display_name(), timeout)?,
        })
    }

    fn exists(&self, collection: &str) -> Result<bool, EngineError> {
        let url = self.http.url_for(collection);
        let response = self.http.execute(&url, self.http.client().head(&url))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            _ => self.http.check_status(&url, response).map(|_| true),
        }
    }
}

/// Body for `PUT /{index}`.
fn mappings_for(schema: &CollectionSchema) -> Value {
    match schema {
        CollectionSchema::Dynamic { .. } => json!({"mappings": {"dynamic": true}}),
        CollectionSchema::Declared { fields } => {
            let mut properties = Map::new();
            for field in fields {
                properties.insert(field.name.clone(), json!({"type": field.kind}));
            }
            json!({"mappings": {"dynamic": true, "properties": properties}})
        }
    }
}

/// Action/source line pairs for `POST /_bulk`.
fn bulk_lines(collection: &str, docs: &[Document]) -> Vec<Value> {
    let mut lines = Vec::with_capacity(docs.len() * 2);
    for doc in docs {
        lines.push(json!({"index": {"_index": collection, "_id": doc.id.to_string()}}));
        lines.push(Value::Object(doc.fields.clone()));
    }
    lines
}

/// Collect per-item failures from a bulk response.
fn bulk_failures(body: &Value) -> Vec<DocumentFailure> {
    if !body.get("errors").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Vec::new();
    }

    let Some(items) = body.get("items").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| item.get("index"))
        .filter_map(|result| {
            let error = result.get("error")?;
            let id = result
                .get("_id")
                .map(super::id_to_string)
                .and_then(|id| id.parse::<u64>().ok())
                .unwrap_or_default();
            let reason = super::http::error_reason(&json!({ "error": error }))
                .unwrap_or_else(|| error.to_string());
            Some(DocumentFailure { id, reason })
        })
        .collect()
}

impl SearchBackend for ElasticBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Elasticsearch
    }

    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    fn ping(&self) -> Result<(), EngineError> {
        let url = self.http.url_for("/");
        self.http.send(&url, self.http.client().get(&url))?;
        Ok(())
    }

    fn recreate_collection(
        &self,
        collection: &str,
        schema: &CollectionSchema,
    ) -> Result<(), EngineError> {
        let url = self.http.url_for(collection);

        if self.exists(collection)? {
            self.http.send(&url, self.http.client().delete(&url))?;
            tracing::info!(index = collection, "deleted existing index");
        }

        self.http
            .send(&url, self.http.client().put(&url).json(&mappings_for(schema)))?;
        tracing::info!(index = collection, "created index");
        Ok(())
    }

    fn index_batch(&self, collection: &str, docs: &[Document]) -> Result<BatchReport, EngineError> {
        if docs.is_empty() {
            return Ok(BatchReport::default());
        }

        let url = self.http.url_for("/_bulk");
        let body = ndjson(bulk_lines(collection, docs).iter())?;
        let request = self
            .http
            .client()
            .post(&url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        let response: Value = self.http.send_json(&url, request)?;
        Ok(BatchReport::from_failures(
            docs.len(),
            bulk_failures(&response),
        ))
    }

    fn refresh(&self, collection: &str) -> Result<(), EngineError> {
        let url = self.http.url_for(&format!("{collection}/_refresh"));
        self.http.send(&url, self.http.client().post(&url))?;
        Ok(())
    }

    fn count(&self, collection: &str) -> Result<u64, EngineError> {
        let url = self.http.url_for(&format!("{collection}/_count"));
        let body: Value = self.http.send_json(&url, self.http.client().get(&url))?;
        body.get("count")
            .and_then(|c| c.as_u64())
            .ok_or_else(|| EngineError::Decode {
                url,
                message: "response has no numeric `count`".to_string(),
            })
    }

    fn search(
        &self,
        collection: &str,
        query: &QueryExpr,
        limit: usize,
    ) -> Result<Vec<Hit>, EngineError> {
        let url = self.http.url_for(&format!("{collection}/_search"));
        let request_body = json!({
            "query": query.to_dsl(),
            "size": limit,
        });
        tracing::debug!(body = %request_body, "elasticsearch search request");

        let body: Value = self
            .http
            .send_json(&url, self.http.client().post(&url).json(&request_body))?;
        parse_hits(&url, &body)
    }
}
