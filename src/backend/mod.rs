//! Search engine backends.
//!
//! The `SearchBackend` trait gives the loader, the CLI, and the web
//! server one interface over the engines' HTTP APIs. Elasticsearch
//! and Manticore ship as concrete implementations; everything about
//! storage, tokenization, and scoring stays inside the engine.

mod elastic;
mod error;
mod http;
mod manticore;

#[cfg(test)]
pub(crate) mod fake;

pub use elastic::ElasticBackend;
pub use error::EngineError;
pub use manticore::ManticoreBackend;

use std::time::Duration;

use anyhow::Result;

use crate::models::{CollectionSchema, Document, EngineKind, Hit, QueryExpr};

/// Connection settings for one engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub kind: EngineKind,
    /// Base URL of the engine's HTTP API.
    pub url: String,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl EngineConfig {
    pub fn new(kind: EngineKind, url: Option<String>) -> Self {
        Self {
            kind,
            url: url.unwrap_or_else(|| kind.default_url().to_string()),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// A document the engine refused while accepting the rest of its
/// batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFailure {
    pub id: u64,
    pub reason: String,
}

/// Per-batch outcome of a bulk submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub indexed: u64,
    pub failures: Vec<DocumentFailure>,
}

impl BatchReport {
    /// Build a report from the failures of a batch of `submitted`
    /// documents.
    pub fn from_failures(submitted: usize, failures: Vec<DocumentFailure>) -> Self {
        Self {
            indexed: submitted.saturating_sub(failures.len()) as u64,
            failures,
        }
    }
}

/// Pluggable search engine used by the loader and search paths.
pub trait SearchBackend: Send + Sync {
    /// Kind of engine behind this backend.
    fn kind(&self) -> EngineKind;

    /// Base URL the backend talks to.
    fn base_url(&self) -> &str;

    /// Check that the engine is reachable.
    fn ping(&self) -> Result<(), EngineError>;

    /// Drop the collection if it exists and create it again.
    fn recreate_collection(
        &self,
        collection: &str,
        schema: &CollectionSchema,
    ) -> Result<(), EngineError>;

    /// Submit one batch of documents.
    ///
    /// An `Err` means the batch as a whole was not accepted; documents
    /// rejected individually are listed in the returned report.
    fn index_batch(&self, collection: &str, docs: &[Document]) -> Result<BatchReport, EngineError>;

    /// Make recently indexed documents visible to searches and counts.
    fn refresh(&self, _collection: &str) -> Result<(), EngineError> {
        Ok(())
    }

    /// Number of documents stored in the collection.
    fn count(&self, collection: &str) -> Result<u64, EngineError>;

    /// Execute a query, returning at most `limit` hits.
    fn search(
        &self,
        collection: &str,
        query: &QueryExpr,
        limit: usize,
    ) -> Result<Vec<Hit>, EngineError>;
}

/// Helper to construct the appropriate backend from a generic config.
pub fn open_backend(config: &EngineConfig) -> Result<Box<dyn SearchBackend>> {
    match config.kind {
        EngineKind::Elasticsearch => Ok(Box::new(ElasticBackend::new(
            &config.url,
            config.timeout,
        )?)),
        EngineKind::Manticore => Ok(Box::new(ManticoreBackend::new(
            &config.url,
            config.timeout,
        )?)),
    }
}

/// Render an engine-assigned `_id`, which may be a JSON string or
/// number, as text.
pub(crate) fn id_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Decode the `hits.hits` array shared by both engines' search
/// responses.
pub(crate) fn parse_hits(url: &str, body: &serde_json::Value) -> Result<Vec<Hit>, EngineError> {
    let Some(hits) = body.get("hits").and_then(|h| h.get("hits")) else {
        return Err(EngineError::Decode {
            url: url.to_string(),
            message: "response has no `hits.hits` array".to_string(),
        });
    };

    let Some(hits) = hits.as_array() else {
        return Err(EngineError::Decode {
            url: url.to_string(),
            message: "`hits.hits` is not an array".to_string(),
        });
    };

    Ok(hits
        .iter()
        .map(|hit| Hit {
            id: hit.get("_id").map(id_to_string).unwrap_or_default(),
            score: hit.get("_score").and_then(|s| s.as_f64()),
            source: hit
                .get("_source")
                .and_then(|s| s.as_object())
                .cloned()
                .unwrap_or_default(),
        })
        .collect())
}
