//! Search execution.
//!
//! `run_search` builds the query for a request, sends it to the
//! configured backend, and folds every failure into a
//! `SearchOutcome` so callers can present it without aborting.

pub mod query;

use std::time::Instant;

use serde_json::json;

use crate::backend::SearchBackend;
use crate::models::{SearchOutcome, SearchRequest, DEFAULT_COLLECTION, DEFAULT_SEARCH_LIMIT};

use self::query::{build_query, QueryOptions};

/// Settings shared by every search against one collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchSettings {
    pub collection: String,
    /// Hit cap used when the request does not carry its own limit.
    pub limit: usize,
    pub query: QueryOptions,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            limit: DEFAULT_SEARCH_LIMIT,
            query: QueryOptions::default(),
        }
    }
}

/// Run one search interaction.
///
/// Never fails: an empty request yields `NoQuery` without contacting
/// the engine, and engine or transport errors yield `Error` with the
/// raw engine payload attached when there is one.
pub fn run_search(
    backend: &dyn SearchBackend,
    request: &SearchRequest,
    settings: &SearchSettings,
) -> SearchOutcome {
    let query = match build_query(request, &settings.query) {
        Ok(Some(query)) => query,
        Ok(None) => return SearchOutcome::NoQuery,
        Err(err) => {
            return SearchOutcome::Error {
                message: err.to_string(),
                details: None,
            }
        }
    };

    let limit = request.limit.unwrap_or(settings.limit);
    let started = Instant::now();

    match backend.search(&settings.collection, &query, limit) {
        Ok(hits) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            tracing::info!(
                engine = %backend.kind(),
                collection = %settings.collection,
                hits = hits.len(),
                elapsed_ms,
                "search completed"
            );
            SearchOutcome::Hits { hits, elapsed_ms }
        }
        Err(err) => {
            tracing::warn!(engine = %backend.kind(), error = %err, "search failed");
            let details = err
                .details()
                .cloned()
                .or_else(|| Some(json!({"query": query.to_dsl()})));
            SearchOutcome::Error {
                message: err.to_string(),
                details,
            }
        }
    }
}
