//! In-memory backend for unit tests.

use std::sync::Mutex;

use super::{BatchReport, DocumentFailure, EngineError, SearchBackend};
use crate::models::{CollectionSchema, Document, EngineKind, Hit, QueryExpr};

#[derive(Default)]
struct FakeState {
    calls: Vec<&'static str>,
    hits: Vec<Hit>,
    search_error: Option<EngineError>,
    searches: Vec<(String, QueryExpr, usize)>,
    ping_error: Option<EngineError>,
    recreated: Vec<(String, CollectionSchema)>,
    transient_failures: usize,
    permanent_failure: bool,
    rejected_ids: Vec<u64>,
    batch_attempts: usize,
    accepted: Vec<Vec<u64>>,
    stored: u64,
}

/// Records every call and answers from canned state.
#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<FakeState>,
}

fn transient() -> EngineError {
    EngineError::Transport {
        url: "http://fake/_bulk".to_string(),
        message: "connection closed before message completed".to_string(),
        transient: true,
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hits(self, hits: Vec<Hit>) -> Self {
        self.state.lock().unwrap().hits = hits;
        self
    }

    pub fn with_search_error(self, err: EngineError) -> Self {
        self.state.lock().unwrap().search_error = Some(err);
        self
    }

    pub fn with_ping_error(self, err: EngineError) -> Self {
        self.state.lock().unwrap().ping_error = Some(err);
        self
    }

    /// Fail the next `n` batch submissions with a transient error.
    pub fn with_transient_failures(self, n: usize) -> Self {
        self.state.lock().unwrap().transient_failures = n;
        self
    }

    /// Fail every batch submission with a non-retryable error.
    pub fn with_permanent_failure(self) -> Self {
        self.state.lock().unwrap().permanent_failure = true;
        self
    }

    /// Reject these documents individually inside accepted batches.
    pub fn with_rejected_ids(self, ids: Vec<u64>) -> Self {
        self.state.lock().unwrap().rejected_ids = ids;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn searches(&self) -> Vec<(String, QueryExpr, usize)> {
        self.state.lock().unwrap().searches.clone()
    }

    pub fn recreated(&self) -> Vec<(String, CollectionSchema)> {
        self.state.lock().unwrap().recreated.clone()
    }

    pub fn batch_attempts(&self) -> usize {
        self.state.lock().unwrap().batch_attempts
    }

    /// Ids of every accepted batch, in submission order.
    pub fn accepted(&self) -> Vec<Vec<u64>> {
        self.state.lock().unwrap().accepted.clone()
    }
}

impl SearchBackend for FakeBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Elasticsearch
    }

    fn base_url(&self) -> &str {
        "http://fake"
    }

    fn ping(&self) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("ping");
        match state.ping_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn recreate_collection(
        &self,
        collection: &str,
        schema: &CollectionSchema,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("recreate_collection");
        state
            .recreated
            .push((collection.to_string(), schema.clone()));
        state.stored = 0;
        Ok(())
    }

    fn index_batch(&self, _collection: &str, docs: &[Document]) -> Result<BatchReport, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("index_batch");
        state.batch_attempts += 1;

        if state.permanent_failure {
            return Err(EngineError::Api {
                engine: "Elasticsearch",
                status: 400,
                reason: "illegal_argument_exception".to_string(),
                details: None,
            });
        }

        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(transient());
        }

        let failures: Vec<DocumentFailure> = docs
            .iter()
            .filter(|doc| state.rejected_ids.contains(&doc.id))
            .map(|doc| DocumentFailure {
                id: doc.id,
                reason: "mapper_parsing_exception".to_string(),
            })
            .collect();

        let report = BatchReport::from_failures(docs.len(), failures);
        state.stored += report.indexed;
        state.accepted.push(docs.iter().map(|d| d.id).collect());
        Ok(report)
    }

    fn refresh(&self, _collection: &str) -> Result<(), EngineError> {
        self.state.lock().unwrap().calls.push("refresh");
        Ok(())
    }

    fn count(&self, _collection: &str) -> Result<u64, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("count");
        Ok(state.stored)
    }

    fn search(
        &self,
        collection: &str,
        query: &QueryExpr,
        limit: usize,
    ) -> Result<Vec<Hit>, EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("search");
        state
            .searches
            .push((collection.to_string(), query.clone(), limit));
        match state.search_error.take() {
            Some(err) => Err(err),
            None => Ok(state.hits.clone()),
        }
    }
}
