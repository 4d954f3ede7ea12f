//! Shared data models for documents, queries, hits, and summaries.
//!
//! These types form the JSON surface shared by the CLI (`--format
//! json`), the HTTP API, and the engine clients.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default Elasticsearch endpoint.
pub const DEFAULT_ELASTICSEARCH_URL: &str = "http://localhost:9200";

/// Default Manticore HTTP endpoint.
pub const DEFAULT_MANTICORE_URL: &str = "http://127.0.0.1:9308";

/// Default collection (index/table) name.
pub const DEFAULT_COLLECTION: &str = "data3";

/// Default field holding the searchable person or company name.
pub const DEFAULT_NAME_FIELD: &str = "debtor_name";

/// Default field holding the searchable address.
pub const DEFAULT_ADDRESS_FIELD: &str = "debtor_address";

/// Maximum number of hits returned per search unless overridden.
pub const DEFAULT_SEARCH_LIMIT: usize = 50;

/// Edit distance appended to every word in fuzzy mode (`word~2`).
pub const DEFAULT_FUZZINESS: u8 = 2;

/// Names with more words than this are rejected in permutation mode.
///
/// 6 words already produce 720 phrase clauses; one more word exceeds
/// the default Elasticsearch clause limit.
pub const DEFAULT_MAX_PERMUTED_WORDS: usize = 6;

/// Which search engine a collection lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Elasticsearch,
    Manticore,
}

impl EngineKind {
    /// Endpoint used when none is configured.
    pub fn default_url(self) -> &'static str {
        match self {
            EngineKind::Elasticsearch => DEFAULT_ELASTICSEARCH_URL,
            EngineKind::Manticore => DEFAULT_MANTICORE_URL,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EngineKind::Elasticsearch => "Elasticsearch",
            EngineKind::Manticore => "Manticore",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// How the name and address inputs are turned into clauses.
///
/// `Permutation` matches every word ordering of a multi-word name as
/// an exact phrase. `Fuzzy` tolerates typos by appending an edit
/// distance to each word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Permutation,
    Fuzzy,
}

/// One CSV row ready to be indexed.
///
/// Field order follows the CSV header; `serde_json` is built with
/// `preserve_order` so the order survives serialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Sequential identifier assigned at load time, starting at 1.
    pub id: u64,
    /// Column name to cell text. Missing cells are stored as `""`.
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.fields
            .insert(column.into(), Value::String(value.into()));
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields.get(column).and_then(|v| v.as_str())
    }
}

/// A column declaration passed to the engine when creating a
/// collection, written as `name:type` on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    /// Engine-specific type name (`text`, `keyword`, `string`, ...).
    pub kind: String,
}

impl FromStr for FieldSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, kind) = s
            .split_once(':')
            .ok_or_else(|| format!("expected NAME:TYPE, got `{s}`"))?;
        let name = name.trim();
        let kind = kind.trim();
        if name.is_empty() || kind.is_empty() {
            return Err(format!("expected NAME:TYPE, got `{s}`"));
        }
        Ok(Self {
            name: name.to_string(),
            kind: kind.to_string(),
        })
    }
}

/// Schema used when (re)creating a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum CollectionSchema {
    /// Let the engine infer field types. `columns` lists the CSV
    /// headers for engines that need an explicit column list.
    Dynamic { columns: Vec<String> },
    /// Explicit column declarations.
    Declared { fields: Vec<FieldSpec> },
}

/// Boolean query tree sent to the engine.
///
/// Built by `search::query::build_query` and rendered to the engine
/// JSON DSL by `QueryExpr::to_dsl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryExpr {
    /// Analyzed full-text match of any term.
    Match { field: String, text: String },
    /// All terms, contiguous and in order.
    MatchPhrase { field: String, text: String },
    /// Lucene-style query string against a default field.
    QueryString { field: String, query: String },
    /// At least one sub-expression must match.
    AnyOf(Vec<QueryExpr>),
    /// Every sub-expression must match.
    AllOf(Vec<QueryExpr>),
}

/// A user search as submitted by the form, CLI, or JSON API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub mode: MatchMode,
    /// Overrides the configured hit limit when present.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// A document returned by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Engine-side document id (numeric for Manticore, string for
    /// Elasticsearch; always rendered as text here).
    pub id: String,
    /// Relevance score computed by the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Stored fields of the document.
    pub source: Map<String, Value>,
}

/// Result of a single search interaction.
///
/// "No hits" is `Hits` with an empty vector and is distinct from
/// `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// Neither a name nor an address was supplied; the engine was not
    /// contacted.
    NoQuery,
    Hits {
        hits: Vec<Hit>,
        elapsed_ms: u64,
    },
    Error {
        message: String,
        /// Raw error payload returned by the engine, when available.
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

/// Totals reported at the end of a bulk load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub engine: EngineKind,
    pub collection: String,
    pub succeeded: u64,
    pub failed: u64,
    pub batches: u64,
    pub elapsed_secs: f64,
    /// RFC 3339 timestamp of when the load started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    /// Document count reported by the engine after loading, when the
    /// engine could be queried.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_count: Option<u64>,
}
