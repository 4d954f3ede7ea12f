use std::time::Duration;

use anyhow::Result;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use super::http::{ndjson, HttpTransport};
use super::{parse_hits, BatchReport, DocumentFailure, EngineError, SearchBackend};
use crate::models::{CollectionSchema, Document, EngineKind, Hit, QueryExpr};

/// Column name Manticore reserves for the document id.
const RESERVED_ID_COLUMN: &str = "id";

/// Manticore Search backend using the JSON and SQL-over-HTTP APIs.
pub struct ManticoreBackend {
    http: HttpTransport,
}

impl ManticoreBackend {
    /// Create a backend targeting the given base URL
    /// (e.g. "http://127.0.0.1:9308").
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self> {
        Ok(Self {
            http: HttpTransport::new(base_url, EngineKind::Manticore.display_name(), timeout)?,
        })
    }

    /// Run a statement through `POST /sql?mode=raw`, returning the
    /// first result set.
    fn sql(&self, statement: &str) -> Result<Value, EngineError> {
        let url = self.http.url_for("/sql?mode=raw");
        tracing::debug!(statement, "manticore sql");

        let request = self
            .http
            .client()
            .post(&url)
            .form(&[("query", statement)]);
        let body: Value = self.http.send_json(&url, request)?;

        // Raw mode answers with an array of result sets; errors are
        // reported in-band with a 200 status.
        let first = match body {
            Value::Array(mut sets) if !sets.is_empty() => sets.swap_remove(0),
            Value::Array(_) => Value::Null,
            other => other,
        };

        if let Some(reason) = first
            .get("error")
            .and_then(|e| e.as_str())
            .filter(|e| !e.is_empty())
        {
            return Err(EngineError::Api {
                engine: EngineKind::Manticore.display_name(),
                status: 200,
                reason: reason.to_string(),
                details: Some(first.clone()),
            });
        }

        Ok(first)
    }
}

/// Validate a table or column name before splicing it into SQL.
fn sql_identifier(name: &str) -> Result<&str, EngineError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if valid {
        Ok(name)
    } else {
        Err(EngineError::Unsupported(format!(
            "`{name}` is not a valid Manticore identifier"
        )))
    }
}

/// Build the `CREATE TABLE` statement for a schema. Dynamic schemas
/// declare every CSV column as `text`.
fn create_table_statement(
    collection: &str,
    schema: &CollectionSchema,
) -> Result<String, EngineError> {
    let table = sql_identifier(collection)?;

    let columns: Vec<(String, String)> = match schema {
        CollectionSchema::Dynamic { columns } => columns
            .iter()
            .map(|c| (c.clone(), "text".to_string()))
            .collect(),
        CollectionSchema::Declared { fields } => fields
            .iter()
            .map(|f| (f.name.clone(), f.kind.clone()))
            .collect(),
    };

    let mut parts = Vec::new();
    for (name, kind) in &columns {
        if name == RESERVED_ID_COLUMN {
            continue;
        }
        parts.push(format!("{} {}", sql_identifier(name)?, kind));
    }

    if parts.is_empty() {
        return Err(EngineError::Unsupported(format!(
            "table `{table}` needs at least one column besides `id`"
        )));
    }

    Ok(format!("CREATE TABLE {table}({})", parts.join(", ")))
}

/// `insert` action lines for `POST /bulk`.
fn bulk_lines(collection: &str, docs: &[Document]) -> Vec<Value> {
    docs.iter()
        .map(|doc| {
            let mut fields = doc.fields.clone();
            fields.remove(RESERVED_ID_COLUMN);
            json!({"insert": {"table": collection, "id": doc.id, "doc": fields}})
        })
        .collect()
}

/// Collect failures from a bulk response.
///
/// Manticore answers with one item per run of consecutive inserts,
/// each carrying a `created` count, and stops at the first failing
/// line. The first `sum(created)` documents were stored; every later
/// document is reported with the top-level error.
fn bulk_failures(body: &Value, docs: &[Document]) -> Vec<DocumentFailure> {
    if !body.get("errors").and_then(|v| v.as_bool()).unwrap_or(false) {
        return Vec::new();
    }

    let created: u64 = body
        .get("items")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                // Each item is `{"bulk": {...}}` or `{"insert": {...}}`.
                .filter_map(|item| item.as_object().and_then(|o| o.values().next()))
                .filter_map(|result| result.get("created").and_then(|c| c.as_u64()))
                .sum::<u64>()
        })
        .unwrap_or(0);
    let acknowledged = usize::try_from(created).unwrap_or(usize::MAX).min(docs.len());

    let reason = super::http::error_reason(body)
        .unwrap_or_else(|| "rejected by bulk request".to_string());
    docs[acknowledged..]
        .iter()
        .map(|doc| DocumentFailure {
            id: doc.id,
            reason: reason.clone(),
        })
        .collect()
}

impl SearchBackend for ManticoreBackend {
    fn kind(&self) -> EngineKind {
        EngineKind::Manticore
    }

    fn base_url(&self) -> &str {
        self.http.base_url()
    }

    fn ping(&self) -> Result<(), EngineError> {
        self.sql("SHOW TABLES").map(|_| ())
    }

    fn recreate_collection(
        &self,
        collection: &str,
        schema: &CollectionSchema,
    ) -> Result<(), EngineError> {
        let create = create_table_statement(collection, schema)?;

        self.sql(&format!("DROP TABLE IF EXISTS {}", sql_identifier(collection)?))?;
        tracing::info!(table = collection, "dropped existing table");

        self.sql(&create)?;
        tracing::info!(table = collection, statement = %create, "created table");
        Ok(())
    }

    fn index_batch(&self, collection: &str, docs: &[Document]) -> Result<BatchReport, EngineError> {
        if docs.is_empty() {
            return Ok(BatchReport::default());
        }

        let url = self.http.url_for("/bulk");
        let body = ndjson(bulk_lines(collection, docs).iter())?;
        let request = self
            .http
            .client()
            .post(&url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body);

        // A failing line makes Manticore answer with an error status
        // while still describing which lines were applied.
        let response = self.http.execute(&url, request)?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| EngineError::from_reqwest(&url, err))?;

        let parsed = serde_json::from_str::<Value>(&text).ok();
        match parsed {
            Some(body) if body.get("items").is_some() => Ok(BatchReport::from_failures(
                docs.len(),
                bulk_failures(&body, docs),
            )),
            _ if !status.is_success() => Err(self.http.api_error(status.as_u16(), &text)),
            _ => Err(EngineError::Decode {
                url,
                message: "bulk response has no `items` array".to_string(),
            }),
        }
    }

    fn count(&self, collection: &str) -> Result<u64, EngineError> {
        let statement = format!("SELECT COUNT(*) FROM {}", sql_identifier(collection)?);
        let result = self.sql(&statement)?;

        result
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|row| row.get("count(*)"))
            .and_then(|c| c.as_u64())
            .ok_or_else(|| EngineError::Decode {
                url: self.http.url_for("/sql"),
                message: "COUNT(*) result has no numeric `count(*)` column".to_string(),
            })
    }

    fn search(
        &self,
        collection: &str,
        query: &QueryExpr,
        limit: usize,
    ) -> Result<Vec<Hit>, EngineError> {
        if query.uses_query_string() {
            return Err(EngineError::Unsupported(
                "fuzzy query strings are not supported by the Manticore backend".to_string(),
            ));
        }

        let url = self.http.url_for("/search");
        let request_body = json!({
            "table": collection,
            "query": query.to_dsl(),
            "limit": limit,
            "_source": ["*"],
        });
        tracing::debug!(body = %request_body, "manticore search request");

        let body: Value = self
            .http
            .send_json(&url, self.http.client().post(&url).json(&request_body))?;
        parse_hits(&url, &body)
    }
}
