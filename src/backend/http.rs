use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::EngineError;

/// Blocking HTTP plumbing shared by the engine clients.
pub(crate) struct HttpTransport {
    client: Client,
    base_url: String,
    engine: &'static str,
}

impl HttpTransport {
    /// Create a transport targeting the given base URL
    /// (e.g. "http://localhost:9200").
    ///
    /// `timeout` bounds every request; `None` waits indefinitely.
    pub fn new(base_url: &str, engine: &'static str, timeout: Option<Duration>) -> Result<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url,
            engine,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send a request, mapping only transport failures to errors.
    pub fn execute(&self, url: &str, request: RequestBuilder) -> Result<Response, EngineError> {
        request
            .send()
            .map_err(|err| EngineError::from_reqwest(url, err))
    }

    /// Send a request and require a success status.
    pub fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, EngineError> {
        let response = self.execute(url, request)?;
        self.check_status(url, response)
    }

    /// Send a request, require a success status, and decode the JSON
    /// body.
    pub fn send_json<R>(&self, url: &str, request: RequestBuilder) -> Result<R, EngineError>
    where
        R: DeserializeOwned,
    {
        let response = self.send(url, request)?;
        response
            .json::<R>()
            .map_err(|err| EngineError::from_reqwest(url, err))
    }

    /// Turn a non-success response into `EngineError::Api`, keeping
    /// the raw JSON body as diagnostic details.
    pub fn check_status(&self, url: &str, response: Response) -> Result<Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .map_err(|err| EngineError::from_reqwest(url, err))?;
        Err(self.api_error(status.as_u16(), &body))
    }

    pub fn api_error(&self, status: u16, body: &str) -> EngineError {
        let details = serde_json::from_str::<Value>(body).ok();
        let reason = details
            .as_ref()
            .and_then(error_reason)
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("HTTP status {status}")
                } else {
                    trimmed.to_string()
                }
            });

        EngineError::Api {
            engine: self.engine,
            status,
            reason,
            details,
        }
    }
}

/// Extract a human-readable reason from an engine error body.
///
/// Handles both `{"error": "text"}` and the structured
/// `{"error": {"type": .., "reason": ..}}` form.
pub(crate) fn error_reason(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        Value::Object(obj) => {
            let reason = obj.get("reason").and_then(|v| v.as_str());
            let kind = obj.get("type").and_then(|v| v.as_str());
            match (kind, reason) {
                (Some(kind), Some(reason)) => Some(format!("{kind}: {reason}")),
                (None, Some(reason)) => Some(reason.to_string()),
                (Some(kind), None) => Some(kind.to_string()),
                (None, None) => None,
            }
        }
        _ => None,
    }
}

/// Serialize values as newline-delimited JSON, terminated by a
/// trailing newline as the bulk endpoints require.
pub(crate) fn ndjson<'a, I>(lines: I) -> Result<String, EngineError>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut body = String::new();
    for line in lines {
        let encoded = serde_json::to_string(line)
            .map_err(|err| EngineError::Unsupported(format!("failed to encode document: {err}")))?;
        body.push_str(&encoded);
        body.push('\n');
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_for_joins_without_duplicate_slashes() {
        let transport =
            HttpTransport::new("http://localhost:9200/", "Elasticsearch", None).expect("transport");
        assert_eq!(transport.base_url(), "http://localhost:9200");
        assert_eq!(
            transport.url_for("/data3/_search"),
            "http://localhost:9200/data3/_search"
        );
    }

    #[test]
    fn error_reason_reads_structured_and_plain_errors() {
        let structured = json!({
            "error": {"type": "index_not_found_exception", "reason": "no such index [data3]"},
            "status": 404
        });
        assert_eq!(
            error_reason(&structured).as_deref(),
            Some("index_not_found_exception: no such index [data3]")
        );

        let plain = json!({"error": "unknown table 'data3'"});
        assert_eq!(error_reason(&plain).as_deref(), Some("unknown table 'data3'"));

        assert_eq!(error_reason(&json!({"error": ""})), None);
        assert_eq!(error_reason(&json!({"ok": true})), None);
    }

    #[test]
    fn api_error_falls_back_to_raw_body() {
        let transport =
            HttpTransport::new("http://localhost:9308", "Manticore", None).expect("transport");
        let err = transport.api_error(500, "upstream exploded");
        match err {
            EngineError::Api {
                status,
                reason,
                details,
                ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(reason, "upstream exploded");
                assert!(details.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn ndjson_terminates_every_line() {
        let lines = [json!({"index": {"_id": "1"}}), json!({"name": "A"})];
        let body = ndjson(lines.iter()).expect("ndjson");
        assert_eq!(body, "{\"index\":{\"_id\":\"1\"}}\n{\"name\":\"A\"}\n");
    }
}
