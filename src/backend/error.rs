use serde_json::Value;
use thiserror::Error;

/// Failure talking to a search engine.
///
/// The variants separate transport problems (which may be retried)
/// from errors the engine itself reported.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The request never produced an HTTP response.
    #[error("request to {url} failed: {message}")]
    Transport {
        url: String,
        message: String,
        transient: bool,
    },

    /// The engine answered with an error status or error payload.
    #[error("{engine} API error ({status}): {reason}")]
    Api {
        engine: &'static str,
        status: u16,
        reason: String,
        /// Raw JSON error body, when the engine sent one.
        details: Option<Value>,
    },

    /// The response body did not have the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    /// The request cannot be expressed for this engine.
    #[error("{0}")]
    Unsupported(String),
}

impl EngineError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            EngineError::Transport { transient, .. } => *transient,
            EngineError::Api { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            EngineError::Decode { .. } | EngineError::Unsupported(_) => false,
        }
    }

    /// Raw diagnostic payload suitable for showing to a user.
    pub fn details(&self) -> Option<&Value> {
        match self {
            EngineError::Api { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_decode() {
            return EngineError::Decode {
                url: url.to_string(),
                message: err.to_string(),
            };
        }

        // Connection refused/reset, timeouts, and bodies cut off by the
        // remote end closing the connection all surface as connect,
        // timeout, or request errors.
        let transient = err.is_connect() || err.is_timeout() || err.is_request();
        EngineError::Transport {
            url: url.to_string(),
            message: describe(&err),
            transient,
        }
    }
}

/// Flatten an error and its sources into one line.
fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
