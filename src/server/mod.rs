//! HTTP server mode for `recordsearch`.
//!
//! - `GET /` – the search form.
//! - `GET /search` – form submission; renders results under the form.
//! - `POST /v1/search` – accepts a JSON `SearchRequest` and returns a
//!   `SearchOutcome`.
//! - `GET /v1/health` – simple health check endpoint.
//!
//! Engine calls go through the blocking HTTP client, so every search
//! runs on the blocking thread pool. Engine failures are part of the
//! `SearchOutcome`, not HTTP errors.

mod html;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::backend::SearchBackend;
use crate::models::{EngineKind, MatchMode, SearchOutcome, SearchRequest};
use crate::search::{self, SearchSettings};

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    backend: Arc<dyn SearchBackend>,
    settings: Arc<SearchSettings>,
}

impl AppState {
    pub fn new(backend: Arc<dyn SearchBackend>, settings: SearchSettings) -> Self {
        Self {
            backend,
            settings: Arc::new(settings),
        }
    }

    fn page_target(&self) -> html::PageTarget<'_> {
        html::PageTarget {
            engine: self.backend.kind(),
            collection: &self.settings.collection,
            fuzziness: self.settings.query.fuzziness,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    engine: EngineKind,
    collection: String,
}

/// JSON error body returned by the API.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Error type used by HTTP handlers for failures outside the search
/// itself.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Query string of the HTML form. Every field may be missing or
/// empty.
#[derive(Debug, Default, Deserialize)]
struct SearchForm {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    mode: Option<String>,
}

impl SearchForm {
    fn into_request(self) -> SearchRequest {
        let mode = match self.mode.as_deref().map(str::trim) {
            Some(m) if m.eq_ignore_ascii_case("fuzzy") => MatchMode::Fuzzy,
            _ => MatchMode::Permutation,
        };
        SearchRequest {
            name: self.name,
            address: self.address,
            mode,
            limit: None,
        }
    }
}

/// Build the Axum router for the search UI and API.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(form_page))
        .route("/search", get(search_page))
        .route("/v1/search", post(search_json))
        .route("/v1/health", get(health))
        .with_state(state)
}

/// Run the HTTP server bound to the provided socket address until
/// Ctrl-C.
pub async fn run(addr: SocketAddr, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve_with_listener(listener, state).await
}

/// Run the HTTP server using an existing `TcpListener`.
pub async fn serve_with_listener(listener: TcpListener, state: AppState) -> Result<()> {
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, engine = %state.backend.kind(), "server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

async fn form_page(State(state): State<AppState>) -> Html<String> {
    Html(html::render_page(
        &state.page_target(),
        &SearchRequest::default(),
        None,
    ))
}

async fn search_page(
    State(state): State<AppState>,
    Query(form): Query<SearchForm>,
) -> Result<Html<String>, ApiError> {
    let request = form.into_request();
    let outcome = execute(&state, request.clone()).await?;
    Ok(Html(html::render_page(
        &state.page_target(),
        &request,
        Some(&outcome),
    )))
}

async fn search_json(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchOutcome>, ApiError> {
    let outcome = execute(&state, request).await?;
    Ok(Json(outcome))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        engine: state.backend.kind(),
        collection: state.settings.collection.clone(),
    })
}

async fn execute(state: &AppState, request: SearchRequest) -> Result<SearchOutcome, ApiError> {
    let backend = Arc::clone(&state.backend);
    let settings = Arc::clone(&state.settings);

    tokio::task::spawn_blocking(move || search::run_search(backend.as_ref(), &request, &settings))
        .await
        .map_err(|err| ApiError::internal(format!("search task failed: {err}")))
}
