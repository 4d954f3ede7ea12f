use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Deserialize;

use crate::backend::EngineConfig;
use crate::loader::{LoadSettings, RetryPolicy, DEFAULT_LOAD_TIMEOUT};
use crate::models::{
    EngineKind, FieldSpec, MatchMode, SearchRequest, DEFAULT_ADDRESS_FIELD, DEFAULT_COLLECTION,
    DEFAULT_FUZZINESS, DEFAULT_MAX_PERMUTED_WORDS, DEFAULT_NAME_FIELD, DEFAULT_SEARCH_LIMIT,
};
use crate::search::query::QueryOptions;
use crate::search::SearchSettings;

pub const DEFAULT_SERVE_ADDR: &str = "127.0.0.1:8080";

/// Top-level CLI entrypoint for `recordsearch`.
#[derive(Parser, Debug)]
#[command(
    name = "recordsearch",
    about = "Bulk-load CSV records into Elasticsearch or Manticore and search them",
    version,
    subcommand_required = false,
    arg_required_else_help = false
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Drop and recreate a collection, then load a CSV file into it.
    Load(LoadArgs),
    /// Run one name/address search and print the results.
    Search(SearchArgs),
    /// Serve the search form and JSON API over HTTP.
    Serve(ServeArgs),
    /// Print the number of documents stored in a collection.
    Count(CountArgs),
}

/// Which engine to talk to and where.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Search engine holding the collection (default: elasticsearch).
    #[arg(long = "engine", value_enum)]
    pub engine: Option<EngineArg>,

    /// Engine base URL. Defaults to the engine's standard local
    /// endpoint.
    #[arg(long = "url", env = "RECORDSEARCH_ENGINE_URL")]
    pub url: Option<String>,

    /// Collection (index or table) name.
    #[arg(long = "collection")]
    pub collection: Option<String>,
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// CSV file with a header row.
    pub path: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Documents per bulk request.
    #[arg(long = "batch-size")]
    pub batch_size: Option<usize>,

    /// Attempts per batch, including the first.
    #[arg(long = "max-attempts")]
    pub max_attempts: Option<u32>,

    /// Delay before retrying a failed batch, in milliseconds.
    #[arg(long = "retry-delay-ms")]
    pub retry_delay_ms: Option<u64>,

    /// Multiplier applied to the retry delay after each failure.
    #[arg(long = "backoff")]
    pub backoff: Option<f64>,

    /// Pause between batches, in milliseconds.
    #[arg(long = "batch-delay-ms")]
    pub batch_delay_ms: Option<u64>,

    /// Per-request timeout for engine calls, in seconds.
    #[arg(long = "timeout-secs")]
    pub timeout_secs: Option<u64>,

    /// Declare a column type instead of letting the engine infer it,
    /// as `NAME:TYPE`. Repeatable.
    #[arg(long = "field")]
    pub fields: Vec<FieldSpec>,

    /// Hide the progress spinner.
    #[arg(long = "no-progress")]
    pub no_progress: bool,

    /// Output format for the load summary.
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Query-construction options shared by `search` and `serve`.
#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Maximum number of hits to return.
    #[arg(long = "limit")]
    pub limit: Option<usize>,

    /// Edit distance appended to each word in fuzzy mode.
    #[arg(long = "fuzziness")]
    pub fuzziness: Option<u8>,

    /// Field holding the name text.
    #[arg(long = "name-field")]
    pub name_field: Option<String>,

    /// Field holding the address text.
    #[arg(long = "address-field")]
    pub address_field: Option<String>,

    /// Largest name (in words) expanded into permutations.
    #[arg(long = "max-permuted-words")]
    pub max_permuted_words: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Name text to match.
    #[arg(long = "name")]
    pub name: Option<String>,

    /// Address text to match.
    #[arg(long = "address")]
    pub address: Option<String>,

    /// How the inputs are turned into clauses.
    #[arg(long = "mode", value_enum)]
    pub mode: Option<MatchModeArg>,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub query: QueryArgs,

    /// Output format (text, table, or json) [default: text].
    #[arg(long = "format", value_enum)]
    pub format: Option<OutputFormat>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind the HTTP server to [default: 127.0.0.1:8080].
    #[arg(long = "addr")]
    pub addr: Option<String>,

    #[command(flatten)]
    pub engine: EngineArgs,

    #[command(flatten)]
    pub query: QueryArgs,
}

#[derive(Args, Debug)]
pub struct CountArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Output format (text or json).
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineArg {
    Elasticsearch,
    Manticore,
}

impl EngineArg {
    pub fn to_model(self) -> EngineKind {
        match self {
            EngineArg::Elasticsearch => EngineKind::Elasticsearch,
            EngineArg::Manticore => EngineKind::Manticore,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchModeArg {
    Permutation,
    Fuzzy,
}

impl MatchModeArg {
    pub fn to_model(self) -> MatchMode {
        match self {
            MatchModeArg::Permutation => MatchMode::Permutation,
            MatchModeArg::Fuzzy => MatchMode::Fuzzy,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Table,
    Json,
}

pub fn listen_addr_from_args(args: &ServeArgs) -> Result<SocketAddr> {
    let raw = args.addr.as_deref().unwrap_or(DEFAULT_SERVE_ADDR);
    raw.parse::<SocketAddr>()
        .with_context(|| format!("invalid listen address `{raw}`"))
}

pub fn engine_config_from_args(args: &EngineArgs) -> EngineConfig {
    let kind = args
        .engine
        .map(EngineArg::to_model)
        .unwrap_or(EngineKind::Elasticsearch);
    EngineConfig::new(kind, args.url.clone())
}

pub fn collection_from_args(args: &EngineArgs) -> String {
    args.collection
        .clone()
        .unwrap_or_else(|| DEFAULT_COLLECTION.to_string())
}

/// Engine settings for a load. Unlike searches, loads run with a
/// request timeout.
pub fn load_engine_config_from_args(args: &LoadArgs) -> EngineConfig {
    let timeout = args
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_LOAD_TIMEOUT);
    engine_config_from_args(&args.engine).with_timeout(Some(timeout))
}

pub fn load_settings_from_args(args: &LoadArgs) -> Result<LoadSettings> {
    let defaults = LoadSettings::default();

    let batch_size = args.batch_size.unwrap_or(defaults.batch_size);
    if batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }

    let max_attempts = args.max_attempts.unwrap_or(defaults.retry.max_attempts);
    if max_attempts == 0 {
        bail!("--max-attempts must be at least 1");
    }

    let backoff = args.backoff.unwrap_or(defaults.retry.backoff);
    if !backoff.is_finite() || backoff < 0.0 {
        bail!("--backoff must be a non-negative number");
    }

    let retry = RetryPolicy {
        max_attempts,
        delay: args
            .retry_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.delay),
        backoff,
        ..defaults.retry
    };

    Ok(LoadSettings {
        collection: collection_from_args(&args.engine),
        batch_size,
        retry,
        batch_delay: args
            .batch_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.batch_delay),
        fields: args.fields.clone(),
        show_progress: !args.no_progress,
    })
}

pub fn search_settings_from_args(engine: &EngineArgs, query: &QueryArgs) -> SearchSettings {
    SearchSettings {
        collection: collection_from_args(engine),
        limit: query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
        query: QueryOptions {
            name_field: query
                .name_field
                .clone()
                .unwrap_or_else(|| DEFAULT_NAME_FIELD.to_string()),
            address_field: query
                .address_field
                .clone()
                .unwrap_or_else(|| DEFAULT_ADDRESS_FIELD.to_string()),
            fuzziness: query.fuzziness.unwrap_or(DEFAULT_FUZZINESS),
            max_permuted_words: query
                .max_permuted_words
                .unwrap_or(DEFAULT_MAX_PERMUTED_WORDS),
        },
    }
}

pub fn search_request_from_args(args: &SearchArgs) -> SearchRequest {
    SearchRequest {
        name: args.name.clone(),
        address: args.address.clone(),
        mode: args
            .mode
            .map(MatchModeArg::to_model)
            .unwrap_or_default(),
        // The hit cap lives in the settings for CLI searches.
        limit: None,
    }
}
