use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::cli::args::{EngineArg, EngineArgs, MatchModeArg, OutputFormat, QueryArgs};
use crate::cli::{LoadArgs, SearchArgs, ServeArgs};
use crate::models::FieldSpec;

const CONFIG_DIR: &str = ".recordsearch";

/// Top-level representation of `.recordsearch/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub engine: Option<EngineSection>,

    #[serde(default)]
    pub load: Option<LoadSection>,

    #[serde(default)]
    pub search: Option<SearchSection>,

    #[serde(default)]
    pub serve: Option<ServeSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EngineSection {
    #[serde(default, alias = "kind")]
    pub engine: Option<EngineArg>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoadSection {
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub backoff: Option<f64>,
    #[serde(default)]
    pub batch_delay_ms: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Column declarations as `NAME:TYPE` strings.
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchSection {
    #[serde(default)]
    pub mode: Option<MatchModeArg>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub fuzziness: Option<u8>,
    #[serde(default)]
    pub name_field: Option<String>,
    #[serde(default)]
    pub address_field: Option<String>,
    #[serde(default)]
    pub max_permuted_words: Option<usize>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServeSection {
    #[serde(default)]
    pub addr: Option<String>,
}

/// Discover and load a project-local `.recordsearch/config.toml`
/// starting from the current working directory and walking up parent
/// directories.
pub fn load_cli_config() -> Result<Option<CliConfig>> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let Some(path) = find_project_config(&cwd) else {
        return Ok(None);
    };

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: CliConfig = toml::from_str(&contents)
        .with_context(|| format!("failed to parse TOML config at {}", path.display()))?;

    tracing::debug!(path = %path.display(), "loaded project config");
    Ok(Some(config))
}

fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);

    while let Some(current) = dir {
        let config_toml = current.join(CONFIG_DIR).join("config.toml");
        if config_toml.is_file() {
            return Some(config_toml);
        }
        dir = current.parent();
    }

    None
}

pub fn apply_engine_config_defaults(config: &CliConfig, args: &mut EngineArgs) {
    let Some(engine) = &config.engine else {
        return;
    };

    if args.engine.is_none() {
        args.engine = engine.engine;
    }

    // A URL only makes sense for the engine it was written for.
    if args.url.is_none() && (engine.engine.is_none() || args.engine == engine.engine) {
        if let Some(url) = &engine.url {
            args.url = Some(url.clone());
        }
    }

    if args.collection.is_none() {
        if let Some(collection) = &engine.collection {
            args.collection = Some(collection.clone());
        }
    }
}

pub fn apply_load_config_defaults(config: &CliConfig, args: &mut LoadArgs) -> Result<()> {
    apply_engine_config_defaults(config, &mut args.engine);

    let Some(load) = &config.load else {
        return Ok(());
    };

    if args.batch_size.is_none() {
        args.batch_size = load.batch_size;
    }
    if args.max_attempts.is_none() {
        args.max_attempts = load.max_attempts;
    }
    if args.retry_delay_ms.is_none() {
        args.retry_delay_ms = load.retry_delay_ms;
    }
    if args.backoff.is_none() {
        args.backoff = load.backoff;
    }
    if args.batch_delay_ms.is_none() {
        args.batch_delay_ms = load.batch_delay_ms;
    }
    if args.timeout_secs.is_none() {
        args.timeout_secs = load.timeout_secs;
    }

    if args.fields.is_empty() && !load.fields.is_empty() {
        args.fields = load
            .fields
            .iter()
            .map(|raw| {
                raw.parse::<FieldSpec>()
                    .map_err(|err: String| anyhow::anyhow!("invalid [load] field: {err}"))
            })
            .collect::<Result<Vec<_>>>()?;
    }

    Ok(())
}

fn apply_query_config_defaults(search: &SearchSection, args: &mut QueryArgs) {
    if args.limit.is_none() {
        args.limit = search.limit;
    }
    if args.fuzziness.is_none() {
        args.fuzziness = search.fuzziness;
    }
    if args.name_field.is_none() {
        args.name_field = search.name_field.clone();
    }
    if args.address_field.is_none() {
        args.address_field = search.address_field.clone();
    }
    if args.max_permuted_words.is_none() {
        args.max_permuted_words = search.max_permuted_words;
    }
}

pub fn apply_search_config_defaults(config: &CliConfig, args: &mut SearchArgs) {
    apply_engine_config_defaults(config, &mut args.engine);

    if let Some(search) = &config.search {
        apply_query_config_defaults(search, &mut args.query);

        if args.mode.is_none() {
            args.mode = search.mode;
        }

        if args.format.is_none() {
            args.format = search.format;
        }
    }
}

pub fn apply_serve_config_defaults(config: &CliConfig, args: &mut ServeArgs) {
    apply_engine_config_defaults(config, &mut args.engine);

    if let Some(search) = &config.search {
        apply_query_config_defaults(search, &mut args.query);
    }

    if let Some(serve) = &config.serve {
        if args.addr.is_none() {
            args.addr = serve.addr.clone();
        }
    }
}
