use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use serde_json::json;

use crate::backend::{open_backend, SearchBackend};
use crate::loader;
use crate::models::SearchOutcome;
use crate::search;
use crate::server::{self, AppState};

mod args;
mod config;
mod format;

pub use args::{
    Cli, Commands, CountArgs, EngineArgs, LoadArgs, OutputFormat, QueryArgs, SearchArgs, ServeArgs,
};

use config::{
    apply_engine_config_defaults, apply_load_config_defaults, apply_search_config_defaults,
    apply_serve_config_defaults, load_cli_config,
};

/// Entry point for the CLI binary.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let cli_config = load_cli_config()?;

    match cli.command {
        Some(Commands::Load(mut load_args)) => {
            if let Some(ref config) = cli_config {
                apply_load_config_defaults(config, &mut load_args)?;
            }

            let settings = args::load_settings_from_args(&load_args)?;
            let engine = args::load_engine_config_from_args(&load_args);
            let backend = open_backend(&engine)?;

            let summary = loader::load_csv(backend.as_ref(), &load_args.path, &settings)?;

            match load_args.format {
                OutputFormat::Text | OutputFormat::Table => format::print_load_summary_text(&summary),
                OutputFormat::Json => format::print_json(&summary),
            }
        }
        Some(Commands::Search(mut search_args)) => {
            if let Some(ref config) = cli_config {
                apply_search_config_defaults(config, &mut search_args);
            }

            let settings = args::search_settings_from_args(&search_args.engine, &search_args.query);
            let request = args::search_request_from_args(&search_args);
            let backend = open_backend(&args::engine_config_from_args(&search_args.engine))?;

            let outcome = search::run_search(backend.as_ref(), &request, &settings);

            match search_args.format.unwrap_or_default() {
                OutputFormat::Text => format::print_outcome_text(&outcome)?,
                OutputFormat::Table => format::print_outcome_table(
                    &outcome,
                    &settings.query.name_field,
                    &settings.query.address_field,
                )?,
                OutputFormat::Json => format::print_json(&outcome)?,
            }

            if let SearchOutcome::Error { message, .. } = &outcome {
                anyhow::bail!("search failed: {message}");
            }
            Ok(())
        }
        Some(Commands::Serve(mut serve_args)) => {
            if let Some(ref config) = cli_config {
                apply_serve_config_defaults(config, &mut serve_args);
            }

            let addr = args::listen_addr_from_args(&serve_args)?;
            let settings = args::search_settings_from_args(&serve_args.engine, &serve_args.query);

            // The blocking HTTP client must be created and dropped
            // outside the async runtime.
            let backend: Arc<dyn SearchBackend> =
                Arc::from(open_backend(&args::engine_config_from_args(&serve_args.engine))?);
            let state = AppState::new(Arc::clone(&backend), settings);

            println!(
                "Starting recordsearch HTTP server on http://{addr} ({} at {})",
                backend.kind(),
                backend.base_url()
            );

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;

            let result = runtime.block_on(server::run(addr, state));
            drop(runtime);
            drop(backend);
            result
        }
        Some(Commands::Count(mut count_args)) => {
            if let Some(ref config) = cli_config {
                apply_engine_config_defaults(config, &mut count_args.engine);
            }

            let collection = args::collection_from_args(&count_args.engine);
            let backend = open_backend(&args::engine_config_from_args(&count_args.engine))?;
            let count = backend
                .count(&collection)
                .with_context(|| format!("failed to count documents in `{collection}`"))?;

            match count_args.format {
                OutputFormat::Text | OutputFormat::Table => {
                    println!("{collection}: {count} document(s)");
                    Ok(())
                }
                OutputFormat::Json => format::print_json(&json!({
                    "engine": backend.kind(),
                    "collection": collection,
                    "count": count,
                })),
            }
        }
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
