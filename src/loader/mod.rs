//! Bulk loading of CSV records into a search collection.
//!
//! The loader drops and recreates the target collection, then streams
//! the CSV in fixed-size batches. Each batch is retried under a
//! [`RetryPolicy`]; a batch that still fails is counted as failed and
//! the load moves on.

pub mod csv_source;
pub mod retry;

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::backend::SearchBackend;
use crate::models::{CollectionSchema, Document, FieldSpec, LoadSummary, DEFAULT_COLLECTION};

pub use self::csv_source::{CsvRecords, CsvSource, RowError};
pub use self::retry::RetryPolicy;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(1);
/// Request timeout for the loader's engine client.
pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything the loader needs besides the engine handle and the file.
#[derive(Debug, Clone)]
pub struct LoadSettings {
    pub collection: String,
    pub batch_size: usize,
    pub retry: RetryPolicy,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
    /// Declared column types; empty means a dynamic schema.
    pub fields: Vec<FieldSpec>,
    pub show_progress: bool,
}

impl Default for LoadSettings {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
            batch_delay: DEFAULT_BATCH_DELAY,
            fields: Vec::new(),
            show_progress: true,
        }
    }
}

impl LoadSettings {
    fn schema_for(&self, source: &CsvSource) -> CollectionSchema {
        if self.fields.is_empty() {
            CollectionSchema::Dynamic {
                columns: source.headers().to_vec(),
            }
        } else {
            CollectionSchema::Declared {
                fields: self.fields.clone(),
            }
        }
    }
}

/// Load `csv_path` into the collection named in `settings`.
///
/// Fails only on startup problems (missing input, unreachable engine,
/// collection setup). Batch and document failures are counted in the
/// returned summary.
pub fn load_csv(
    backend: &dyn SearchBackend,
    csv_path: &Path,
    settings: &LoadSettings,
) -> Result<LoadSummary> {
    let source = CsvSource::open(csv_path)?;

    backend.ping().with_context(|| {
        format!(
            "failed to connect to {} at {}",
            backend.kind().display_name(),
            backend.base_url()
        )
    })?;

    let started_at = current_timestamp();
    let started = Instant::now();
    let schema = settings.schema_for(&source);

    backend
        .recreate_collection(&settings.collection, &schema)
        .with_context(|| format!("failed to recreate collection `{}`", settings.collection))?;
    tracing::info!(
        engine = %backend.kind(),
        collection = %settings.collection,
        path = %csv_path.display(),
        "collection recreated; loading documents"
    );

    let progress = progress_bar(settings.show_progress);
    let mut totals = Totals::default();
    let mut records = source.records()?;
    let batch_size = settings.batch_size.max(1);

    loop {
        let batch = next_batch(&mut records, batch_size, &mut totals);
        if batch.is_empty() {
            break;
        }
        if totals.batches > 0 && !settings.batch_delay.is_zero() {
            thread::sleep(settings.batch_delay);
        }
        totals.batches += 1;
        submit_batch(backend, settings, &batch, totals.batches, &mut totals);

        progress.set_message(format!(
            "{} indexed, {} failed",
            totals.succeeded, totals.failed
        ));
        progress.tick();
    }
    progress.finish_and_clear();

    if let Err(err) = backend.refresh(&settings.collection) {
        tracing::warn!(collection = %settings.collection, error = %err, "refresh failed");
    }

    let verified_count = match backend.count(&settings.collection) {
        Ok(count) => Some(count),
        Err(err) => {
            tracing::warn!(
                collection = %settings.collection,
                error = %err,
                "could not verify document count"
            );
            None
        }
    };

    let summary = LoadSummary {
        engine: backend.kind(),
        collection: settings.collection.clone(),
        succeeded: totals.succeeded,
        failed: totals.failed,
        batches: totals.batches,
        elapsed_secs: started.elapsed().as_secs_f64(),
        started_at,
        verified_count,
    };

    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        batches = summary.batches,
        elapsed_secs = summary.elapsed_secs,
        "load finished"
    );
    Ok(summary)
}

#[derive(Debug, Default)]
struct Totals {
    succeeded: u64,
    failed: u64,
    batches: u64,
}

/// Pull up to `size` documents. Unreadable rows are logged, counted as
/// failed, and skipped without taking a batch slot.
fn next_batch(records: &mut CsvRecords, size: usize, totals: &mut Totals) -> Vec<Document> {
    let mut batch = Vec::with_capacity(size);
    while batch.len() < size {
        match records.next() {
            Some(Ok(doc)) => batch.push(doc),
            Some(Err(RowError { id, message })) => {
                tracing::warn!(id, error = %message, "skipping unreadable CSV row");
                totals.failed += 1;
            }
            None => break,
        }
    }
    batch
}

fn submit_batch(
    backend: &dyn SearchBackend,
    settings: &LoadSettings,
    batch: &[Document],
    number: u64,
    totals: &mut Totals,
) {
    let label = format!("batch {number}");
    let result = settings
        .retry
        .run(&label, || backend.index_batch(&settings.collection, batch));

    match result {
        Ok(report) => {
            for failure in &report.failures {
                tracing::warn!(
                    batch = number,
                    id = failure.id,
                    reason = %failure.reason,
                    "document rejected"
                );
            }
            totals.succeeded += report.indexed;
            totals.failed += report.failures.len() as u64;
            tracing::debug!(
                batch = number,
                indexed = report.indexed,
                rejected = report.failures.len(),
                "batch indexed"
            );
        }
        Err(err) => {
            let first = batch.first().map(|d| d.id).unwrap_or_default();
            let last = batch.last().map(|d| d.id).unwrap_or_default();
            tracing::error!(
                batch = number,
                first_id = first,
                last_id = last,
                error = %err,
                "batch failed; skipping"
            );
            totals.failed += batch.len() as u64;
        }
    }
}

fn progress_bar(visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner} [{elapsed_precise}] {msg}") {
        bar.set_style(style);
    }
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn current_timestamp() -> Option<String> {
    use time::{format_description::well_known::Rfc3339, OffsetDateTime};

    OffsetDateTime::now_utc().format(&Rfc3339).ok()
}
