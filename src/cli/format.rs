use std::fmt::Write as _;

use anyhow::Result;
use serde::Serialize;

use crate::models::{Hit, LoadSummary, SearchOutcome};

pub const NO_QUERY_MESSAGE: &str = "Please enter at least a name or an address.";
pub const NO_HITS_MESSAGE: &str = "No matching documents found.";

/// Banner shown above a successful result list.
pub fn found_banner(count: usize) -> String {
    format!("Found {count} matching document(s)")
}

/// Elapsed-time line shown under the banner.
pub fn elapsed_line(elapsed_ms: u64) -> String {
    format!("Search completed in {:.3} seconds", elapsed_ms as f64 / 1000.0)
}

/// Render a `SearchOutcome` in human-readable text form.
///
/// Hits are rendered as a `### Result i` heading followed by the
/// document's stored fields as pretty-printed JSON.
pub fn render_outcome_text(outcome: &SearchOutcome) -> String {
    let mut out = String::new();
    match outcome {
        SearchOutcome::NoQuery => {
            let _ = writeln!(out, "{NO_QUERY_MESSAGE}");
        }
        SearchOutcome::Error { message, details } => {
            let _ = writeln!(out, "Search error: {message}");
            if let Some(details) = details {
                let _ = writeln!(out, "{}", pretty_json(details));
            }
        }
        SearchOutcome::Hits { hits, elapsed_ms } if hits.is_empty() => {
            let _ = writeln!(out, "{NO_HITS_MESSAGE}");
            let _ = writeln!(out, "{}", elapsed_line(*elapsed_ms));
        }
        SearchOutcome::Hits { hits, elapsed_ms } => {
            let _ = writeln!(out, "{}", found_banner(hits.len()));
            let _ = writeln!(out, "{}", elapsed_line(*elapsed_ms));
            for (idx, hit) in hits.iter().enumerate() {
                let _ = writeln!(out);
                let _ = writeln!(out, "### Result {}", idx + 1);
                let _ = writeln!(out, "{}", pretty_json(&hit.source));
            }
        }
    }
    out
}

pub fn print_outcome_text(outcome: &SearchOutcome) -> Result<()> {
    print!("{}", render_outcome_text(outcome));
    Ok(())
}

/// Render hits as an aligned table of id, score, and the name and
/// address columns.
pub fn render_outcome_table(outcome: &SearchOutcome, name_field: &str, address_field: &str) -> String {
    let SearchOutcome::Hits { hits, .. } = outcome else {
        return render_outcome_text(outcome);
    };
    if hits.is_empty() {
        return render_outcome_text(outcome);
    }

    let rows: Vec<[String; 4]> = hits
        .iter()
        .map(|hit| {
            [
                hit.id.clone(),
                hit.score.map(|s| format!("{s:.3}")).unwrap_or_default(),
                truncate(&field_text(hit, name_field), 40),
                truncate(&field_text(hit, address_field), 60),
            ]
        })
        .collect();

    let headers = ["ID", "SCORE", "NAME", "ADDRESS"];
    let mut widths = headers.map(|h| h.chars().count());
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &headers.map(str::to_string), &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

pub fn print_outcome_table(outcome: &SearchOutcome, name_field: &str, address_field: &str) -> Result<()> {
    print!("{}", render_outcome_table(outcome, name_field, address_field));
    Ok(())
}

fn push_row(out: &mut String, cells: &[String; 4], widths: &[usize; 4]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let pad = width.saturating_sub(cell.chars().count());
            format!("{cell}{}", " ".repeat(pad))
        })
        .collect::<Vec<_>>()
        .join("  ");
    let _ = writeln!(out, "{}", line.trim_end());
}

fn field_text(hit: &Hit, field: &str) -> String {
    match hit.source.get(field) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Render a `LoadSummary` in human-readable text form.
pub fn render_load_summary_text(summary: &LoadSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "engine       : {}", summary.engine);
    let _ = writeln!(out, "collection   : {}", summary.collection);
    if let Some(started) = &summary.started_at {
        let _ = writeln!(out, "started_at   : {started}");
    }
    let _ = writeln!(out, "succeeded    : {}", summary.succeeded);
    let _ = writeln!(out, "failed       : {}", summary.failed);
    let _ = writeln!(out, "batches      : {}", summary.batches);
    let _ = writeln!(out, "elapsed      : {:.2}s", summary.elapsed_secs);
    match summary.verified_count {
        Some(count) => {
            let _ = writeln!(out, "stored       : {count}");
        }
        None => {
            let _ = writeln!(out, "stored       : unknown");
        }
    }
    out
}

pub fn print_load_summary_text(summary: &LoadSummary) -> Result<()> {
    print!("{}", render_load_summary_text(summary));
    Ok(())
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    serde_json::to_writer(std::io::stdout(), value)?;
    println!();
    Ok(())
}

fn pretty_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

fn truncate(s: &str, max_width: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_width {
        s.to_string()
    } else if max_width <= 1 {
        "…".to_string()
    } else {
        s.chars()
            .take(max_width.saturating_sub(1))
            .collect::<String>()
            + "…"
    }
}
