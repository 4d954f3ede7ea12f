//! Server-rendered search form and result page.

use std::fmt::Write as _;

use crate::models::{EngineKind, MatchMode, SearchOutcome, SearchRequest};

const STYLE: &str = r#"
        body { font-family: system-ui, sans-serif; margin: 2rem auto; max-width: 960px; color: #222; }
        form { display: flex; flex-wrap: wrap; gap: 0.75rem; align-items: end; margin-bottom: 1.5rem; }
        label { display: flex; flex-direction: column; font-size: 0.9rem; gap: 0.25rem; }
        input[type=text] { padding: 0.4rem; min-width: 18rem; }
        .banner { padding: 0.6rem 0.8rem; border-radius: 4px; margin-bottom: 0.5rem; }
        .banner.ok { background: #e7f6e7; }
        .banner.info { background: #eef3fb; }
        .banner.error { background: #fbeaea; }
        .elapsed { color: #666; font-size: 0.85rem; }
        .target { color: #444; margin-top: -0.5rem; }
        .logic { background: #f4f4f8; border-left: 3px solid #99a; padding: 0.5rem 1rem; margin-bottom: 1.5rem; font-size: 0.9rem; }
        pre { background: #f6f6f6; padding: 0.75rem; overflow-x: auto; }
"#;

/// What the server searches, shown above the form.
#[derive(Debug, Clone, Copy)]
pub struct PageTarget<'a> {
    pub engine: EngineKind,
    pub collection: &'a str,
    pub fuzziness: u8,
}

/// Render the form page, with results below it when `outcome` is set.
pub fn render_page(
    target: &PageTarget<'_>,
    request: &SearchRequest,
    outcome: Option<&SearchOutcome>,
) -> String {
    let name = escape_html(request.name.as_deref().unwrap_or_default());
    let address = escape_html(request.address.as_deref().unwrap_or_default());
    let (permutation_selected, fuzzy_selected) = match request.mode {
        MatchMode::Permutation => (" selected", ""),
        MatchMode::Fuzzy => ("", " selected"),
    };

    let engine = target.engine.display_name();
    let collection = escape_html(target.collection);
    let fuzziness = target.fuzziness;

    let mut body = String::new();
    if let Some(outcome) = outcome {
        render_outcome(&mut body, outcome);
    }

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Record search</title>
    <style>{STYLE}</style>
</head>
<body>
    <h1>Record search</h1>
    <p class="target">Searching {engine} collection <strong>{collection}</strong></p>
    <div class="logic">
        <strong>Search logic</strong>
        <ul>
            <li><b>Name</b>: a multi-word name matches every word order, so JOHN DOE also finds DOE JOHN.</li>
            <li><b>Address</b>: several words must appear as an exact phrase; a single word matches as a term.</li>
            <li><b>Fuzzy</b>: each word tolerates up to {fuzziness} typos; with two or more words all of them must match.</li>
            <li><b>Name and address</b>: documents must match both.</li>
        </ul>
    </div>
    <form method="get" action="/search">
        <label>Name <input type="text" name="name" value="{name}" autofocus></label>
        <label>Address <input type="text" name="address" value="{address}"></label>
        <label>Match
            <select name="mode">
                <option value="permutation"{permutation_selected}>Word permutations</option>
                <option value="fuzzy"{fuzzy_selected}>Fuzzy</option>
            </select>
        </label>
        <button type="submit">Search</button>
    </form>
{body}</body>
</html>
"#
    )
}

fn render_outcome(out: &mut String, outcome: &SearchOutcome) {
    match outcome {
        SearchOutcome::NoQuery => {
            let _ = writeln!(
                out,
                r#"    <div class="banner info">Please enter at least a name or an address.</div>"#
            );
        }
        SearchOutcome::Error { message, details } => {
            let _ = writeln!(
                out,
                r#"    <div class="banner error">Search error: {}</div>"#,
                escape_html(message)
            );
            if let Some(details) = details {
                let pretty = serde_json::to_string_pretty(details).unwrap_or_default();
                let _ = writeln!(out, "    <pre>{}</pre>", escape_html(&pretty));
            }
        }
        SearchOutcome::Hits { hits, elapsed_ms } => {
            if hits.is_empty() {
                let _ = writeln!(
                    out,
                    r#"    <div class="banner info">No matching documents found.</div>"#
                );
            } else {
                let _ = writeln!(
                    out,
                    r#"    <div class="banner ok">Found {} matching document(s)</div>"#,
                    hits.len()
                );
            }
            let _ = writeln!(
                out,
                r#"    <p class="elapsed">Search completed in {:.3} seconds</p>"#,
                *elapsed_ms as f64 / 1000.0
            );
            for (idx, hit) in hits.iter().enumerate() {
                let pretty = serde_json::to_string_pretty(&hit.source).unwrap_or_default();
                let _ = writeln!(out, "    <h3>Result {}</h3>", idx + 1);
                let _ = writeln!(out, "    <pre>{}</pre>", escape_html(&pretty));
            }
        }
    }
}

pub(crate) fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
