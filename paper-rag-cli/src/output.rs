//! Terminal and JSON rendering of command results.

use std::fmt::Write;

use paper_rag::{IndexState, SearchResult, TuningReport};
use serde::Serialize;

const SNIPPET_CHARS: usize = 200;

#[derive(Serialize)]
struct SearchOutput<'a> {
    query: &'a str,
    count: usize,
    results: &'a [SearchResult],
}

pub fn format_json(query: &str, results: &[SearchResult]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&SearchOutput { query, count: results.len(), results })
}

/// Numbered list with a shortened snippet per result.
pub fn format_human(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No results for \"{query}\".");
    }

    let mut out = format!("{} results for \"{query}\":\n", results.len());
    for (i, result) in results.iter().enumerate() {
        let _ = write!(out, "\n{:>2}. {}", i + 1, result.paper_title);
        if let Some(page) = result.page_number {
            let _ = write!(out, " (page {page})");
        }
        if let Some(distance) = result.distance {
            let _ = write!(out, " [distance {distance:.4}]");
        }
        let _ = writeln!(out, "\n    {}", snippet(&result.chunk_text, SNIPPET_CHARS));
        if let Some(path) = &result.pdf_path {
            let _ = writeln!(out, "    {path}");
        }
    }
    out
}

/// First `max` characters on one line, with an ellipsis when cut.
fn snippet(text: &str, max: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut.trim_end())
}

/// Citation list printed under a generated answer.
pub fn format_sources(sources: &[SearchResult]) -> String {
    let mut out = String::from("Sources:");
    for (i, source) in sources.iter().enumerate() {
        let _ = write!(out, "\n  [{}] {}", i + 1, source.paper_title);
        if let Some(page) = source.page_number {
            let _ = write!(out, " (p.{page})");
        }
    }
    out
}

pub fn index_state(state: IndexState) -> &'static str {
    match state {
        IndexState::Ready => "ready",
        IndexState::Invalid => "invalid (will be rebuilt on next create)",
        IndexState::Missing => "missing (searches use exact scan)",
    }
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{value:.1} {}", UNITS[unit]) }
}

/// Table of runs followed by the per-measure winners.
pub fn format_tuning_summary(report: &TuningReport) -> String {
    let mut out = format!(
        "Tuned {} metric over {} queries, Precision@{}\n\n",
        report.metric, report.sample_size, report.top_k
    );
    let _ = writeln!(
        out,
        "{:<28} {:>10} {:>10} {:>12} {:>10} {:>10}",
        "params", "build s", "size", "latency ms", "qps", "precision"
    );
    for run in &report.runs {
        let _ = writeln!(
            out,
            "{:<28} {:>10.2} {:>10} {:>12.3} {:>10.1} {:>10.3}",
            run.params.to_string(),
            run.build_time_secs,
            human_bytes(run.index_size_bytes),
            run.mean_latency_ms,
            run.queries_per_second,
            run.precision_at_k
        );
    }

    match &report.recommendation {
        Some(best) => {
            let _ = writeln!(out, "\nRecommended: {} (score {:.3})", best.params, best.score);
        }
        None => out.push_str("\nNo combination completed.\n"),
    }
    let winners = [
        ("lowest latency", report.lowest_latency),
        ("highest accuracy", report.highest_accuracy),
        ("highest throughput", report.highest_throughput),
        ("fastest build", report.fastest_build),
        ("smallest index", report.smallest_index),
    ];
    for (label, params) in winners {
        if let Some(params) = params {
            let _ = writeln!(out, "  {label:<20} {params}");
        }
    }
    out
}
