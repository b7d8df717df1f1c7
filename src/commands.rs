//! `prag` command handlers.
//!
//! Each handler runs one CLI command against an [`AppContext`] and prints
//! its result to stdout. Diagnostics go through `tracing` to stderr.

use std::path::Path;

use anyhow::{bail, Result};

use portfolio_rag_core::models::SearchHit;
use portfolio_rag_core::query::QueryRequest;

use crate::context::AppContext;
use crate::ingest::{self, SourceReport};
use crate::progress::IngestProgressReporter;
use crate::storage::FileStorage;

/// Create the on-disk artifacts for an empty index. Idempotent.
pub async fn run_init(ctx: &AppContext) -> Result<()> {
    let storage = FileStorage::new(&ctx.config().index.path);
    if storage.exists() {
        let stats = ctx.stats().await;
        println!(
            "Index already exists at {} ({} chunks).",
            storage.index_path().display(),
            stats.total_documents
        );
        return Ok(());
    }
    ctx.persist().await?;
    println!("Index initialized at {}.", storage.index_path().display());
    Ok(())
}

pub async fn run_ingest(
    ctx: &AppContext,
    source: Option<&str>,
    include_github: bool,
    progress: &dyn IngestProgressReporter,
) -> Result<()> {
    let reports = ingest::run_ingest(ctx, source, include_github, progress).await?;
    if reports.is_empty() {
        println!("Nothing to ingest.");
        return Ok(());
    }

    for report in &reports {
        print_report(report);
    }

    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| r.error.is_some())
        .map(|r| r.source.as_str())
        .collect();
    if !failed.is_empty() {
        bail!("ingest failed for: {}", failed.join(", "));
    }
    println!("ok");
    Ok(())
}

fn print_report(report: &SourceReport) {
    println!("ingest {}", report.source);
    println!("  files: {}", report.files);
    if report.skipped > 0 {
        println!("  skipped: {}", report.skipped);
    }
    println!("  chunks written: {}", report.chunks);
    if let Some(error) = &report.error {
        println!("  error: {}", error);
    }
}

pub async fn run_add(ctx: &AppContext, file: &Path, source: &str) -> Result<()> {
    let added = ingest::add_file(ctx, file, source).await?;
    println!(
        "added {} chunks from {} (source: {})",
        added,
        file.display(),
        source
    );
    Ok(())
}

pub async fn run_search(
    ctx: &AppContext,
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f32>,
    raw: bool,
) -> Result<()> {
    let k = top_k.unwrap_or(ctx.config().retrieval.top_k);
    let threshold = threshold.unwrap_or(ctx.config().retrieval.threshold);

    let hits = if raw {
        ctx.similarity_search(query, k, threshold).await?
    } else {
        ctx.weighted_search(query, k, threshold).await?
    };

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &SearchHit) {
    println!(
        "{}. [{:.3}] {} / {}",
        rank,
        hit.effective_score(),
        hit.metadata.source_system,
        hit.metadata.file_path
    );
    println!("    classification: {}", hit.metadata.classification);
    match hit.weighted_score {
        Some(_) => println!(
            "    similarity: {:.3}  weight: {}",
            hit.score, hit.metadata.weight
        ),
        None => println!("    similarity: {:.3}", hit.score),
    }
    println!("    excerpt: \"{}\"", excerpt(&hit.content, 160));
    println!();
}

fn excerpt(content: &str, max_chars: usize) -> String {
    let flat = content.replace('\n', " ");
    let flat = flat.trim();
    match flat.char_indices().nth(max_chars) {
        Some((pos, _)) => format!("{}...", &flat[..pos]),
        None => flat.to_string(),
    }
}

pub async fn run_query(
    ctx: &AppContext,
    query: &str,
    top_k: Option<usize>,
    threshold: Option<f32>,
    json: bool,
) -> Result<()> {
    let request = QueryRequest {
        query: query.to_string(),
        top_k: top_k.unwrap_or(ctx.config().retrieval.top_k),
        threshold: threshold.unwrap_or(ctx.config().retrieval.threshold),
    };
    let response = ctx.query(&request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("{}", response.answer);
    if !response.citations.is_empty() {
        println!();
        println!("Sources:");
        for (i, citation) in response.citations.iter().enumerate() {
            println!(
                "  [{}] {} ({}, {}) score {:.3}",
                i + 1,
                citation.file_path,
                citation.source_system,
                citation.classification,
                citation.score
            );
        }
    }
    Ok(())
}

pub async fn run_stats(ctx: &AppContext) -> Result<()> {
    let stats = ctx.stats().await;
    let storage = FileStorage::new(&ctx.config().index.path);
    let size = [storage.index_path(), storage.docs_path()]
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .sum::<u64>();

    println!("Portfolio RAG: Index Stats");
    println!("==========================");
    println!();
    println!("  Index:       {}", storage.index_path().display());
    println!("  Size:        {}", format_bytes(size));
    println!("  Chunks:      {}", stats.total_documents);
    println!("  Vectors:     {}", stats.index_size);

    if !stats.source_breakdown.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<24} {:>8}", "SOURCE", "CHUNKS");
        println!("  {}", "-".repeat(33));
        for (source, count) in &stats.source_breakdown {
            println!("  {:<24} {:>8}", source, count);
        }
    }
    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}
