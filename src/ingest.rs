//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow: discover files → read → transform (classify and
//! mask) → chunk → embed + persist. Each directory source and the GitHub
//! source become one `add_documents` batch, so a source is either fully
//! stored or not at all. Individual files that cannot be read are logged
//! and skipped; they never fail the batch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{info, warn};
use walkdir::WalkDir;

use portfolio_rag_core::chunk::chunk_document;
use portfolio_rag_core::models::DocumentChunk;

use crate::context::AppContext;
use crate::github::{profile_documents, GithubClient, GITHUB_SOURCE};
use crate::progress::{IngestProgressEvent, IngestProgressReporter};

/// Source system tag used by `prag add` when none is given.
pub const UPLOAD_SOURCE: &str = "upload";

/// Outcome of ingesting one source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceReport {
    pub source: String,
    pub files: usize,
    pub skipped: usize,
    pub chunks: usize,
    /// Set when the batch could not be stored; nothing from it was kept.
    pub error: Option<String>,
}

/// Ingest every configured directory source (or just `only`), then GitHub
/// when enabled and `include_github` is set.
pub async fn run_ingest(
    ctx: &AppContext,
    only: Option<&str>,
    include_github: bool,
    progress: &dyn IngestProgressReporter,
) -> Result<Vec<SourceReport>> {
    let ingest = &ctx.config().ingest;
    let mut reports = Vec::new();

    if let Some(name) = only {
        if name != GITHUB_SOURCE && !ingest.sources.iter().any(|s| s == name) {
            bail!(
                "Unknown source: '{}'. Configured: {}",
                name,
                ingest.sources.join(", ")
            );
        }
    }

    let include_set = build_globset(&ingest.include_globs)?;

    for source in &ingest.sources {
        if only.is_some_and(|name| name != source) {
            continue;
        }
        let dir = ingest.root.join(source);
        if !dir.is_dir() {
            warn!(source = %source, dir = %dir.display(), "source directory missing, skipping");
            continue;
        }
        let report = ingest_directory(ctx, source, &dir, &ingest.root, &include_set, progress).await;
        reports.push(report);
    }

    let wants_github = only.map_or(true, |name| name == GITHUB_SOURCE);
    if include_github && wants_github && ctx.config().github.enabled {
        if let Some(report) = ingest_github(ctx, progress).await {
            reports.push(report);
        }
    }

    Ok(reports)
}

async fn ingest_directory(
    ctx: &AppContext,
    source: &str,
    dir: &Path,
    root: &Path,
    include_set: &GlobSet,
    progress: &dyn IngestProgressReporter,
) -> SourceReport {
    progress.report(IngestProgressEvent::Discovering {
        source: source.to_string(),
    });

    let mut report = SourceReport {
        source: source.to_string(),
        ..SourceReport::default()
    };

    let files = discover_files(dir, include_set);
    let total = files.len() as u64;
    let mut chunks = Vec::new();

    for (i, path) in files.iter().enumerate() {
        let file_path = path
            .strip_prefix(root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        match read_and_chunk(ctx, path, source, &file_path) {
            Ok(file_chunks) => {
                report.files += 1;
                chunks.extend(file_chunks);
            }
            Err(e) => {
                warn!(file = %path.display(), error = %format!("{:#}", e), "skipping file");
                report.skipped += 1;
            }
        }
        progress.report(IngestProgressEvent::Ingesting {
            source: source.to_string(),
            n: i as u64 + 1,
            total,
        });
    }

    store_batch(ctx, &mut report, chunks, progress).await;
    report
}

async fn ingest_github(
    ctx: &AppContext,
    progress: &dyn IngestProgressReporter,
) -> Option<SourceReport> {
    let client = match GithubClient::new(&ctx.config().github) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "GitHub ingestion skipped");
            return None;
        }
    };

    progress.report(IngestProgressEvent::Discovering {
        source: GITHUB_SOURCE.to_string(),
    });

    let profile = match client.fetch_profile().await {
        Ok(profile) => profile,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "failed to fetch GitHub data, skipping");
            return None;
        }
    };

    let mut report = SourceReport {
        source: GITHUB_SOURCE.to_string(),
        ..SourceReport::default()
    };

    let mut chunks = Vec::new();
    for (path, content) in profile_documents(&profile) {
        report.files += 1;
        chunks.extend(chunk_document(
            ctx.rules(),
            ctx.splitter(),
            &content,
            GITHUB_SOURCE,
            &path,
        ));
    }

    store_batch(ctx, &mut report, chunks, progress).await;
    Some(report)
}

async fn store_batch(
    ctx: &AppContext,
    report: &mut SourceReport,
    chunks: Vec<DocumentChunk>,
    progress: &dyn IngestProgressReporter,
) {
    if chunks.is_empty() {
        return;
    }
    match ctx.add_documents(chunks).await {
        Ok(added) => {
            report.chunks = added;
            info!(source = %report.source, chunks = added, "stored source batch");
            progress.report(IngestProgressEvent::Stored {
                source: report.source.clone(),
                chunks: added as u64,
            });
        }
        Err(e) => {
            warn!(source = %report.source, error = %format!("{:#}", e), "failed to store batch");
            report.error = Some(format!("{:#}", e));
        }
    }
}

/// Ingest a single file under `source`. The file name becomes the path.
pub async fn add_file(ctx: &AppContext, path: &Path, source: &str) -> Result<usize> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    let chunks = read_and_chunk(ctx, path, source, &file_name)?;
    if chunks.is_empty() {
        bail!("{} produced no content to index", path.display());
    }
    ctx.add_documents(chunks).await
}

fn read_and_chunk(
    ctx: &AppContext,
    path: &Path,
    source: &str,
    file_path: &str,
) -> Result<Vec<DocumentChunk>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))?;
    Ok(chunk_document(
        ctx.rules(),
        ctx.splitter(),
        &content,
        source,
        file_path,
    ))
}

/// Files under `dir` whose path relative to `dir` matches `include_set`,
/// sorted for deterministic ordering.
pub fn discover_files(dir: &Path, include_set: &GlobSet) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if include_set.is_match(relative) {
            files.push(path.to_path_buf());
        }
    }
    files.sort();
    files
}

pub fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn default_globs() -> GlobSet {
        build_globset(&[
            "**/*.txt".to_string(),
            "**/*.md".to_string(),
            "**/*.json".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn discover_filters_by_extension_and_recurses() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path();
        fs::create_dir_all(dir.join("nested/deeper")).unwrap();
        fs::write(dir.join("a.md"), "a").unwrap();
        fs::write(dir.join("b.pdf"), "b").unwrap();
        fs::write(dir.join("nested/c.txt"), "c").unwrap();
        fs::write(dir.join("nested/deeper/d.json"), "{}").unwrap();

        let files = discover_files(dir, &default_globs());
        let rel: Vec<String> = files
            .iter()
            .map(|p| p.strip_prefix(dir).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(rel, vec!["a.md", "nested/c.txt", "nested/deeper/d.json"]);
    }

    #[test]
    fn invalid_glob_is_an_error() {
        assert!(build_globset(&["[".to_string()]).is_err());
    }
}
