//! End-to-end pipeline tests against the library API: ingest, persist,
//! reopen, rank, and answer without spawning the binary.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;

use portfolio_rag::config::{load_config, Config};
use portfolio_rag::context::AppContext;
use portfolio_rag::embedding::HashProvider;
use portfolio_rag::ingest::{add_file, run_ingest};
use portfolio_rag::progress::NoProgress;
use portfolio_rag::storage::FileStorage;
use portfolio_rag_core::query::{AnswerGenerator, QueryRequest};
use portfolio_rag_core::store::memory::MemoryStorage;
use portfolio_rag_core::StoreError;

/// Returns a canned answer and records the prompts it was given.
#[derive(Default)]
struct CannedGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl AnswerGenerator for CannedGenerator {
    async fn generate(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user_prompt.to_string());
        Ok("  Led the Kubernetes migration.\n".to_string())
    }
}

fn write_config(root: &Path) -> Config {
    let sources = root.join("sources");
    fs::create_dir_all(sources.join("hr")).unwrap();
    fs::create_dir_all(sources.join("github")).unwrap();
    fs::write(
        sources.join("hr/review.md"),
        "Led the Kubernetes migration for payments. Email: sam@example.com",
    )
    .unwrap();
    fs::write(
        sources.join("github/repo.md"),
        "Led the Kubernetes migration for payments. Email: sam@example.com",
    )
    .unwrap();
    fs::write(sources.join("hr/notes.txt"), "Enjoys sourdough baking.").unwrap();

    let config_path = root.join("prag.toml");
    fs::write(
        &config_path,
        format!(
            r#"[index]
path = "{root}/data/portfolio"

[embedding]
provider = "hash"

[retrieval]
threshold = 0.1

[sources.hr]
classification = "CONFIDENTIAL"
weight = 1.0
pii_mask = true

[sources.github]
classification = "PUBLIC"
weight = 0.5
pii_mask = false

[ingest]
root = "{root}/sources"
sources = ["hr", "github"]
"#,
            root = root.display()
        ),
    )
    .unwrap();
    load_config(&config_path).unwrap()
}

fn file_context(config: Config, generator: Arc<dyn AnswerGenerator>) -> AppContext {
    let storage = Box::new(FileStorage::new(&config.index.path));
    AppContext::with_parts(config, Arc::new(HashProvider::new(256)), storage, generator).unwrap()
}

#[tokio::test]
async fn weighted_search_prefers_trusted_source() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    let ctx = file_context(config, Arc::new(CannedGenerator::default()));

    let reports = run_ingest(&ctx, None, false, &NoProgress).await.unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.error.is_none()));

    let hits = ctx.weighted_search("kubernetes migration", 5, 0.1).await.unwrap();
    assert!(hits.len() >= 2);
    assert_eq!(hits[0].metadata.source_system, "hr");
    assert_eq!(hits[0].metadata.classification, "CONFIDENTIAL");

    let github = hits
        .iter()
        .find(|h| h.metadata.source_system == "github")
        .unwrap();
    let weighted = github.weighted_score.unwrap();
    assert!((weighted - github.score * 0.5).abs() < 1e-5);
}

#[tokio::test]
async fn masking_follows_source_rule() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    let ctx = file_context(config, Arc::new(CannedGenerator::default()));
    run_ingest(&ctx, None, false, &NoProgress).await.unwrap();

    let hits = ctx.similarity_search("kubernetes migration", 5, 0.1).await.unwrap();
    let hr = hits.iter().find(|h| h.metadata.source_system == "hr").unwrap();
    let github = hits
        .iter()
        .find(|h| h.metadata.source_system == "github")
        .unwrap();

    assert!(hr.content.contains("[EMAIL_MASKED]"));
    assert!(hr.metadata.pii_masked);
    assert!(github.content.contains("sam@example.com"));
    assert!(!github.metadata.pii_masked);
}

#[tokio::test]
async fn reopened_store_returns_identical_results() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());

    let before = {
        let ctx = file_context(config.clone(), Arc::new(CannedGenerator::default()));
        run_ingest(&ctx, None, false, &NoProgress).await.unwrap();
        ctx.weighted_search("kubernetes payments", 5, 0.0).await.unwrap()
    };
    assert!(!before.is_empty());

    let ctx = file_context(config, Arc::new(CannedGenerator::default()));
    let after = ctx.weighted_search("kubernetes payments", 5, 0.0).await.unwrap();
    assert_eq!(before, after);

    let stats = ctx.stats().await;
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.index_size, 3);
    assert_eq!(stats.source_breakdown.get("hr"), Some(&2));
}

#[tokio::test]
async fn query_returns_trimmed_answer_and_citations() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    let generator = Arc::new(CannedGenerator::default());
    let ctx = file_context(config, generator.clone());
    run_ingest(&ctx, None, false, &NoProgress).await.unwrap();

    let response = ctx
        .query(&QueryRequest {
            query: "Who led the Kubernetes migration?".to_string(),
            top_k: 2,
            threshold: 0.1,
        })
        .await
        .unwrap();

    assert_eq!(response.answer, "Led the Kubernetes migration.");
    assert_eq!(response.citations.len(), 2);
    assert_eq!(response.citations[0].source_system, "hr");

    let prompts = generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Who led the Kubernetes migration?"));
    assert!(prompts[0].contains("[EMAIL_MASKED]"));
}

#[tokio::test]
async fn query_without_matches_skips_generator() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    let generator = Arc::new(CannedGenerator::default());
    let ctx = file_context(config, generator.clone());

    let response = ctx.query(&QueryRequest::new("anything")).await.unwrap();
    assert!(response.citations.is_empty());
    assert_eq!(
        response.answer,
        portfolio_rag_core::query::NO_RESULTS_ANSWER
    );
    assert!(generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failed_persist_keeps_store_unchanged() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    let storage = Arc::new(MemoryStorage::new());
    let ctx = AppContext::with_parts(
        config,
        Arc::new(HashProvider::new(256)),
        Box::new(storage.clone()),
        Arc::new(CannedGenerator::default()),
    )
    .unwrap();

    storage.set_fail_saves(true);
    let reports = run_ingest(&ctx, Some("hr"), false, &NoProgress).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].error.is_some());
    assert_eq!(reports[0].chunks, 0);
    assert_eq!(ctx.stats().await.total_documents, 0);
    assert!(storage.snapshot().is_none());

    storage.set_fail_saves(false);
    let reports = run_ingest(&ctx, Some("hr"), false, &NoProgress).await.unwrap();
    assert!(reports[0].error.is_none());
    assert_eq!(ctx.stats().await.total_documents, 2);
}

#[tokio::test]
async fn corrupt_artifacts_fail_to_open() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    {
        let ctx = file_context(config.clone(), Arc::new(CannedGenerator::default()));
        run_ingest(&ctx, None, false, &NoProgress).await.unwrap();
    }

    let storage = FileStorage::new(&config.index.path);
    let mut bytes = fs::read(storage.index_path()).unwrap();
    let last = bytes.len() - 1;
    bytes.truncate(last);
    fs::write(storage.index_path(), bytes).unwrap();

    let result = AppContext::with_parts(
        config,
        Arc::new(HashProvider::new(256)),
        Box::new(storage),
        Arc::new(CannedGenerator::default()),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn mismatched_docs_artifact_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    {
        let ctx = file_context(config.clone(), Arc::new(CannedGenerator::default()));
        run_ingest(&ctx, None, false, &NoProgress).await.unwrap();
    }

    let storage = FileStorage::new(&config.index.path);
    let docs = fs::read_to_string(storage.docs_path()).unwrap();
    fs::write(storage.docs_path(), docs.replace("payments", "PAYMENTS")).unwrap();

    let result = AppContext::with_parts(
        config,
        Arc::new(HashProvider::new(256)),
        Box::new(storage),
        Arc::new(CannedGenerator::default()),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn unreadable_file_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    fs::write(tmp.path().join("sources/hr/binary.txt"), [0xc3, 0x28, 0xff]).unwrap();
    let ctx = file_context(config, Arc::new(CannedGenerator::default()));

    let reports = run_ingest(&ctx, Some("hr"), false, &NoProgress).await.unwrap();
    assert_eq!(reports[0].files, 2);
    assert_eq!(reports[0].skipped, 1);
    assert_eq!(reports[0].chunks, 2);
}

#[tokio::test]
async fn add_file_uses_file_name_as_path() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    let ctx = file_context(config, Arc::new(CannedGenerator::default()));

    let file = tmp.path().join("resume.md");
    fs::write(&file, "Principal engineer focused on observability tooling.").unwrap();
    let added = add_file(&ctx, &file, "upload").await.unwrap();
    assert_eq!(added, 1);

    let hits = ctx.similarity_search("observability tooling", 1, 0.1).await.unwrap();
    assert_eq!(hits[0].metadata.file_path, "resume.md#chunk_0");
    assert_eq!(hits[0].metadata.classification, "PUBLIC");

    let empty = tmp.path().join("empty.md");
    fs::write(&empty, "").unwrap();
    assert!(add_file(&ctx, &empty, "upload").await.is_err());
}

#[tokio::test]
async fn failed_index_write_keeps_previous_pair_loadable() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    let storage = FileStorage::new(&config.index.path);
    {
        let ctx = file_context(config.clone(), Arc::new(CannedGenerator::default()));
        run_ingest(&ctx, Some("hr"), false, &NoProgress).await.unwrap();

        // Swap the index file for a directory so only the index rename fails.
        let saved_index = fs::read(storage.index_path()).unwrap();
        fs::remove_file(storage.index_path()).unwrap();
        fs::create_dir(storage.index_path()).unwrap();
        fs::write(storage.index_path().join("keep"), b"x").unwrap();

        let file = tmp.path().join("extra.md");
        fs::write(&file, "Speaker at a distributed systems meetup.").unwrap();
        assert!(add_file(&ctx, &file, "upload").await.is_err());
        assert_eq!(ctx.stats().await.total_documents, 2);

        fs::remove_dir_all(storage.index_path()).unwrap();
        fs::write(storage.index_path(), saved_index).unwrap();
    }

    let ctx = file_context(config, Arc::new(CannedGenerator::default()));
    let stats = ctx.stats().await;
    assert_eq!(stats.total_documents, 2);
    assert_eq!(stats.source_breakdown.get("upload"), None);
}

#[tokio::test]
async fn missing_docs_artifact_is_corrupt() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path());
    {
        let ctx = file_context(config.clone(), Arc::new(CannedGenerator::default()));
        run_ingest(&ctx, Some("hr"), false, &NoProgress).await.unwrap();
    }

    let storage = FileStorage::new(&config.index.path);
    fs::remove_file(storage.docs_path()).unwrap();

    let err = AppContext::with_parts(
        config,
        Arc::new(HashProvider::new(256)),
        Box::new(storage),
        Arc::new(CannedGenerator::default()),
    )
    .err()
    .unwrap();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::Corrupt(_))
    ));
}
