//! Application context: the one owner of the vector store.
//!
//! [`AppContext`] is built once per process from the [`Config`] and passed
//! by reference to every command. The store sits behind a
//! `tokio::sync::RwLock`, so searches and queries share a read lock while
//! ingestion takes the write lock for the whole embed-append-save step.

use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::RwLock;
use tracing::debug;

use portfolio_rag_core::chunk::TextSplitter;
use portfolio_rag_core::embedding::EmbeddingProvider;
use portfolio_rag_core::models::{DocumentChunk, SearchHit};
use portfolio_rag_core::query::{AnswerGenerator, QueryRequest, QueryResponse, QueryService};
use portfolio_rag_core::store::IndexStorage;
use portfolio_rag_core::transform::TransformRules;
use portfolio_rag_core::vectorstore::{IndexStats, VectorStore};

use crate::answer::create_generator;
use crate::config::Config;
use crate::embedding::create_provider;
use crate::storage::FileStorage;

pub struct AppContext {
    config: Config,
    rules: TransformRules,
    splitter: TextSplitter,
    store: RwLock<VectorStore>,
    query: QueryService,
}

impl AppContext {
    /// Build providers from `config` and open the on-disk store at
    /// `[index].path`.
    pub fn open(config: Config) -> Result<Self> {
        let embedder = create_provider(&config.embedding)?;
        let generator = create_generator(&config.llm)?;
        let storage = Box::new(FileStorage::new(&config.index.path));
        Self::with_parts(config, embedder, storage, generator)
    }

    /// Build a context from explicit parts.
    ///
    /// The index size is `[index].dims` when set, otherwise the embedder's.
    pub fn with_parts(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        storage: Box<dyn IndexStorage>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Result<Self> {
        let dims = resolve_dims(&config, embedder.as_ref())?;
        debug!(dims, model = %embedder.model_name(), "opening vector store");

        let store = VectorStore::open(embedder, storage, dims)?;
        let rules = TransformRules::new(config.sources.clone())?;
        let splitter = TextSplitter::new(config.chunking.chunk_size, config.chunking.chunk_overlap);

        Ok(Self {
            config,
            rules,
            splitter,
            store: RwLock::new(store),
            query: QueryService::new(generator),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn rules(&self) -> &TransformRules {
        &self.rules
    }

    pub fn splitter(&self) -> &TextSplitter {
        &self.splitter
    }

    /// Embed and persist a batch. All or nothing.
    pub async fn add_documents(&self, chunks: Vec<DocumentChunk>) -> Result<usize> {
        let mut store = self.store.write().await;
        Ok(store.add_documents(chunks).await?)
    }

    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let store = self.store.read().await;
        Ok(store.similarity_search(query, k, threshold).await?)
    }

    pub async fn weighted_search(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<SearchHit>> {
        let store = self.store.read().await;
        Ok(store.weighted_search(query, k, threshold).await?)
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let store = self.store.read().await;
        Ok(self.query.process_query(&*store, request).await?)
    }

    pub async fn stats(&self) -> IndexStats {
        self.store.read().await.stats()
    }

    /// Write the current (possibly empty) store to storage.
    pub async fn persist(&self) -> Result<()> {
        self.store.read().await.persist()?;
        Ok(())
    }
}

fn resolve_dims(config: &Config, embedder: &dyn EmbeddingProvider) -> Result<usize> {
    let dims = config.index.dims.unwrap_or_else(|| embedder.dims());
    if dims == 0 {
        bail!("index dimensions unknown: set [index].dims or configure an embedding provider");
    }
    if config.embedding.is_enabled() && embedder.dims() != dims {
        bail!(
            "index.dims ({}) does not match the {} provider's dimensions ({})",
            dims,
            config.embedding.provider,
            embedder.dims()
        );
    }
    Ok(dims)
}
