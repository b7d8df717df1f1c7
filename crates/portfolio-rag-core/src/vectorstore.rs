//! The document store: chunks, their vectors, and the persisted index.
//!
//! [`VectorStore`] owns an ordered list of [`DocumentChunk`]s and a
//! [`NearestNeighborIndex`] whose ids are positions in that list. The two
//! always have the same length once a call returns.
//!
//! # Lifecycle
//!
//! 1. [`VectorStore::open`] loads the last [`Snapshot`] from its
//!    [`IndexStorage`], or starts empty when nothing was saved yet.
//! 2. [`VectorStore::add_documents`] embeds, normalizes, appends, and saves
//!    synchronously. If the save fails the append is rolled back, so memory
//!    and storage never disagree.
//! 3. [`VectorStore::similarity_search`] and
//!    [`VectorStore::weighted_search`] are read-only (`&self`); ingestion
//!    needs `&mut self`, so the borrow checker keeps searches and writes
//!    apart.
//!
//! # Index artifact layout
//!
//! ```text
//! 8 bytes   magic "PRAGIDX1"
//! u32 LE    format version
//! 32 bytes  SHA-256 of the documents artifact
//! ...       index payload (see FlatIndex)
//! ```
//!
//! The documents artifact is JSON. The checksum ties the pair together:
//! an index paired with a documents file from another save is rejected on
//! load.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::embedding::{embed_query, l2_normalize, EmbeddingProvider};
use crate::error::{StoreError, StoreResult};
use crate::index::{FlatIndex, NearestNeighborIndex};
use crate::models::{DocumentChunk, SearchHit};
use crate::ranking::{rank_by_weight, OVERFETCH_FACTOR};
use crate::store::{IndexStorage, Snapshot};

const MAGIC: &[u8; 8] = b"PRAGIDX1";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 32;

/// Summary counts for `prag stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_documents: usize,
    pub index_size: usize,
    pub source_breakdown: BTreeMap<String, usize>,
}

#[derive(Serialize)]
struct DocumentsOut<'a> {
    model: &'a str,
    saved_at: DateTime<Utc>,
    documents: &'a [DocumentChunk],
}

#[derive(Deserialize)]
struct DocumentsIn {
    model: String,
    #[allow(dead_code)]
    saved_at: DateTime<Utc>,
    documents: Vec<DocumentChunk>,
}

/// Persisted vector store over a nearest-neighbour index.
pub struct VectorStore<I: NearestNeighborIndex = FlatIndex> {
    embedder: Arc<dyn EmbeddingProvider>,
    storage: Box<dyn IndexStorage>,
    index: I,
    documents: Vec<DocumentChunk>,
}

impl<I: NearestNeighborIndex> VectorStore<I> {
    /// Load the store from `storage`, or create it empty.
    ///
    /// `dims` is the vector size the index must have. A persisted index of a
    /// different size is rejected rather than mixed with new vectors.
    ///
    /// # Errors
    ///
    /// [`StoreError::Load`] if the storage cannot be read. A
    /// [`StoreError`] raised by the storage itself is passed through.
    /// [`StoreError::Corrupt`] if the artifacts are malformed or do not
    /// belong together, [`StoreError::DimensionMismatch`] on a size mismatch.
    pub fn open(
        embedder: Arc<dyn EmbeddingProvider>,
        storage: Box<dyn IndexStorage>,
        dims: usize,
    ) -> StoreResult<Self> {
        let snapshot = storage.load().map_err(|e| match e.downcast::<StoreError>() {
            Ok(store_err) => store_err,
            Err(e) => StoreError::Load(e),
        })?;

        let (index, documents) = match snapshot {
            Some(snapshot) => {
                let (index, documents, model) = decode_snapshot::<I>(&snapshot)?;
                if index.dims() != dims {
                    return Err(StoreError::DimensionMismatch {
                        expected: dims,
                        actual: index.dims(),
                    });
                }
                if model != embedder.model_name() {
                    warn!(
                        saved = %model,
                        current = %embedder.model_name(),
                        "index was built with a different embedding model"
                    );
                }
                info!(
                    location = %storage.describe(),
                    documents = documents.len(),
                    "loaded vector index"
                );
                (index, documents)
            }
            None => {
                info!(location = %storage.describe(), dims, "created empty vector index");
                (I::empty(dims), Vec::new())
            }
        };

        Ok(Self {
            embedder,
            storage,
            index,
            documents,
        })
    }

    /// Embed, normalize, append, and persist a batch of chunks.
    ///
    /// Chunks that already carry an embedding are not re-embedded. Returns
    /// the number of chunks added. An empty batch is a no-op.
    ///
    /// Nothing is mutated if embedding fails. If persisting fails, the
    /// in-memory append is undone and [`StoreError::Persist`] is returned;
    /// the caller must treat the whole batch as not stored.
    pub async fn add_documents(&mut self, mut chunks: Vec<DocumentChunk>) -> StoreResult<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let missing: Vec<usize> = chunks
            .iter()
            .enumerate()
            .filter(|(_, c)| c.embedding.is_none())
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            let texts: Vec<String> = missing.iter().map(|&i| chunks[i].content.clone()).collect();
            let vectors = self
                .embedder
                .embed(&texts)
                .await
                .map_err(StoreError::Embedding)?;
            if vectors.len() != texts.len() {
                return Err(StoreError::Embedding(anyhow!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    texts.len()
                )));
            }
            for (&i, vector) in missing.iter().zip(vectors) {
                chunks[i].embedding = Some(vector);
            }
        }

        let mut matrix = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let mut vector = chunk.embedding.clone().ok_or_else(|| {
                StoreError::Embedding(anyhow!(
                    "chunk {} has no embedding",
                    chunk.metadata.file_path
                ))
            })?;
            l2_normalize(&mut vector);
            matrix.push(vector);
        }

        let previous = self.documents.len();
        self.index.add(&matrix)?;
        self.documents.extend(chunks);
        let added = self.documents.len() - previous;

        if let Err(e) = self.persist() {
            self.index.truncate(previous);
            self.documents.truncate(previous);
            warn!(error = %e, batch = added, "rolled back batch after failed save");
            return Err(e);
        }

        debug!(added, total = self.documents.len(), "added documents");
        Ok(added)
    }

    /// Up to `k` chunks whose similarity to `query` is at least `threshold`,
    /// most similar first.
    ///
    /// Returns an empty list for an empty store without calling the
    /// embedding provider.
    pub async fn similarity_search(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> StoreResult<Vec<SearchHit>> {
        if self.index.count() == 0 {
            return Ok(Vec::new());
        }

        let mut query_vec = embed_query(self.embedder.as_ref(), query)
            .await
            .map_err(StoreError::Embedding)?;
        l2_normalize(&mut query_vec);

        let neighbors = self.index.search(&query_vec, k)?;

        let hits = neighbors
            .into_iter()
            .filter(|n| n.score >= threshold)
            .filter_map(|n| {
                // Guard against index/document desync.
                self.documents.get(n.id).map(|doc| SearchHit {
                    content: doc.content.clone(),
                    metadata: doc.metadata.clone(),
                    score: n.score,
                    weighted_score: None,
                })
            })
            .collect();

        Ok(hits)
    }

    /// Similarity search over-fetched by [`OVERFETCH_FACTOR`], then re-ranked
    /// by `score * weight` and cut to `k`.
    pub async fn weighted_search(
        &self,
        query: &str,
        k: usize,
        threshold: f32,
    ) -> StoreResult<Vec<SearchHit>> {
        let raw = self
            .similarity_search(query, k.saturating_mul(OVERFETCH_FACTOR), threshold)
            .await?;
        Ok(rank_by_weight(raw, k))
    }

    /// Document counts, overall and per source system.
    pub fn stats(&self) -> IndexStats {
        let mut source_breakdown = BTreeMap::new();
        for doc in &self.documents {
            *source_breakdown
                .entry(doc.metadata.source_system.clone())
                .or_insert(0) += 1;
        }
        IndexStats {
            total_documents: self.documents.len(),
            index_size: self.index.count(),
            source_breakdown,
        }
    }

    pub fn documents(&self) -> &[DocumentChunk] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Number of vectors in the underlying index.
    pub fn index_count(&self) -> usize {
        self.index.count()
    }

    pub fn dims(&self) -> usize {
        self.index.dims()
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    /// Write the current index and documents to storage.
    pub fn persist(&self) -> StoreResult<()> {
        let snapshot = encode_snapshot(&self.index, &self.documents, self.embedder.model_name())?;
        self.storage.save(&snapshot).map_err(StoreError::Persist)
    }
}

fn encode_snapshot<I: NearestNeighborIndex>(
    index: &I,
    documents: &[DocumentChunk],
    model: &str,
) -> StoreResult<Snapshot> {
    let documents_bytes = serde_json::to_vec(&DocumentsOut {
        model,
        saved_at: Utc::now(),
        documents,
    })
    .map_err(|e| StoreError::Persist(e.into()))?;

    let payload = index.to_bytes();
    let mut index_bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    index_bytes.extend_from_slice(MAGIC);
    index_bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    index_bytes.extend_from_slice(&Sha256::digest(&documents_bytes));
    index_bytes.extend_from_slice(&payload);

    Ok(Snapshot {
        index: index_bytes,
        documents: documents_bytes,
    })
}

fn decode_snapshot<I: NearestNeighborIndex>(
    snapshot: &Snapshot,
) -> StoreResult<(I, Vec<DocumentChunk>, String)> {
    let bytes = &snapshot.index;
    if bytes.len() < HEADER_LEN || &bytes[..8] != MAGIC {
        return Err(StoreError::Corrupt(
            "index artifact has no PRAGIDX1 header".to_string(),
        ));
    }
    let version = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
    if version != FORMAT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported index format version {}",
            version
        )));
    }
    let checksum = &bytes[12..HEADER_LEN];
    if Sha256::digest(&snapshot.documents).as_slice() != checksum {
        return Err(StoreError::Corrupt(
            "documents artifact does not match the index checksum".to_string(),
        ));
    }

    let index = I::from_bytes(&bytes[HEADER_LEN..])?;
    let parsed: DocumentsIn = serde_json::from_slice(&snapshot.documents)
        .map_err(|e| StoreError::Corrupt(format!("documents artifact: {}", e)))?;

    if index.count() != parsed.documents.len() {
        return Err(StoreError::Corrupt(format!(
            "index holds {} vectors but {} documents were saved",
            index.count(),
            parsed.documents.len()
        )));
    }

    Ok((index, parsed.documents, parsed.model))
}
