//! # Portfolio RAG Core
//!
//! Pure retrieval logic for Portfolio RAG: data models, per-source transform
//! rules with PII masking, chunking, the nearest-neighbour index, the
//! persisted vector store, weight-aware ranking, and query orchestration.
//!
//! This crate performs no network or filesystem I/O. Embedding providers,
//! answer generators, and on-disk storage are plugged in through the
//! [`embedding::EmbeddingProvider`], [`query::AnswerGenerator`], and
//! [`store::IndexStorage`] traits by the `portfolio-rag` app crate.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod query;
pub mod ranking;
pub mod store;
pub mod transform;
pub mod vectorstore;

pub use error::{StoreError, StoreResult};
pub use models::{DocumentChunk, DocumentMetadata, SearchHit};
pub use query::{QueryRequest, QueryResponse, QueryService};
pub use vectorstore::{IndexStats, VectorStore};
