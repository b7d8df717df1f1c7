//! Typed errors for the vector store.
//!
//! Callers distinguish a failed retrieval (`Err`) from an empty result
//! (`Ok(vec![])`); the variants say which stage failed.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The embedding provider failed or returned the wrong number of vectors.
    #[error("embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    /// A vector's length does not match the index dimensionality.
    #[error("embedding has {actual} dimensions but the index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Writing the index artifacts failed. Nothing from the batch was kept.
    #[error("failed to persist vector index: {0:#}")]
    Persist(anyhow::Error),

    /// Reading the index artifacts failed.
    #[error("failed to load vector index: {0:#}")]
    Load(anyhow::Error),

    /// The persisted artifacts are malformed or disagree with each other.
    #[error("persisted vector index is corrupt: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
