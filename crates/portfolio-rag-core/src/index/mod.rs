//! Nearest-neighbour index abstraction.
//!
//! The [`VectorStore`](crate::vectorstore::VectorStore) only needs
//! "add vectors / search vectors / count" from its index, so that is all
//! [`NearestNeighborIndex`] exposes. Positions are dense: the `i`-th vector
//! ever added has id `i`, which is what keeps the index in lock-step with the
//! store's document list.
//!
//! [`FlatIndex`] is the only implementation: exact inner-product search over
//! every stored vector.

pub mod flat;

pub use flat::FlatIndex;

use crate::error::StoreResult;

/// One search result from the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the vector in insertion order.
    pub id: usize,
    /// Inner product with the query.
    pub score: f32,
}

/// Inner-product nearest-neighbour index over fixed-length `f32` vectors.
pub trait NearestNeighborIndex: Send + Sync {
    /// Create an empty index for `dims`-dimensional vectors.
    fn empty(dims: usize) -> Self
    where
        Self: Sized;

    /// Rebuild an index from bytes produced by [`to_bytes`](Self::to_bytes).
    fn from_bytes(bytes: &[u8]) -> StoreResult<Self>
    where
        Self: Sized;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Number of stored vectors.
    fn count(&self) -> usize;

    /// Append vectors. Either every vector is added or none is.
    fn add(&mut self, vectors: &[Vec<f32>]) -> StoreResult<()>;

    /// Up to `k` neighbours of `query`, highest score first.
    fn search(&self, query: &[f32], k: usize) -> StoreResult<Vec<Neighbor>>;

    /// Drop every vector at position `len` and beyond.
    fn truncate(&mut self, len: usize);

    /// Serialize the whole index.
    fn to_bytes(&self) -> Vec<u8>;
}
