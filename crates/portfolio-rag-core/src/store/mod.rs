//! Persistence abstraction for the vector store.
//!
//! The store persists two co-located artifacts: the serialized
//! nearest-neighbour index and the serialized document sequence. The
//! [`IndexStorage`] trait moves both as one [`Snapshot`] so they are always
//! written together and read together.
//!
//! Implementations:
//!
//! | Type | Where | Purpose |
//! |------|-------|---------|
//! | [`MemoryStorage`](memory::MemoryStorage) | this crate | tests, ephemeral stores |
//! | `FileStorage` | `portfolio-rag` app crate | `<prefix>.index` + `<prefix>.docs` on disk |
//!
//! Persistence is synchronous: a save returns only once both artifacts are
//! durable (or have failed without touching the previous ones).

pub mod memory;

use anyhow::Result;

/// Both persisted artifacts, as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    /// Serialized index, including the header written by the vector store.
    pub index: Vec<u8>,
    /// Serialized document sequence.
    pub documents: Vec<u8>,
}

/// Backend that stores and retrieves [`Snapshot`]s.
pub trait IndexStorage: Send + Sync {
    /// Load the last saved snapshot, or `None` if nothing was ever saved.
    ///
    /// A half-present snapshot (one artifact without the other) is an error.
    fn load(&self) -> Result<Option<Snapshot>>;

    /// Replace the stored snapshot.
    ///
    /// On failure the previously stored snapshot must still be loadable.
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Human-readable location, used in log lines.
    fn describe(&self) -> String;
}

impl<T: IndexStorage + ?Sized> IndexStorage for std::sync::Arc<T> {
    fn load(&self) -> Result<Option<Snapshot>> {
        (**self).load()
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        (**self).save(snapshot)
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
