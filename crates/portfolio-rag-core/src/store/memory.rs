//! In-memory [`IndexStorage`] implementation for tests and ephemeral stores.
//!
//! Keeps the last saved [`Snapshot`] behind a `std::sync::RwLock`. A save
//! can be made to fail on demand to exercise rollback paths.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};

use super::{IndexStorage, Snapshot};

/// In-memory snapshot storage.
#[derive(Default)]
pub struct MemoryStorage {
    snapshot: RwLock<Option<Snapshot>>,
    fail_saves: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that already holds `snapshot`.
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        Self {
            snapshot: RwLock::new(Some(snapshot)),
            ..Self::default()
        }
    }

    /// Make every following [`save`](IndexStorage::save) fail (or succeed again).
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// Copy of the currently stored snapshot.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.snapshot.read().ok().and_then(|s| s.clone())
    }
}

impl IndexStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Snapshot>> {
        let guard = self
            .snapshot
            .read()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        Ok(guard.clone())
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            bail!("memory storage configured to fail saves");
        }
        let mut guard = self
            .snapshot
            .write()
            .map_err(|_| anyhow!("memory storage lock poisoned"))?;
        *guard = Some(snapshot.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
