//! On-disk [`IndexStorage`]: `<prefix>.index` and `<prefix>.docs`.
//!
//! Saves never overwrite the previous artifacts in place. Both files are
//! first written in full to temporary files in the target directory and
//! flushed, then renamed over the old ones (documents first, index last).
//! The previous documents file is staged as well; if the index rename
//! fails, it is renamed back so the old pair still loads. The index header
//! carries a checksum of the documents file, so a pair torn by a crash
//! between the two renames is reported as corrupt on the next load.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use portfolio_rag_core::error::StoreError;
use portfolio_rag_core::store::{IndexStorage, Snapshot};

pub const INDEX_EXTENSION: &str = "index";
pub const DOCS_EXTENSION: &str = "docs";

pub struct FileStorage {
    index_path: PathBuf,
    docs_path: PathBuf,
}

impl FileStorage {
    /// Storage for the artifact pair sharing `prefix`.
    pub fn new(prefix: &Path) -> Self {
        Self {
            index_path: with_suffix(prefix, INDEX_EXTENSION),
            docs_path: with_suffix(prefix, DOCS_EXTENSION),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn docs_path(&self) -> &Path {
        &self.docs_path
    }

    /// Whether either artifact exists.
    pub fn exists(&self) -> bool {
        self.index_path.exists() || self.docs_path.exists()
    }
}

/// `prefix` with `.<ext>` appended to its file name (not replacing any
/// existing extension).
fn with_suffix(prefix: &Path, ext: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

fn stage(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let dir = parent_dir(path);
    let mut tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(data)
        .with_context(|| format!("Failed to write staged {}", path.display()))?;
    tmp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync staged {}", path.display()))?;
    Ok(tmp)
}

impl IndexStorage for FileStorage {
    fn load(&self) -> Result<Option<Snapshot>> {
        match (self.index_path.exists(), self.docs_path.exists()) {
            (false, false) => Ok(None),
            (true, true) => {
                let index = fs::read(&self.index_path)
                    .with_context(|| format!("Failed to read {}", self.index_path.display()))?;
                let documents = fs::read(&self.docs_path)
                    .with_context(|| format!("Failed to read {}", self.docs_path.display()))?;
                Ok(Some(Snapshot { index, documents }))
            }
            (true, false) => Err(half_pair(&self.index_path, &self.docs_path)),
            (false, true) => Err(half_pair(&self.docs_path, &self.index_path)),
        }
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = parent_dir(&self.index_path);
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        let docs_tmp = stage(&self.docs_path, &snapshot.documents)?;
        let index_tmp = stage(&self.index_path, &snapshot.index)?;
        let previous_docs = if self.docs_path.exists() {
            let bytes = fs::read(&self.docs_path)
                .with_context(|| format!("Failed to read {}", self.docs_path.display()))?;
            Some(stage(&self.docs_path, &bytes)?)
        } else {
            None
        };

        docs_tmp
            .persist(&self.docs_path)
            .with_context(|| format!("Failed to replace {}", self.docs_path.display()))?;
        if let Err(e) = index_tmp.persist(&self.index_path) {
            let err = anyhow::Error::new(e.error)
                .context(format!("Failed to replace {}", self.index_path.display()));
            return Err(self.restore_docs(previous_docs, err));
        }

        debug!(
            index = %self.index_path.display(),
            index_bytes = snapshot.index.len(),
            docs_bytes = snapshot.documents.len(),
            "saved index artifacts"
        );
        Ok(())
    }

    fn describe(&self) -> String {
        self.index_path.display().to_string()
    }
}

impl FileStorage {
    /// Put the previous documents file back after a failed index rename.
    fn restore_docs(
        &self,
        previous: Option<NamedTempFile>,
        err: anyhow::Error,
    ) -> anyhow::Error {
        let restored = match previous {
            Some(tmp) => tmp.persist(&self.docs_path).map(|_| ()).map_err(|e| e.error),
            None => match fs::remove_file(&self.docs_path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
                _ => Ok(()),
            },
        };
        match restored {
            Ok(()) => {
                warn!(
                    docs = %self.docs_path.display(),
                    "index save failed, previous documents restored"
                );
                err
            }
            Err(restore_err) => err.context(format!(
                "also failed to restore {}: {}",
                self.docs_path.display(),
                restore_err
            )),
        }
    }
}

fn half_pair(present: &Path, missing: &Path) -> anyhow::Error {
    StoreError::Corrupt(format!(
        "{} exists but {} is missing",
        present.display(),
        missing.display()
    ))
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snap(tag: u8) -> Snapshot {
        Snapshot {
            index: vec![tag; 4],
            documents: vec![tag; 8],
        }
    }

    #[test]
    fn paths_append_extension() {
        let storage = FileStorage::new(Path::new("data/portfolio.v2"));
        assert_eq!(storage.index_path(), Path::new("data/portfolio.v2.index"));
        assert_eq!(storage.docs_path(), Path::new("data/portfolio.v2.docs"));
    }

    #[test]
    fn missing_pair_loads_none() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::new(&tmp.path().join("idx"));
        assert!(!storage.exists());
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn save_creates_dirs_and_round_trips() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::new(&tmp.path().join("nested/dir/idx"));
        storage.save(&snap(1)).unwrap();
        assert_eq!(storage.load().unwrap(), Some(snap(1)));
        storage.save(&snap(2)).unwrap();
        assert_eq!(storage.load().unwrap(), Some(snap(2)));
    }

    #[test]
    fn save_leaves_no_temp_files() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::new(&tmp.path().join("idx"));
        storage.save(&snap(3)).unwrap();
        let mut names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["idx.docs", "idx.index"]);
    }

    #[test]
    fn half_pair_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::new(&tmp.path().join("idx"));
        storage.save(&snap(1)).unwrap();
        fs::remove_file(storage.docs_path()).unwrap();
        let err = storage.load().unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::Corrupt(_))
        ));
    }

    /// A directory squatting on the index path makes the index rename fail
    /// after the documents rename has already happened.
    fn block_index_rename(storage: &FileStorage) {
        fs::remove_file(storage.index_path()).unwrap();
        fs::create_dir(storage.index_path()).unwrap();
        fs::write(storage.index_path().join("keep"), b"x").unwrap();
    }

    #[test]
    fn failed_index_rename_restores_previous_docs() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::new(&tmp.path().join("idx"));
        storage.save(&snap(1)).unwrap();
        block_index_rename(&storage);

        let err = storage.save(&snap(2)).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to replace"));
        assert_eq!(fs::read(storage.docs_path()).unwrap(), snap(1).documents);

        let mut names: Vec<String> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["idx.docs", "idx.index"]);
    }

    #[test]
    fn failed_first_save_leaves_no_docs() {
        let tmp = TempDir::new().unwrap();
        let storage = FileStorage::new(&tmp.path().join("idx"));
        fs::create_dir(storage.index_path()).unwrap();
        fs::write(storage.index_path().join("keep"), b"x").unwrap();

        assert!(storage.save(&snap(1)).is_err());
        assert!(!storage.docs_path().exists());
    }
}
