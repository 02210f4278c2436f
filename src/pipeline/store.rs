//! Checkpoint artifact storage.
//!
//! The pipeline only ever asks three questions of its storage — does this
//! artifact exist, load it, save it — so that is the whole trait. Today the
//! backend is a directory of dated CSV files; an object store or a database
//! row would slot in without touching pipeline logic.
//!
//! Existence of an artifact is the **sole** idempotency signal: there is no
//! manifest and no lock file. That only works if a failed stage can never
//! leave a half-written file behind, so [`DirStore::save`] writes to a
//! temporary sibling path and renames into place.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::EtlError;
use crate::table::Table;

/// Identifies one checkpoint artifact: the run (a calendar date) and the
/// stage label (`raw`, `clean`, `geo`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactKey {
    pub run_key: String,
    pub stage: String,
}

impl ArtifactKey {
    pub fn new(run_key: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            run_key: run_key.into(),
            stage: stage.into(),
        }
    }
}

/// Minimal storage capability the pipeline needs.
pub trait CheckpointStore {
    /// Whether an artifact for `key` has been persisted.
    fn exists(&self, key: &ArtifactKey) -> bool;

    /// Load a persisted artifact. Only called when `exists` returned true;
    /// an unreadable artifact is a fatal error, not a silent recompute.
    fn load(&self, key: &ArtifactKey) -> Result<Table, EtlError>;

    /// Persist a stage output. Must be atomic: either the artifact appears
    /// complete or not at all.
    fn save(&self, key: &ArtifactKey, table: &Table) -> Result<(), EtlError>;
}

/// Filesystem-backed store: one `<run_key>-<stage>.csv` per artifact inside
/// a working directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Open (creating if needed) a working directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, EtlError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| EtlError::WorkdirCreate {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Artifact file path for a key, e.g. `data/2024-03-01-clean.csv`.
    pub fn path(&self, key: &ArtifactKey) -> PathBuf {
        self.root.join(format!("{}-{}.csv", key.run_key, key.stage))
    }
}

impl CheckpointStore for DirStore {
    fn exists(&self, key: &ArtifactKey) -> bool {
        self.path(key).exists()
    }

    fn load(&self, key: &ArtifactKey) -> Result<Table, EtlError> {
        let path = self.path(key);
        debug!("Loading artifact {}", path.display());

        let file = fs::File::open(&path).map_err(|e| EtlError::ArtifactRead {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        Table::read_csv(file).map_err(|e| EtlError::ArtifactRead {
            path,
            detail: e.to_string(),
        })
    }

    fn save(&self, key: &ArtifactKey, table: &Table) -> Result<(), EtlError> {
        let path = self.path(key);

        // Atomic write: temp sibling + rename, so a crash mid-write cannot
        // leave an artifact that the existence check would trust.
        let tmp_path = path.with_extension("csv.tmp");
        let write = |p: &Path| -> Result<(), EtlError> {
            let mut buf = Vec::new();
            table.write_csv(&mut buf).map_err(|e| EtlError::ArtifactWrite {
                path: p.to_path_buf(),
                detail: e.to_string(),
            })?;
            fs::write(p, buf).map_err(|e| EtlError::ArtifactWrite {
                path: p.to_path_buf(),
                detail: e.to_string(),
            })
        };
        write(&tmp_path)?;

        fs::rename(&tmp_path, &path).map_err(|e| EtlError::ArtifactWrite {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        debug!("Saved artifact {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn small_table() -> Table {
        let mut t = Table::new();
        t.push_row(vec![("Name".into(), "The Crown".into())]);
        t
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        let key = ArtifactKey::new("2024-03-01", "raw");

        assert!(!store.exists(&key));
        store.save(&key, &small_table()).unwrap();
        assert!(store.exists(&key));

        let back = store.load(&key).unwrap();
        assert_eq!(back.get(0, "Name"), Some(&Value::Str("The Crown".into())));
    }

    #[test]
    fn artifact_file_name_is_run_key_dash_stage() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        let key = ArtifactKey::new("2024-03-01", "clean");
        assert!(store
            .path(&key)
            .ends_with(Path::new("2024-03-01-clean.csv")));
    }

    #[test]
    fn no_tmp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        let key = ArtifactKey::new("2024-03-01", "raw");
        store.save(&key, &small_table()).unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| n.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "found temp files: {leftovers:?}");
    }

    #[test]
    fn missing_artifact_load_is_readable_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirStore::open(dir.path()).unwrap();
        let err = store
            .load(&ArtifactKey::new("2024-03-01", "geo"))
            .unwrap_err();
        assert!(err.to_string().contains("2024-03-01-geo.csv"));
    }
}
