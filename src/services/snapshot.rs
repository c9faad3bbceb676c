//! On-disk snapshots of the index.
//!
//! Layout under the index directory:
//!
//! ```text
//! manifest.json            generation, scheme, entry count, artifact checksums
//! vectorizer-<gen>.json    fitted TF-IDF state (TF-IDF scheme only)
//! vectors-<gen>.json       the vector index
//! meta-<gen>.json          metadata array, aligned with the vectors
//! ```
//!
//! Artifacts of a generation are written first, each through a temp file
//! that is fsynced and renamed. The manifest is renamed into place last, so
//! readers only ever see a complete generation. The previous generation is
//! kept on disk until the next commit, so a reader that picked up the old
//! manifest can still open its artifacts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::models::ChunkMeta;
use crate::services::index::VectorIndex;
use crate::services::state::IndexState;
use crate::services::vectorizer::TfidfVectorizer;
use crate::utils::calculate_checksum;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const VECTORIZER_PREFIX: &str = "vectorizer-";
const VECTORS_PREFIX: &str = "vectors-";
const META_PREFIX: &str = "meta-";

/// Extra attempts `load` makes when the generation moves under it.
const LOAD_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Vectorizer,
    Vectors,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub file: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub generation: u64,
    pub scheme: String,
    pub entries: usize,
    pub created_at: DateTime<Utc>,
    pub artifacts: Vec<Artifact>,
}

impl Manifest {
    fn artifact(&self, kind: ArtifactKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind == kind)
    }
}

/// Reads and writes snapshot generations in one directory.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open the store, creating the directory on first use.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, SnapshotError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SnapshotError::io(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    pub fn read_manifest(&self) -> Result<Option<Manifest>, SnapshotError> {
        let path = self.manifest_path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SnapshotError::io(&path, e)),
        };
        let manifest: Manifest =
            serde_json::from_slice(&bytes).map_err(|e| SnapshotError::json(&path, e))?;
        if manifest.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::Corrupt(format!(
                "unsupported snapshot format_version {} (expected {})",
                manifest.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(Some(manifest))
    }

    /// Generation of the snapshot currently on disk, if any.
    pub fn generation(&self) -> Result<Option<u64>, SnapshotError> {
        Ok(self.read_manifest()?.map(|m| m.generation))
    }

    /// Persist `state` as generation `state.generation` and make it current.
    pub fn save(&self, state: &IndexState) -> Result<(), SnapshotError> {
        if state.index.len() != state.metadata.len() {
            return Err(SnapshotError::Corrupt(format!(
                "refusing to save {} vectors with {} metadata entries",
                state.index.len(),
                state.metadata.len()
            )));
        }

        let generation = state.generation;
        let mut artifacts = Vec::with_capacity(3);

        if let Some(vectorizer) = &state.vectorizer {
            artifacts.push(self.write_artifact(
                ArtifactKind::Vectorizer,
                &format!("{VECTORIZER_PREFIX}{generation}.json"),
                vectorizer,
            )?);
        }
        artifacts.push(self.write_artifact(
            ArtifactKind::Vectors,
            &format!("{VECTORS_PREFIX}{generation}.json"),
            &state.index,
        )?);
        artifacts.push(self.write_artifact(
            ArtifactKind::Metadata,
            &format!("{META_PREFIX}{generation}.json"),
            &state.metadata,
        )?);

        let manifest = Manifest {
            format_version: SNAPSHOT_FORMAT_VERSION,
            generation,
            scheme: state.scheme.clone(),
            entries: state.metadata.len(),
            created_at: Utc::now(),
            artifacts,
        };
        let path = self.manifest_path();
        let bytes =
            serde_json::to_vec_pretty(&manifest).map_err(|e| SnapshotError::json(&path, e))?;
        write_atomic(&path, &bytes)?;
        sync_dir(&self.dir);

        tracing::info!(
            generation,
            entries = manifest.entries,
            scheme = %manifest.scheme,
            "snapshot committed"
        );
        self.remove_stale(generation);
        Ok(())
    }

    /// Load the current snapshot, or `None` when nothing was saved yet.
    pub fn load(&self) -> Result<Option<IndexState>, SnapshotError> {
        let mut attempts = 0;
        loop {
            let Some(manifest) = self.read_manifest()? else {
                return Ok(None);
            };
            let generation = manifest.generation;
            match self.load_generation(manifest) {
                Err(SnapshotError::Io { ref source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound && attempts < LOAD_RETRIES =>
                {
                    attempts += 1;
                    tracing::debug!(generation, attempts, "snapshot superseded while loading, retrying");
                }
                result => return result.map(Some),
            }
        }
    }

    fn load_generation(&self, manifest: Manifest) -> Result<IndexState, SnapshotError> {
        let vectorizer: Option<TfidfVectorizer> = manifest
            .artifact(ArtifactKind::Vectorizer)
            .map(|a| self.read_artifact(a))
            .transpose()?;
        let index: VectorIndex = self.read_artifact(required(&manifest, ArtifactKind::Vectors)?)?;
        let metadata: Vec<ChunkMeta> =
            self.read_artifact(required(&manifest, ArtifactKind::Metadata)?)?;

        if index.len() != metadata.len() || metadata.len() != manifest.entries {
            return Err(SnapshotError::Corrupt(format!(
                "generation {} has {} vectors and {} metadata entries, manifest says {}",
                manifest.generation,
                index.len(),
                metadata.len(),
                manifest.entries
            )));
        }

        tracing::debug!(
            generation = manifest.generation,
            entries = manifest.entries,
            "snapshot loaded"
        );
        Ok(IndexState {
            generation: manifest.generation,
            scheme: manifest.scheme,
            vectorizer,
            index,
            metadata,
        })
    }

    fn write_artifact<T: Serialize>(
        &self,
        kind: ArtifactKind,
        file: &str,
        value: &T,
    ) -> Result<Artifact, SnapshotError> {
        let path = self.dir.join(file);
        let bytes = serde_json::to_vec(value).map_err(|e| SnapshotError::json(&path, e))?;
        write_atomic(&path, &bytes)?;
        Ok(Artifact {
            kind,
            file: file.to_string(),
            sha256: calculate_checksum(&bytes),
        })
    }

    fn read_artifact<T: DeserializeOwned>(&self, artifact: &Artifact) -> Result<T, SnapshotError> {
        let path = self.dir.join(&artifact.file);
        let bytes = fs::read(&path).map_err(|e| SnapshotError::io(&path, e))?;
        if calculate_checksum(&bytes) != artifact.sha256 {
            return Err(SnapshotError::Corrupt(format!(
                "checksum mismatch for {}",
                path.display()
            )));
        }
        serde_json::from_slice(&bytes).map_err(|e| SnapshotError::json(&path, e))
    }

    /// Delete artifacts older than the generation before `current`.
    fn remove_stale(&self, current: u64) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), "cannot list snapshot dir: {e}");
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(generation) = artifact_generation(&name) else {
                continue;
            };
            if generation.saturating_add(1) < current
                && let Err(e) = fs::remove_file(entry.path())
            {
                tracing::warn!(file = %name, "failed to remove stale snapshot artifact: {e}");
            }
        }
    }
}

fn required(manifest: &Manifest, kind: ArtifactKind) -> Result<&Artifact, SnapshotError> {
    manifest
        .artifact(kind)
        .ok_or_else(|| SnapshotError::Corrupt(format!("manifest lists no {kind:?} artifact")))
}

/// Generation number encoded in an artifact file name, e.g. `meta-12.json`.
fn artifact_generation(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".json")?;
    [VECTORIZER_PREFIX, VECTORS_PREFIX, META_PREFIX]
        .iter()
        .find_map(|prefix| stem.strip_prefix(prefix))
        .and_then(|g| g.parse().ok())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SnapshotError> {
    let tmp = path.with_extension("json.tmp");
    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::io(path, e));
    }
    Ok(())
}

/// Persist the renames themselves. Directories cannot be opened on Windows.
fn sync_dir(dir: &Path) {
    if cfg!(unix)
        && let Ok(handle) = fs::File::open(dir)
    {
        let _ = handle.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::vectorizer::QueryVector;

    fn dense_state(generation: u64, texts: &[&str]) -> IndexState {
        let mut state = IndexState::empty("dense:hash-v1:2", VectorIndex::flat(2));
        state.generation = generation;
        for (i, text) in texts.iter().enumerate() {
            state
                .index
                .add(QueryVector::Dense(vec![i as f32, 1.0]))
                .unwrap();
            state
                .metadata
                .push(ChunkMeta::new("job", "a.txt", text.to_string()));
        }
        state
    }

    #[test]
    fn test_load_without_snapshot_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("index")).unwrap();
        assert!(store.dir().is_dir());
        assert!(store.load().unwrap().is_none());
        assert_eq!(store.generation().unwrap(), None);
    }

    #[test]
    fn test_round_trip_dense() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let state = dense_state(1, &["alpha", "beta"]);
        store.save(&state).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, state);
        assert_eq!(store.generation().unwrap(), Some(1));
    }

    #[test]
    fn test_round_trip_tfidf() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let texts = ["red apples", "green pears"];
        let (vectorizer, rows) = TfidfVectorizer::fit(&texts, 2000);
        let state = IndexState {
            generation: 3,
            scheme: "tfidf-v1".to_string(),
            vectorizer: Some(vectorizer),
            index: VectorIndex::sparse(rows),
            metadata: texts
                .iter()
                .map(|t| ChunkMeta::new("j", "f.txt", t.to_string()))
                .collect(),
        };
        store.save(&state).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), state);
        assert!(dir.path().join("vectorizer-3.json").is_file());
    }

    #[test]
    fn test_old_generations_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.save(&dense_state(1, &["a"])).unwrap();
        store.save(&dense_state(2, &["a", "b"])).unwrap();
        assert!(dir.path().join("meta-1.json").exists());

        store.save(&dense_state(3, &["a", "b", "c"])).unwrap();
        assert!(!dir.path().join("vectors-1.json").exists());
        assert!(!dir.path().join("meta-1.json").exists());
        assert!(dir.path().join("vectors-2.json").exists());
        assert!(dir.path().join("vectors-3.json").exists());
        assert_eq!(store.load().unwrap().unwrap().len(), 3);
    }

    #[test]
    fn test_load_concurrent_with_commits() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.save(&dense_state(1, &["a"])).unwrap();

        let writer_store = store.clone();
        let writer = std::thread::spawn(move || {
            for generation in 2..=200u64 {
                let texts: Vec<String> = (0..generation % 7 + 1).map(|i| format!("t{i}")).collect();
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                writer_store.save(&dense_state(generation, &refs)).unwrap();
            }
        });

        let mut last_generation = 0;
        for _ in 0..300 {
            let state = store.load().unwrap().unwrap();
            assert_eq!(state.index.len(), state.metadata.len());
            assert!(state.generation >= last_generation);
            last_generation = state.generation;
        }
        writer.join().unwrap();
        assert_eq!(store.load().unwrap().unwrap().generation, 200);
    }

    #[test]
    fn test_tampered_artifact_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        store.save(&dense_state(1, &["a"])).unwrap();

        fs::write(dir.path().join("meta-1.json"), b"[]").unwrap();
        assert!(matches!(store.load(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_refuses_to_save_misaligned_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let mut state = dense_state(1, &["a"]);
        state.metadata.clear();
        assert!(store.save(&state).is_err());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_artifact_generation() {
        assert_eq!(artifact_generation("meta-12.json"), Some(12));
        assert_eq!(artifact_generation("vectorizer-3.json"), Some(3));
        assert_eq!(artifact_generation("manifest.json"), None);
        assert_eq!(artifact_generation("meta-1.json.tmp"), None);
    }
}
