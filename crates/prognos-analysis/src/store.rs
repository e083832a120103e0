//! Persistence of dataset artifacts.
//!
//! Artifacts are keyed by [`ArtifactKey`]: dataset id, range code, and [`Scope`]. Evaluation
//! artifacts are scratch data replaced on every evaluation run; production artifacts
//! accumulate rows across runs through [`DatasetStore::merge_write()`].

use std::{
    collections::BTreeMap,
    fmt,
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use prognos_core::DatasetArtifact;
use serde::{Deserialize, Serialize};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[display("evaluation")]
    Evaluation,
    #[display("production")]
    Production,
}

impl Scope {
    #[must_use]
    pub fn from_evaluation(evaluation: bool) -> Self {
        if evaluation {
            Self::Evaluation
        } else {
            Self::Production
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
#[display("{dataset_id}/{scope}/{range_code}")]
pub struct ArtifactKey {
    pub dataset_id: String,
    pub range_code: String,
    pub scope: Scope,
}

impl ArtifactKey {
    #[must_use]
    pub fn new(dataset_id: &str, range_code: &str, scope: Scope) -> Self {
        Self {
            dataset_id: dataset_id.to_owned(),
            range_code: range_code.to_owned(),
            scope,
        }
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum StoreError {
    #[display("failed to access {path}")]
    Io { path: String, source: io::Error },
    #[display("failed to parse {path}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }

    fn json(path: &Path, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.display().to_string(),
            source,
        }
    }
}

pub trait DatasetStore: fmt::Debug + Send + Sync {
    fn load(&self, key: &ArtifactKey) -> Result<Option<DatasetArtifact>, StoreError>;

    /// Stores `artifact` under `key`, replacing any existing artifact.
    fn write(&self, key: &ArtifactKey, artifact: &DatasetArtifact) -> Result<(), StoreError>;

    /// Removes the artifact under `key`. Returns whether one existed.
    fn delete(&self, key: &ArtifactKey) -> Result<bool, StoreError>;

    /// Unions `artifact` into the stored one and returns the result.
    ///
    /// Stored rows are never lost; on equal row keys the incoming row wins.
    fn merge_write(
        &self,
        key: &ArtifactKey,
        artifact: DatasetArtifact,
    ) -> Result<DatasetArtifact, StoreError> {
        let merged = match self.load(key)? {
            Some(existing) => DatasetArtifact::combine(
                &key.dataset_id,
                &key.range_code,
                artifact.has_label(),
                [&existing, &artifact],
            ),
            None => artifact,
        };
        self.write(key, &merged)?;
        Ok(merged)
    }
}

#[derive(Debug, Default)]
pub struct MemoryDatasetStore {
    artifacts: Mutex<BTreeMap<ArtifactKey, DatasetArtifact>>,
}

impl MemoryDatasetStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of every stored artifact.
    #[must_use]
    pub fn keys(&self) -> Vec<ArtifactKey> {
        self.artifacts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl DatasetStore for MemoryDatasetStore {
    fn load(&self, key: &ArtifactKey) -> Result<Option<DatasetArtifact>, StoreError> {
        let artifacts = self.artifacts.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(artifacts.get(key).cloned())
    }

    fn write(&self, key: &ArtifactKey, artifact: &DatasetArtifact) -> Result<(), StoreError> {
        let mut artifacts = self.artifacts.lock().unwrap_or_else(PoisonError::into_inner);
        artifacts.insert(key.clone(), artifact.clone());
        Ok(())
    }

    fn delete(&self, key: &ArtifactKey) -> Result<bool, StoreError> {
        let mut artifacts = self.artifacts.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(artifacts.remove(key).is_some())
    }
}

/// Artifacts as pretty-printed JSON files under `<root>/<dataset id>/<scope>/<range code>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileDatasetStore {
    root: PathBuf,
}

impl JsonFileDatasetStore {
    pub fn new<P>(root: P) -> Self
    where
        P: Into<PathBuf>,
    {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn path(&self, key: &ArtifactKey) -> PathBuf {
        self.root
            .join(&key.dataset_id)
            .join(key.scope.to_string())
            .join(format!("{}.json", key.range_code))
    }
}

impl DatasetStore for JsonFileDatasetStore {
    fn load(&self, key: &ArtifactKey) -> Result<Option<DatasetArtifact>, StoreError> {
        let path = self.path(key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StoreError::io(&path, err)),
        };
        let reader = BufReader::new(file);
        let artifact =
            serde_json::from_reader(reader).map_err(|err| StoreError::json(&path, err))?;
        Ok(Some(artifact))
    }

    fn write(&self, key: &ArtifactKey, artifact: &DatasetArtifact) -> Result<(), StoreError> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| StoreError::io(parent, err))?;
        }

        // Write next to the target and rename, so readers never see a partial file.
        let tmp_path = path.with_extension("json.tmp");
        let file = File::create(&tmp_path).map_err(|err| StoreError::io(&tmp_path, err))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, artifact)
            .map_err(|err| StoreError::json(&tmp_path, err))?;
        writeln!(writer).map_err(|err| StoreError::io(&tmp_path, err))?;
        writer.flush().map_err(|err| StoreError::io(&tmp_path, err))?;
        drop(writer);

        fs::rename(&tmp_path, &path).map_err(|err| StoreError::io(&path, err))
    }

    fn delete(&self, key: &ArtifactKey) -> Result<bool, StoreError> {
        let path = self.path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StoreError::io(&path, err)),
        }
    }
}
