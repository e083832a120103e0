//! Merging partial artifacts into range-scoped artifacts.
//!
//! Every dataset artifact reaches its store through [`DatasetMerger::merge()`], whether it
//! came from one analysable or many. Merges on the same [`ArtifactKey`] run one at a time:
//! each key has its own lock, held across the store's load-combine-write sequence.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use prognos_core::DatasetArtifact;

use crate::store::{ArtifactKey, DatasetStore, Scope, StoreError};

#[derive(Debug)]
pub struct DatasetMerger {
    store: Arc<dyn DatasetStore>,
    key_locks: Mutex<HashMap<ArtifactKey, Arc<Mutex<()>>>>,
}

impl DatasetMerger {
    pub fn new(store: Arc<dyn DatasetStore>) -> Self {
        Self {
            store,
            key_locks: Mutex::default(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DatasetStore> {
        &self.store
    }

    fn key_lock(&self, key: &ArtifactKey) -> Arc<Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.clone()).or_default())
    }

    /// Deletes the cached evaluation artifact for `(dataset_id, range_code)`, if any.
    pub fn delete_evaluation_artifact(
        &self,
        dataset_id: &str,
        range_code: &str,
    ) -> Result<bool, StoreError> {
        let key = ArtifactKey::new(dataset_id, range_code, Scope::Evaluation);
        let lock = self.key_lock(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let deleted = self.store.delete(&key)?;
        if deleted {
            tracing::debug!(%key, "Deleted evaluation artifact");
        }
        Ok(deleted)
    }

    /// Merges `partials` into the stored artifact for `(dataset_id, range_code)`.
    ///
    /// Rows are the union of the partials' rows and the stored rows, and columns are the union
    /// of all columns; a value a row has no entry for is missing, never zero. The label column
    /// is present iff `include_label`.
    ///
    /// In evaluation mode the combined partials replace the stored artifact under the key
    /// guard, so two evaluation merges on one key never accumulate.
    pub fn merge<'a, I>(
        &self,
        partials: I,
        dataset_id: &str,
        range_code: &str,
        evaluation: bool,
        include_label: bool,
    ) -> Result<DatasetArtifact, StoreError>
    where
        I: IntoIterator<Item = &'a DatasetArtifact>,
    {
        let key = ArtifactKey::new(dataset_id, range_code, Scope::from_evaluation(evaluation));
        let combined = DatasetArtifact::combine(dataset_id, range_code, include_label, partials);

        let lock = self.key_lock(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let merged = if evaluation {
            self.store.write(&key, &combined)?;
            combined
        } else {
            self.store.merge_write(&key, combined)?
        };
        tracing::debug!(%key, rows = merged.len(), "Merged dataset artifact");
        Ok(merged)
    }
}
