//! Prediction back-ends.
//!
//! A [`Predictor`] is trained on and applied to [`DatasetArtifact`]s. The dataset pipeline
//! treats it as opaque: it only needs one to be configured, and fails loudly when none is.
//!
//! [`BaselinePredictor`] is the reference back-end. It learns the majority label of each
//! dataset and predicts it for every row, which makes it a floor any real model should beat.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use prognos_core::{DatasetArtifact, Label, RowKey};

use crate::target::{DROPOUT, RETAINED};

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum PredictorError {
    #[display("dataset `{dataset_id}` has no label column")]
    MissingLabels { dataset_id: String },
    #[display("dataset `{dataset_id}` has no rows")]
    EmptyDataset { dataset_id: String },
    #[display("no model trained for dataset `{dataset_id}`")]
    NotTrained { dataset_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainSummary {
    pub samples: usize,
    pub positives: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub key: RowKey,
    pub label: Label,
    /// Confidence in `label`, in \[0.0, 1.0\].
    pub score: f64,
}

pub trait Predictor: fmt::Debug + Send + Sync {
    #[must_use]
    fn id(&self) -> &str;

    /// Fits a model for `dataset_id`, replacing any earlier one.
    fn train(
        &self,
        dataset_id: &str,
        artifact: &DatasetArtifact,
    ) -> Result<TrainSummary, PredictorError>;

    /// Predicts a label for every row of `artifact`.
    fn predict(
        &self,
        dataset_id: &str,
        artifact: &DatasetArtifact,
    ) -> Result<Vec<Prediction>, PredictorError>;
}

pub type SharedPredictor = Arc<dyn Predictor>;

#[derive(Debug, Clone, Copy, PartialEq)]
struct MajorityModel {
    label: Label,
    score: f64,
}

/// Majority-label predictor. Ties go to [`DROPOUT`].
#[derive(Debug, Default)]
pub struct BaselinePredictor {
    models: Mutex<HashMap<String, MajorityModel>>,
}

impl BaselinePredictor {
    pub const ID: &'static str = "predictor::baseline";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Predictor for BaselinePredictor {
    fn id(&self) -> &str {
        Self::ID
    }

    #[expect(clippy::cast_precision_loss)]
    fn train(
        &self,
        dataset_id: &str,
        artifact: &DatasetArtifact,
    ) -> Result<TrainSummary, PredictorError> {
        if !artifact.has_label() {
            return Err(PredictorError::MissingLabels {
                dataset_id: dataset_id.to_owned(),
            });
        }
        let labels = artifact
            .rows()
            .iter()
            .filter_map(|row| row.label)
            .collect::<Vec<_>>();
        if labels.is_empty() {
            return Err(PredictorError::EmptyDataset {
                dataset_id: dataset_id.to_owned(),
            });
        }

        let samples = labels.len();
        let positives = labels.iter().filter(|label| **label == DROPOUT).count();
        let (label, count) = if positives * 2 >= samples {
            (DROPOUT, positives)
        } else {
            (RETAINED, samples - positives)
        };
        let model = MajorityModel {
            label,
            score: count as f64 / samples as f64,
        };
        self.models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dataset_id.to_owned(), model);

        tracing::debug!(dataset_id, samples, positives, "Baseline model trained");
        Ok(TrainSummary { samples, positives })
    }

    fn predict(
        &self,
        dataset_id: &str,
        artifact: &DatasetArtifact,
    ) -> Result<Vec<Prediction>, PredictorError> {
        let model = self
            .models
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(dataset_id)
            .copied()
            .ok_or_else(|| PredictorError::NotTrained {
                dataset_id: dataset_id.to_owned(),
            })?;
        Ok(artifact
            .keys()
            .map(|key| Prediction {
                key,
                label: model.label,
                score: model.score,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use prognos_core::{AnalysableId, RowRecord, SampleId};

    use super::*;

    fn artifact(labels: &[Label], include_label: bool) -> DatasetArtifact {
        let rows = labels
            .iter()
            .zip(1..)
            .map(|(label, sample)| {
                let key = RowKey {
                    analysable: AnalysableId(1),
                    sample: SampleId(sample),
                    range: 1,
                };
                let record = RowRecord {
                    features: BTreeMap::from([("indicator::x".to_owned(), Some(1.0))]),
                    label: Some(*label),
                };
                (key, record)
            })
            .collect();
        let columns = BTreeSet::from(["indicator::x".to_owned()]);
        DatasetArtifact::build("ds", "quarters", include_label, columns, rows)
    }

    #[test]
    fn test_predicts_majority_label() {
        let predictor = BaselinePredictor::new();
        let summary = predictor.train("ds", &artifact(&[0, 0, 0, 1], true)).unwrap();
        assert_eq!(summary, TrainSummary {
            samples: 4,
            positives: 1
        });

        let predictions = predictor.predict("ds", &artifact(&[1, 1], false)).unwrap();
        assert_eq!(predictions.len(), 2);
        for prediction in predictions {
            assert_eq!(prediction.label, RETAINED);
            assert!((prediction.score - 0.75).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tie_predicts_dropout() {
        let predictor = BaselinePredictor::new();
        predictor.train("ds", &artifact(&[0, 1], true)).unwrap();
        let predictions = predictor.predict("ds", &artifact(&[0], true)).unwrap();
        assert_eq!(predictions[0].label, DROPOUT);
    }

    #[test]
    fn test_models_are_per_dataset() {
        let predictor = BaselinePredictor::new();
        predictor.train("a", &artifact(&[1], true)).unwrap();
        assert!(matches!(
            predictor.predict("b", &artifact(&[1], true)),
            Err(PredictorError::NotTrained { .. })
        ));
    }

    #[test]
    fn test_train_rejects_unusable_artifacts() {
        let predictor = BaselinePredictor::new();
        assert!(matches!(
            predictor.train("ds", &artifact(&[1], false)),
            Err(PredictorError::MissingLabels { .. })
        ));
        assert!(matches!(
            predictor.train("ds", &artifact(&[], true)),
            Err(PredictorError::EmptyDataset { .. })
        ));
    }
}
