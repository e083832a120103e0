//! Range-scoped dataset tables.
//!
//! A [`DatasetArtifact`] holds, for one dataset id and one range-strategy code, a row per
//! `(analysable, sample, range)` with one value per indicator column and an optional label.
//! Columns are kept sorted and rows are ordered by [`RowKey`], so two artifacts with the same
//! content serialize to identical bytes.
//!
//! A missing value (`None`, serialized as `null`) means the indicator did not apply to that
//! row. It is never replaced by zero and the column is never dropped.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::analysable::{AnalysableId, SampleId};

/// Outcome label of a sample (`0` or `1` for binary targets).
pub type Label = u8;

/// Identity of a dataset row: one sample, in one range, of one analysable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub analysable: AnalysableId,
    pub sample: SampleId,
    pub range: u32,
}

/// Column-addressed content of one row, used to build and merge artifacts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowRecord {
    pub features: BTreeMap<String, Option<f64>>,
    pub label: Option<Label>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub key: RowKey,
    /// One entry per artifact column, in column order.
    pub values: Vec<Option<f64>>,
    /// Present iff the artifact includes a label column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<Label>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDatasetArtifact")]
pub struct DatasetArtifact {
    dataset_id: String,
    range_code: String,
    columns: Vec<String>,
    include_label: bool,
    rows: Vec<Row>,
}

/// A stored artifact whose shape does not hold together.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ArtifactFormatError {
    #[display("columns are not sorted and unique at {column:?}")]
    UnsortedColumns { column: String },
    #[display("row {key:?} has {found} values for {expected} columns")]
    RowWidth {
        key: RowKey,
        expected: usize,
        found: usize,
    },
    #[display("row {key:?} appears more than once")]
    DuplicateRow { key: RowKey },
    #[display("row {key:?} has a label but the artifact has no label column")]
    UnexpectedLabel { key: RowKey },
}

#[derive(Deserialize)]
struct RawDatasetArtifact {
    dataset_id: String,
    range_code: String,
    columns: Vec<String>,
    include_label: bool,
    rows: Vec<Row>,
}

impl TryFrom<RawDatasetArtifact> for DatasetArtifact {
    type Error = ArtifactFormatError;

    fn try_from(raw: RawDatasetArtifact) -> Result<Self, Self::Error> {
        if let Some(pair) = raw.columns.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(ArtifactFormatError::UnsortedColumns {
                column: pair[1].clone(),
            });
        }
        let mut rows = raw.rows;
        for row in &rows {
            if row.values.len() != raw.columns.len() {
                return Err(ArtifactFormatError::RowWidth {
                    key: row.key,
                    expected: raw.columns.len(),
                    found: row.values.len(),
                });
            }
            if !raw.include_label && row.label.is_some() {
                return Err(ArtifactFormatError::UnexpectedLabel { key: row.key });
            }
        }
        rows.sort_by_key(|row| row.key);
        if let Some(pair) = rows.windows(2).find(|pair| pair[0].key == pair[1].key) {
            return Err(ArtifactFormatError::DuplicateRow { key: pair[1].key });
        }
        Ok(Self {
            dataset_id: raw.dataset_id,
            range_code: raw.range_code,
            columns: raw.columns,
            include_label: raw.include_label,
            rows,
        })
    }
}

impl DatasetArtifact {
    /// Builds an artifact from column-addressed rows.
    ///
    /// Every row gets a value slot for each of `columns`; slots the record does not provide are
    /// missing. Labels are kept only when `include_label` is set.
    #[must_use]
    pub fn build(
        dataset_id: &str,
        range_code: &str,
        include_label: bool,
        columns: BTreeSet<String>,
        rows: BTreeMap<RowKey, RowRecord>,
    ) -> Self {
        let rows = rows
            .into_iter()
            .map(|(key, mut record)| Row {
                key,
                values: columns
                    .iter()
                    .map(|column| record.features.remove(column).flatten())
                    .collect(),
                label: if include_label { record.label } else { None },
            })
            .collect();
        Self {
            dataset_id: dataset_id.to_owned(),
            range_code: range_code.to_owned(),
            columns: columns.into_iter().collect(),
            include_label,
            rows,
        }
    }

    /// Combines artifacts into one.
    ///
    /// Rows are the union of all input rows (a later artifact wins on equal [`RowKey`]) and
    /// columns are the union of all input columns.
    #[must_use]
    pub fn combine<'a, I>(
        dataset_id: &str,
        range_code: &str,
        include_label: bool,
        artifacts: I,
    ) -> Self
    where
        I: IntoIterator<Item = &'a DatasetArtifact>,
    {
        let mut columns = BTreeSet::new();
        let mut rows = BTreeMap::new();
        for artifact in artifacts {
            columns.extend(artifact.columns.iter().cloned());
            rows.extend(artifact.records());
        }
        Self::build(dataset_id, range_code, include_label, columns, rows)
    }

    /// Iterates rows in column-addressed form.
    pub fn records(&self) -> impl Iterator<Item = (RowKey, RowRecord)> + '_ {
        self.rows.iter().map(|row| {
            let features = self
                .columns
                .iter()
                .cloned()
                .zip(row.values.iter().copied())
                .collect();
            (
                row.key,
                RowRecord {
                    features,
                    label: row.label,
                },
            )
        })
    }

    #[must_use]
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    #[must_use]
    pub fn range_code(&self) -> &str {
        &self.range_code
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn has_label(&self) -> bool {
        self.include_label
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn row(&self, key: &RowKey) -> Option<&Row> {
        self.rows
            .binary_search_by(|row| row.key.cmp(key))
            .ok()
            .map(|index| &self.rows[index])
    }

    /// Value of `column` in the row `key`: `None` if the row or column does not exist,
    /// `Some(None)` if the value is missing.
    #[must_use]
    pub fn value(&self, key: &RowKey, column: &str) -> Option<Option<f64>> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.row(key)?.values.get(index).copied()
    }

    /// Keys of all rows, in order.
    pub fn keys(&self) -> impl Iterator<Item = RowKey> + '_ {
        self.rows.iter().map(|row| row.key)
    }

    /// Distinct samples contributing rows.
    #[must_use]
    pub fn samples(&self) -> BTreeSet<(AnalysableId, SampleId)> {
        self.keys().map(|key| (key.analysable, key.sample)).collect()
    }
}
