use std::{fs::File, io::BufReader, path::Path};

use chrono::Utc;
use prognos_core::Timestamp;
use serde::{Deserialize, Serialize};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("failed to open {path}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[display("failed to parse {path}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Run options of an [`Analyser`](crate::Analyser).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserOptions {
    /// Writes to the evaluation scope, replacing earlier evaluation artifacts.
    pub evaluation: bool,
    /// Whether [`Analyser::run()`](crate::Analyser::run) computes the label column.
    pub include_target: bool,
    /// Restricts the run to these range strategy codes.
    pub range_strategies: Option<Vec<String>>,
    /// Fixed "now" in UNIX seconds; the wall clock when absent.
    pub now: Option<Timestamp>,
    /// Processes analysables on scoped worker threads.
    pub parallel: bool,
}

impl Default for AnalyserOptions {
    fn default() -> Self {
        Self {
            evaluation: false,
            include_target: true,
            range_strategies: None,
            now: None,
            parallel: false,
        }
    }
}

impl AnalyserOptions {
    pub fn from_json_file<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.now.unwrap_or_else(|| Utc::now().timestamp())
    }
}
