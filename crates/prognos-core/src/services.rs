//! Shared handles to every collaborator.

use std::{fmt, sync::Arc};

use crate::collaborator::{
    AnalysableSource, CompetencyService, CompletionService, EventLogQuery, GradeService,
    SampleSource,
};

/// Any single value implementing every collaborator trait.
pub trait Backend:
    AnalysableSource
    + SampleSource
    + EventLogQuery
    + CompletionService
    + CompetencyService
    + GradeService
{
}

impl<T> Backend for T where
    T: AnalysableSource
        + SampleSource
        + EventLogQuery
        + CompletionService
        + CompetencyService
        + GradeService
{
}

/// Cloneable bundle of collaborator handles.
///
/// Each field can point at a different implementation; [`Services::from_backend`] wires all
/// of them to one value.
#[derive(Clone)]
pub struct Services {
    pub analysables: Arc<dyn AnalysableSource>,
    pub samples: Arc<dyn SampleSource>,
    pub logs: Arc<dyn EventLogQuery>,
    pub completion: Arc<dyn CompletionService>,
    pub competencies: Arc<dyn CompetencyService>,
    pub grades: Arc<dyn GradeService>,
}

impl Services {
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: Backend + 'static,
    {
        Self {
            analysables: backend.clone(),
            samples: backend.clone(),
            logs: backend.clone(),
            completion: backend.clone(),
            competencies: backend.clone(),
            grades: backend,
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
