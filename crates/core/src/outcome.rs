//! Tagged result of one pipeline sub-operation.
//!
//! Probe, per-tier encode and thumbnail capture may each fail without
//! failing the job. They report through [`StageOutcome`] and the orchestrator
//! folds the outcomes into the job's warning list.

use crate::error::{JobWarning, PipelineError};

#[derive(Debug)]
pub enum StageOutcome<T> {
    Ok(T),
    /// A value was produced but part of it is missing or unusable.
    Partial { value: T, warning: JobWarning },
    /// Nothing was produced; the job continues without it.
    Warning(JobWarning),
    Fatal(PipelineError),
}

impl<T> StageOutcome<T> {
    /// Collapse into the value (if any), pushing any warning onto `warnings`.
    pub fn absorb(self, warnings: &mut Vec<JobWarning>) -> Result<Option<T>, PipelineError> {
        match self {
            Self::Ok(value) => Ok(Some(value)),
            Self::Partial { value, warning } => {
                warnings.push(warning);
                Ok(Some(value))
            }
            Self::Warning(warning) => {
                warnings.push(warning);
                Ok(None)
            }
            Self::Fatal(err) => Err(err),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    pub fn warning(&self) -> Option<&JobWarning> {
        match self {
            Self::Partial { warning, .. } | Self::Warning(warning) => Some(warning),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> StageOutcome<U> {
        match self {
            Self::Ok(value) => StageOutcome::Ok(f(value)),
            Self::Partial { value, warning } => StageOutcome::Partial {
                value: f(value),
                warning,
            },
            Self::Warning(warning) => StageOutcome::Warning(warning),
            Self::Fatal(err) => StageOutcome::Fatal(err),
        }
    }
}
