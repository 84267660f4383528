use ksi_classify::ModelMismatchError;
use ksi_schemas::SubmissionStatus;
use ksi_validate::ValidationError;
use std::fmt;
use uuid::Uuid;

/// Pipeline stage that hit a storage failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageStage {
    Save,
    Split,
}

/// Failure surfaced to the caller of [`crate::Pipeline::submit`].
///
/// `Validation` and `ModelMismatch` are caller mistakes. `Storage` and
/// `Unhandled` are server-side and carry no filesystem detail; the full
/// error is in the job's `ERROR` event.
#[derive(Debug)]
pub enum SubmitError {
    Validation {
        job_id: Uuid,
        error: ValidationError,
    },
    ModelMismatch {
        job_id: Uuid,
        error: ModelMismatchError,
    },
    Storage {
        job_id: Uuid,
        stage: StorageStage,
    },
    Unhandled {
        job_id: Option<Uuid>,
    },
}

impl SubmitError {
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            SubmitError::Validation { job_id, .. }
            | SubmitError::ModelMismatch { job_id, .. }
            | SubmitError::Storage { job_id, .. } => Some(*job_id),
            SubmitError::Unhandled { job_id } => *job_id,
        }
    }

    /// Terminal status the job was left in.
    pub fn status(&self) -> SubmissionStatus {
        match self {
            SubmitError::Validation { .. } => SubmissionStatus::RejectedValidation,
            SubmitError::ModelMismatch { .. } => SubmissionStatus::RejectedModelMismatch,
            SubmitError::Storage {
                stage: StorageStage::Save,
                ..
            } => SubmissionStatus::ErrorSave,
            SubmitError::Storage {
                stage: StorageStage::Split,
                ..
            } => SubmissionStatus::ErrorSplit,
            SubmitError::Unhandled { .. } => SubmissionStatus::ErrorUnhandled,
        }
    }

    /// Caller-side (4xx-class) failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SubmitError::Validation { .. } | SubmitError::ModelMismatch { .. }
        )
    }
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Validation { error, .. } => write!(f, "{error}"),
            SubmitError::ModelMismatch { error, .. } => write!(f, "{error}"),
            SubmitError::Storage {
                stage: StorageStage::Save,
                ..
            } => f.write_str("failed to save files"),
            SubmitError::Storage {
                stage: StorageStage::Split,
                ..
            } => f.write_str("failed to split key batch"),
            SubmitError::Unhandled { .. } => f.write_str("internal error"),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmitError::Validation { error, .. } => Some(error),
            SubmitError::ModelMismatch { error, .. } => Some(error),
            _ => None,
        }
    }
}
