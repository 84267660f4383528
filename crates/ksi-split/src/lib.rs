//! ksi-split
//!
//! Partitions a key batch into one file per document model and relocates the
//! output from its transient timestamp folder to a job-identified folder.
//!
//! Layout produced by [`SplitEngine::split_at`]:
//!
//! ```text
//! <out_root>/<timestamp>/modelo_55/modelo_55.txt
//! <out_root>/<timestamp>/modelo_65/modelo_65.txt
//! ...
//! ```
//!
//! Only models with at least one key get a folder and a file.

mod engine;
mod relocate;

pub use engine::{SplitEngine, DEFAULT_DOWNLOAD_PREFIX, TIMESTAMP_FORMAT};
pub use relocate::{relocate_to_job, rewrite_download, rewrite_path, split_into_job_folder, RelocatedSplit};

use ksi_schemas::ModelCode;
use ksi_storage::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Per-model slice of a split result. `download` and `path` are `None`
/// exactly when `count == 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub count: usize,
    pub download: Option<String>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitResult {
    /// Generation id. The `%Y%m%d_%H%M%S` timestamp until the output is
    /// relocated, the job id afterwards.
    pub timestamp: String,
    pub model_55: ModelOutput,
    pub model_65: ModelOutput,
    pub model_57: ModelOutput,
    pub model_59: ModelOutput,
}

impl SplitResult {
    pub fn empty(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            model_55: ModelOutput::default(),
            model_65: ModelOutput::default(),
            model_57: ModelOutput::default(),
            model_59: ModelOutput::default(),
        }
    }

    pub fn output(&self, model: ModelCode) -> &ModelOutput {
        match model {
            ModelCode::M55 => &self.model_55,
            ModelCode::M65 => &self.model_65,
            ModelCode::M57 => &self.model_57,
            ModelCode::M59 => &self.model_59,
        }
    }

    pub fn output_mut(&mut self, model: ModelCode) -> &mut ModelOutput {
        match model {
            ModelCode::M55 => &mut self.model_55,
            ModelCode::M65 => &mut self.model_65,
            ModelCode::M57 => &mut self.model_57,
            ModelCode::M59 => &mut self.model_59,
        }
    }

    pub fn total_keys(&self) -> usize {
        ModelCode::ALL.iter().map(|m| self.output(*m).count).sum()
    }

    /// Models that produced a file, with the file path.
    pub fn written(&self) -> Vec<(ModelCode, &str)> {
        ModelCode::ALL
            .iter()
            .filter_map(|m| self.output(*m).path.as_deref().map(|p| (*m, p)))
            .collect()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// `p` joined onto the current directory when relative.
pub(crate) fn absolutize(p: &Path) -> Result<PathBuf, StorageError> {
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let cwd = std::env::current_dir().map_err(|e| StorageError::new("current_dir", p, e))?;
    Ok(cwd.join(p))
}
