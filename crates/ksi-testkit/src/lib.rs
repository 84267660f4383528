//! Shared fixtures for scenario tests: access-key builders, failure
//! injection for the storage and submission-store seams, and deterministic
//! job ids.

mod blobs;
mod ids;
mod store;

pub use blobs::FailingBlobStore;
pub use ids::{FixedJobId, SequentialJobIds};
pub use store::FailingStore;

use ksi_config::PipelineConfig;
use ksi_db::MemoryStore;
use ksi_pipeline::Pipeline;
use ksi_schemas::ModelCode;
use ksi_storage::LocalBlobStore;
use std::path::Path;
use std::sync::Arc;

/// State/year-month/CNPJ block shared by every fixture key (20 digits).
pub const KEY_PREFIX: &str = "35190112345678000199";

/// 44-digit access key of `model`; `seq` fills the tail.
pub fn key(model: ModelCode, seq: u64) -> String {
    format!("{KEY_PREFIX}{}{seq:022}", model.as_str())
}

/// One key per line, `\n` terminated, models in the order given.
pub fn key_batch(models: &[(ModelCode, usize)]) -> String {
    let mut out = String::new();
    let mut seq = 0u64;
    for (model, n) in models {
        for _ in 0..*n {
            seq += 1;
            out.push_str(&key(*model, seq));
            out.push('\n');
        }
    }
    out
}

/// Pipeline config rooted under `root` (normally a tempdir).
pub fn test_config(root: &Path) -> PipelineConfig {
    PipelineConfig {
        upload_dir: root.join("uploads"),
        ..PipelineConfig::default()
    }
}

/// Local disk + in-memory store.
pub fn memory_pipeline(root: &Path) -> (Pipeline, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::new(test_config(root), store.clone(), Arc::new(LocalBlobStore));
    (pipeline, store)
}
