use crate::{absolutize, SplitResult};
use chrono::{DateTime, Utc};
use ksi_classify::classify_line;
use ksi_schemas::ModelCode;
use ksi_storage::{BlobStore, StorageError};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Route prefix of the per-model download references.
pub const DEFAULT_DOWNLOAD_PREFIX: &str = "/nfe-55-65/download";

/// Output folder name format (second resolution, UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

#[derive(Debug, Clone)]
pub struct SplitEngine {
    download_prefix: String,
}

impl Default for SplitEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DOWNLOAD_PREFIX)
    }
}

impl SplitEngine {
    pub fn new(download_prefix: impl Into<String>) -> Self {
        let mut download_prefix = download_prefix.into();
        while download_prefix.ends_with('/') {
            download_prefix.pop();
        }
        Self { download_prefix }
    }

    pub fn download_prefix(&self) -> &str {
        &self.download_prefix
    }

    /// `<prefix>/modelo_<code>/<id>`
    pub fn download_ref(&self, model: ModelCode, id: &str) -> String {
        format!("{}/{}/{}", self.download_prefix, model.split_label(), id)
    }

    /// Split using the current time as generation id.
    pub fn split(
        &self,
        blobs: &dyn BlobStore,
        text: &str,
        out_root: &Path,
        now: DateTime<Utc>,
    ) -> Result<SplitResult, StorageError> {
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        self.split_at(blobs, text, out_root, &timestamp)
    }

    /// Split `text` into `<out_root>/<timestamp>/modelo_<code>/modelo_<code>.txt`.
    ///
    /// Lines keep their exact content (only the terminator is normalised to
    /// `\n`). Unclassifiable lines are skipped. A batch with nothing
    /// classifiable yields an all-zero result and writes no file.
    pub fn split_at(
        &self,
        blobs: &dyn BlobStore,
        text: &str,
        out_root: &Path,
        timestamp: &str,
    ) -> Result<SplitResult, StorageError> {
        let base = absolutize(&out_root.join(timestamp))?;
        if blobs.exists(&base) {
            debug!(dir = %base.display(), "clearing stale split folder");
            blobs.remove_dir_all(&base)?;
        }
        blobs.create_dir(&base)?;

        let mut buckets: BTreeMap<ModelCode, Vec<&str>> = BTreeMap::new();
        for line in text.lines() {
            if let Some(model) = classify_line(line) {
                buckets.entry(model).or_default().push(line);
            }
        }

        let mut result = SplitResult::empty(timestamp);
        for model in ModelCode::ALL {
            let lines = match buckets.get(&model) {
                Some(v) if !v.is_empty() => v,
                _ => continue,
            };

            let label = model.split_label();
            let file = base.join(label).join(format!("{label}.txt"));

            let mut body = String::with_capacity(lines.iter().map(|l| l.len() + 1).sum());
            for l in lines {
                body.push_str(l);
                body.push('\n');
            }
            blobs.write_file(&file, &mut body.as_bytes())?;

            let out = result.output_mut(model);
            out.count = lines.len();
            out.download = Some(self.download_ref(model, timestamp));
            out.path = Some(file.to_string_lossy().into_owned());

            debug!(model = model.as_str(), keys = lines.len(), "split file written");
        }

        Ok(result)
    }
}
