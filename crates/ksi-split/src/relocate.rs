use crate::{absolutize, SplitEngine, SplitResult};
use chrono::Utc;
use ksi_schemas::ModelCode;
use ksi_storage::{BlobStore, StorageError};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Split output that now lives under `<split_dir>/<job_id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelocatedSplit {
    pub job_id: String,
    /// Folder holding the per-model subfolders after the move.
    pub split_dir: String,
    pub result: SplitResult,
}

/// Split `text` into a transient `<split_dir>/<wip_name>/<timestamp>` folder,
/// then move it to `<split_dir>/<job_id>`.
///
/// Safe to repeat for the same job: an existing destination is replaced.
/// A relative `split_dir` is resolved against the current directory.
pub fn split_into_job_folder(
    engine: &SplitEngine,
    blobs: &dyn BlobStore,
    text: &str,
    split_dir: &Path,
    wip_name: &str,
    job_id: &str,
) -> Result<RelocatedSplit, StorageError> {
    let split_dir = absolutize(split_dir)?;
    let wip_root = split_dir.join(wip_name);
    blobs.create_dir(&wip_root)?;

    let result = engine.split(blobs, text, &wip_root, Utc::now())?;
    relocate_to_job(engine, blobs, result, &wip_root, &split_dir, job_id)
}

/// Move `<wip_root>/<result.timestamp>` to `<split_dir>/<job_id>` and rewrite
/// every reference in `result` to point at the new location.
///
/// A previous destination is replaced only when the source is still there.
/// With the source gone and the destination present the move already
/// happened, so only the references are rewritten. The wip root is removed
/// afterwards if it is left empty. Failing to clean it up is not an error.
pub fn relocate_to_job(
    engine: &SplitEngine,
    blobs: &dyn BlobStore,
    mut result: SplitResult,
    wip_root: &Path,
    split_dir: &Path,
    job_id: &str,
) -> Result<RelocatedSplit, StorageError> {
    let wip_root = absolutize(wip_root)?;
    let ts = result.timestamp.clone();
    let from = wip_root.join(&ts);
    let to = absolutize(split_dir)?.join(job_id);

    if blobs.exists(&from) {
        if blobs.exists(&to) {
            debug!(dest = %to.display(), "replacing previous split output");
            blobs.remove_dir_all(&to)?;
        }
        blobs.move_dir(&from, &to)?;
    } else if blobs.exists(&to) {
        debug!(dest = %to.display(), "split output already relocated");
    } else {
        blobs.move_dir(&from, &to)?;
    }

    for model in ModelCode::ALL {
        let out = result.output_mut(model);
        if out.count == 0 {
            continue;
        }
        if let Some(p) = out.path.take() {
            out.path = Some(rewrite_path(&p, &from, &to, &ts, job_id));
        }
        out.download = Some(match out.download.take() {
            Some(d) => rewrite_download(&d, &ts, job_id),
            None => engine.download_ref(model, job_id),
        });
    }
    result.timestamp = job_id.to_string();

    cleanup_if_empty(blobs, &wip_root);

    Ok(RelocatedSplit {
        job_id: job_id.to_string(),
        split_dir: to.to_string_lossy().into_owned(),
        result,
    })
}

/// Re-root a path recorded under `from` so it points under `to`.
///
/// Paths outside `from` fall back to replacing any path component equal to
/// `token`. Anything else is returned unchanged.
pub fn rewrite_path(path: &str, from: &Path, to: &Path, token: &str, replacement: &str) -> String {
    let p = Path::new(path);
    if let Ok(rest) = p.strip_prefix(from) {
        return to.join(rest).to_string_lossy().into_owned();
    }

    let mut hit = false;
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::Normal(s) if s == token => {
                hit = true;
                out.push(replacement);
            }
            other => out.push(other.as_os_str()),
        }
    }
    if hit {
        out.to_string_lossy().into_owned()
    } else {
        path.to_string()
    }
}

/// Replace the last `/` segment of a download reference when it equals
/// `token`. Any other shape is returned unchanged.
pub fn rewrite_download(download: &str, token: &str, replacement: &str) -> String {
    match download.rsplit_once('/') {
        Some((head, last)) if last == token => format!("{head}/{replacement}"),
        _ => download.to_string(),
    }
}

fn cleanup_if_empty(blobs: &dyn BlobStore, wip_root: &Path) {
    match blobs.list_dir(wip_root) {
        Ok(entries) if entries.is_empty() => {
            if let Err(e) = blobs.remove_dir_all(wip_root) {
                warn!(error = %e, "could not remove empty split wip folder");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not inspect split wip folder"),
    }
}
