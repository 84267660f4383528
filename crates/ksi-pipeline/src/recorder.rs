use anyhow::Result;
use ksi_audit::{AuditWriter, AUDIT_FILE_NAME};
use ksi_db::SubmissionStore;
use ksi_schemas::{event_type, meta_key, NewEvent, SubmissionEvent, SubmissionStatus};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Status + audit trail of one job.
///
/// Every status change goes through the store as one atomic
/// status-and-event write. Events are then copied to the job's
/// `audit.jsonl` mirror when one is attached; events recorded before the
/// mirror exists are held and flushed on attach. Mirror failures are logged
/// and never affect the job.
pub struct JobRecorder {
    store: Arc<dyn SubmissionStore>,
    job_id: Uuid,
    status: SubmissionStatus,
    mirror: Option<AuditWriter>,
    /// Hold events until a mirror is attached.
    hold: bool,
    held: Vec<SubmissionEvent>,
}

impl JobRecorder {
    /// Recorder for a submission that was just created in `RECEIVED`.
    /// With `mirror_enabled` false no `audit.jsonl` is ever written.
    pub fn new(store: Arc<dyn SubmissionStore>, job_id: Uuid, mirror_enabled: bool) -> Self {
        Self {
            store,
            job_id,
            status: SubmissionStatus::Received,
            mirror: None,
            hold: mirror_enabled,
            held: Vec::new(),
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn status(&self) -> SubmissionStatus {
        self.status
    }

    /// Start mirroring into `<job_dir>/audit.jsonl`.
    pub fn attach_mirror(&mut self, job_dir: &Path, hash_chain: bool) {
        if !self.hold {
            return;
        }
        let path = job_dir.join(AUDIT_FILE_NAME);
        match AuditWriter::resume(&path, hash_chain) {
            Ok(w) => {
                self.mirror = Some(w);
                let held = std::mem::take(&mut self.held);
                for ev in &held {
                    self.mirror_event(ev);
                }
            }
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "audit mirror unavailable");
                self.hold = false;
                self.held.clear();
            }
        }
    }

    /// Event with no status change.
    pub async fn note(&mut self, event: NewEvent) -> Result<SubmissionEvent> {
        let ev = self.store.append_event(self.job_id, event).await?;
        self.mirror_event(&ev);
        Ok(ev)
    }

    /// Move forward on the success path.
    pub async fn advance(
        &mut self,
        to: SubmissionStatus,
        event_type: &str,
        message: &str,
        meta: Value,
    ) -> Result<SubmissionEvent> {
        let ev = self
            .store
            .transition_status(self.job_id, self.status, to, NewEvent::new(event_type, message, meta))
            .await?;
        info!(job_id = %self.job_id, from = %self.status, to = %to, "status changed");
        self.status = to;
        self.mirror_event(&ev);
        Ok(ev)
    }

    /// Record one `ERROR` event and move to the terminal state `to`.
    pub async fn fail(&mut self, to: SubmissionStatus, message: &str, meta: Value) -> Result<SubmissionEvent> {
        let ev = self
            .store
            .transition_status(
                self.job_id,
                self.status,
                to,
                NewEvent::new(event_type::ERROR, message, meta),
            )
            .await?;
        warn!(job_id = %self.job_id, from = %self.status, to = %to, reason = message, "job failed");
        self.status = to;
        self.mirror_event(&ev);
        Ok(ev)
    }

    /// Best effort: record `ERROR_UNHANDLED` for an error that escaped the
    /// stages. Does nothing if the job is already terminal.
    pub async fn fail_unhandled(&mut self, error: &anyhow::Error) {
        if self.status.is_terminal() {
            return;
        }
        let meta = meta([(meta_key::ERROR, Value::String(format!("{error:#}")))]);
        if let Err(e) = self
            .fail(SubmissionStatus::ErrorUnhandled, "unhandled error", meta)
            .await
        {
            warn!(job_id = %self.job_id, error = %e, "could not record unhandled failure");
        }
    }

    fn mirror_event(&mut self, ev: &SubmissionEvent) {
        let Some(w) = self.mirror.as_mut() else {
            if self.hold {
                self.held.push(ev.clone());
            }
            return;
        };
        if let Err(e) = w.append(self.job_id, &ev.event_type, &ev.message, ev.meta.clone()) {
            warn!(job_id = %self.job_id, error = %e, "audit mirror write failed");
        }
    }
}

/// Event metadata object from key/value pairs.
pub(crate) fn meta<const N: usize>(pairs: [(&str, Value); N]) -> Value {
    let mut m = Map::new();
    for (k, v) in pairs {
        m.insert(k.to_string(), v);
    }
    Value::Object(m)
}
