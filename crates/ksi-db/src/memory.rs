use crate::{check_transition, transition_meta, SubmissionNotFound, SubmissionStore, TransitionRejected};
use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use ksi_schemas::{
    ArtifactPaths, FileMovement, NewEvent, NewFileMovement, NewSubmission, Submission,
    SubmissionEvent, SubmissionStatus,
};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// In-process store. One mutex covers all tables, so a status change and
/// its event are observed together.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: i64,
    submissions: BTreeMap<Uuid, Submission>,
    events: Vec<SubmissionEvent>,
    files: Vec<FileMovement>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn push_event(&mut self, job_id: Uuid, event: NewEvent) -> Result<SubmissionEvent> {
        if event.event_type.trim().is_empty() {
            bail!("event_type must not be blank");
        }
        let sub = self
            .submissions
            .get(&job_id)
            .cloned()
            .ok_or(SubmissionNotFound(job_id))?;
        let ev = SubmissionEvent {
            id: self.next_id(),
            submission_id: sub.id,
            job_id,
            actor: sub.actor,
            service_type: sub.service_type,
            event_type: event.event_type,
            message: event.message,
            meta: event.meta,
            created_at_utc: Utc::now(),
        };
        self.events.push(ev.clone());
        Ok(ev)
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait::async_trait]
impl SubmissionStore for MemoryStore {
    async fn create_submission(&self, new: &NewSubmission) -> Result<Submission> {
        let mut g = self.lock()?;
        if g.submissions.contains_key(&new.job_id) {
            return Err(anyhow!("duplicate job_id: {}", new.job_id));
        }
        let sub = Submission {
            id: g.next_id(),
            job_id: new.job_id,
            actor: new.actor.clone(),
            service_type: new.service_type,
            base_path: new.base_path.clone(),
            artifacts: ArtifactPaths::default(),
            status: SubmissionStatus::Received,
            created_at_utc: Utc::now(),
        };
        g.submissions.insert(new.job_id, sub.clone());
        Ok(sub)
    }

    async fn set_artifacts(&self, job_id: Uuid, artifacts: &ArtifactPaths) -> Result<()> {
        let mut g = self.lock()?;
        let sub = g
            .submissions
            .get_mut(&job_id)
            .ok_or(SubmissionNotFound(job_id))?;
        sub.artifacts = artifacts.clone();
        Ok(())
    }

    async fn transition_status(
        &self,
        job_id: Uuid,
        from: SubmissionStatus,
        to: SubmissionStatus,
        event: NewEvent,
    ) -> Result<SubmissionEvent> {
        check_transition(job_id, from, to)?;

        let mut g = self.lock()?;
        let current = g
            .submissions
            .get(&job_id)
            .map(|s| s.status)
            .ok_or(SubmissionNotFound(job_id))?;
        if current != from {
            return Err(TransitionRejected {
                job_id,
                from,
                to,
                actual: Some(current),
            }
            .into());
        }

        let event = NewEvent {
            meta: transition_meta(event.meta, from, to),
            ..event
        };
        let ev = g.push_event(job_id, event)?;
        if let Some(sub) = g.submissions.get_mut(&job_id) {
            sub.status = to;
        }
        Ok(ev)
    }

    async fn append_event(&self, job_id: Uuid, event: NewEvent) -> Result<SubmissionEvent> {
        self.lock()?.push_event(job_id, event)
    }

    async fn append_file_movement(&self, job_id: Uuid, mv: &NewFileMovement) -> Result<FileMovement> {
        let mut g = self.lock()?;
        let submission_id = g
            .submissions
            .get(&job_id)
            .map(|s| s.id)
            .ok_or(SubmissionNotFound(job_id))?;
        let row = FileMovement {
            id: g.next_id(),
            submission_id,
            job_id,
            file_role: mv.file_role.as_str().to_string(),
            file_name: mv.file_name.clone(),
            file_path: mv.file_path.clone(),
            mime_type: mv.mime_type.clone(),
            size_bytes: mv.size_bytes,
            sha256: mv.sha256.clone(),
            created_at_utc: Utc::now(),
        };
        g.files.push(row.clone());
        Ok(row)
    }

    async fn fetch_submission(&self, job_id: Uuid) -> Result<Option<Submission>> {
        Ok(self.lock()?.submissions.get(&job_id).cloned())
    }

    async fn list_events(&self, job_id: Uuid) -> Result<Vec<SubmissionEvent>> {
        let g = self.lock()?;
        Ok(g.events.iter().filter(|e| e.job_id == job_id).cloned().collect())
    }

    async fn list_file_movements(&self, job_id: Uuid) -> Result<Vec<FileMovement>> {
        let g = self.lock()?;
        Ok(g.files.iter().filter(|f| f.job_id == job_id).cloned().collect())
    }
}
