use anyhow::{anyhow, Result};
use ksi_db::{MemoryStore, SubmissionStore};
use ksi_schemas::{
    ArtifactPaths, FileMovement, NewEvent, NewFileMovement, NewSubmission, Submission,
    SubmissionEvent, SubmissionStatus,
};
use uuid::Uuid;

/// [`MemoryStore`] with injected failures. Reads always pass through.
#[derive(Debug, Default)]
pub struct FailingStore {
    inner: MemoryStore,
    fail_create: bool,
    fail_set_artifacts: bool,
    fail_file_movements: bool,
    fail_transition_to: Option<SubmissionStatus>,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn fail_set_artifacts(mut self) -> Self {
        self.fail_set_artifacts = true;
        self
    }

    pub fn fail_file_movements(mut self) -> Self {
        self.fail_file_movements = true;
        self
    }

    pub fn fail_transition_to(mut self, status: SubmissionStatus) -> Self {
        self.fail_transition_to = Some(status);
        self
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

#[async_trait::async_trait]
impl SubmissionStore for FailingStore {
    async fn create_submission(&self, new: &NewSubmission) -> Result<Submission> {
        if self.fail_create {
            return Err(anyhow!("injected failure: create_submission"));
        }
        self.inner.create_submission(new).await
    }

    async fn set_artifacts(&self, job_id: Uuid, artifacts: &ArtifactPaths) -> Result<()> {
        if self.fail_set_artifacts {
            return Err(anyhow!("injected failure: set_artifacts"));
        }
        self.inner.set_artifacts(job_id, artifacts).await
    }

    async fn transition_status(
        &self,
        job_id: Uuid,
        from: SubmissionStatus,
        to: SubmissionStatus,
        event: NewEvent,
    ) -> Result<SubmissionEvent> {
        if self.fail_transition_to == Some(to) {
            return Err(anyhow!("injected failure: transition to {to}"));
        }
        self.inner.transition_status(job_id, from, to, event).await
    }

    async fn append_event(&self, job_id: Uuid, event: NewEvent) -> Result<SubmissionEvent> {
        self.inner.append_event(job_id, event).await
    }

    async fn append_file_movement(&self, job_id: Uuid, mv: &NewFileMovement) -> Result<FileMovement> {
        if self.fail_file_movements {
            return Err(anyhow!("injected failure: append_file_movement"));
        }
        self.inner.append_file_movement(job_id, mv).await
    }

    async fn fetch_submission(&self, job_id: Uuid) -> Result<Option<Submission>> {
        self.inner.fetch_submission(job_id).await
    }

    async fn list_events(&self, job_id: Uuid) -> Result<Vec<SubmissionEvent>> {
        self.inner.list_events(job_id).await
    }

    async fn list_file_movements(&self, job_id: Uuid) -> Result<Vec<FileMovement>> {
        self.inner.list_file_movements(job_id).await
    }
}
