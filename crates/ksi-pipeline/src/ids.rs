use uuid::Uuid;

/// Source of job identifiers.
pub trait JobIdSource: Send + Sync {
    fn next_job_id(&self) -> Uuid;
}

/// UUID v4.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomJobIds;

impl JobIdSource for RandomJobIds {
    fn next_job_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}
