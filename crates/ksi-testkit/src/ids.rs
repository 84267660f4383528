use ksi_pipeline::JobIdSource;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// `00000000-0000-0000-0000-000000000001`, `...02`, ...
#[derive(Debug, Default)]
pub struct SequentialJobIds {
    next: AtomicU64,
}

impl SequentialJobIds {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobIdSource for SequentialJobIds {
    fn next_job_id(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(u128::from(n))
    }
}

/// Always the same id. Useful for checking duplicate handling.
#[derive(Debug, Clone, Copy)]
pub struct FixedJobId(pub Uuid);

impl JobIdSource for FixedJobId {
    fn next_job_id(&self) -> Uuid {
        self.0
    }
}
