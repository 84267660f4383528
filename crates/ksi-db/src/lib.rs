//! ksi-db
//!
//! Persistence of submissions, their ordered audit events and file
//! movements. [`SubmissionStore`] is the seam the pipeline depends on;
//! [`PgStore`] is the production implementation and [`MemoryStore`] backs
//! tests and dry runs.

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use anyhow::{Context, Result};
use ksi_schemas::{
    meta_key, ArtifactPaths, FileMovement, NewEvent, NewFileMovement, NewSubmission, Submission,
    SubmissionEvent, SubmissionStatus,
};
use serde_json::{json, Value};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::fmt;
use uuid::Uuid;

pub const ENV_DB_URL: &str = "KSI_DATABASE_URL";

/// Connect to Postgres using KSI_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL)
        .with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_submissions_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='submissions'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_submissions_table: exists,
    })
}

// ---------------------------------------------------------------------------
// Store seam
// ---------------------------------------------------------------------------

/// Everything the pipeline persists.
///
/// `transition_status` is the only way status changes: it checks the
/// forward-only rule, requires the stored status to still be `from`, and
/// writes the status together with its event.
#[async_trait::async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn create_submission(&self, new: &NewSubmission) -> Result<Submission>;

    async fn set_artifacts(&self, job_id: Uuid, artifacts: &ArtifactPaths) -> Result<()>;

    async fn transition_status(
        &self,
        job_id: Uuid,
        from: SubmissionStatus,
        to: SubmissionStatus,
        event: NewEvent,
    ) -> Result<SubmissionEvent>;

    /// Event without a status change.
    async fn append_event(&self, job_id: Uuid, event: NewEvent) -> Result<SubmissionEvent>;

    async fn append_file_movement(&self, job_id: Uuid, mv: &NewFileMovement) -> Result<FileMovement>;

    async fn fetch_submission(&self, job_id: Uuid) -> Result<Option<Submission>>;

    /// Oldest first.
    async fn list_events(&self, job_id: Uuid) -> Result<Vec<SubmissionEvent>>;

    /// Oldest first.
    async fn list_file_movements(&self, job_id: Uuid) -> Result<Vec<FileMovement>>;
}

/// A status change refused by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRejected {
    pub job_id: Uuid,
    pub from: SubmissionStatus,
    pub to: SubmissionStatus,
    /// Stored status when it no longer matched `from`.
    pub actual: Option<SubmissionStatus>,
}

impl fmt::Display for TransitionRejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.actual {
            Some(actual) if actual != self.from => write!(
                f,
                "transition {} -> {} rejected for job {}: status is {}",
                self.from, self.to, self.job_id, actual
            ),
            _ => write!(
                f,
                "transition {} -> {} not allowed (job {})",
                self.from, self.to, self.job_id
            ),
        }
    }
}

impl std::error::Error for TransitionRejected {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionNotFound(pub Uuid);

impl fmt::Display for SubmissionNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "submission not found: {}", self.0)
    }
}

impl std::error::Error for SubmissionNotFound {}

/// Event metadata with `from_status` / `to_status` set. Non-object metadata
/// is kept under `detail`.
pub fn transition_meta(meta: Value, from: SubmissionStatus, to: SubmissionStatus) -> Value {
    let mut map = match meta {
        Value::Object(m) => m,
        Value::Null => serde_json::Map::new(),
        other => {
            let mut m = serde_json::Map::new();
            m.insert(meta_key::DETAIL.to_string(), other);
            m
        }
    };
    map.insert(meta_key::FROM_STATUS.to_string(), json!(from.as_str()));
    map.insert(meta_key::TO_STATUS.to_string(), json!(to.as_str()));
    Value::Object(map)
}

fn check_transition(job_id: Uuid, from: SubmissionStatus, to: SubmissionStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(TransitionRejected {
            job_id,
            from,
            to,
            actual: None,
        }
        .into())
    }
}
