use crate::{check_transition, transition_meta, SubmissionNotFound, SubmissionStore, TransitionRejected};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ksi_schemas::{
    ArtifactPaths, FileMovement, NewEvent, NewFileMovement, NewSubmission, ServiceType, Submission,
    SubmissionEvent, SubmissionStatus,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const SUBMISSION_COLUMNS: &str = r#"
    id, job_id, actor, service_type, base_path,
    keys_path, cert_path, sheet_path, csv_path, gov_login,
    status, created_at_utc
"#;

const EVENT_COLUMNS: &str = r#"
    id, submission_id, job_id, actor, service_type, event_type, message, meta, created_at_utc
"#;

const FILE_COLUMNS: &str = r#"
    id, submission_id, job_id, file_role, file_name, file_path,
    mime_type, size_bytes, sha256, created_at_utc
"#;

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn submission_from_row(row: &PgRow) -> Result<Submission> {
    Ok(Submission {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        actor: row.try_get("actor")?,
        service_type: ServiceType::parse(&row.try_get::<String, _>("service_type")?)?,
        base_path: row.try_get("base_path")?,
        artifacts: ArtifactPaths {
            keys_path: row.try_get("keys_path")?,
            cert_path: row.try_get("cert_path")?,
            sheet_path: row.try_get("sheet_path")?,
            csv_path: row.try_get("csv_path")?,
            gov_login: row.try_get("gov_login")?,
        },
        status: SubmissionStatus::parse(&row.try_get::<String, _>("status")?)?,
        created_at_utc: row.try_get::<DateTime<Utc>, _>("created_at_utc")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<SubmissionEvent> {
    Ok(SubmissionEvent {
        id: row.try_get("id")?,
        submission_id: row.try_get("submission_id")?,
        job_id: row.try_get("job_id")?,
        actor: row.try_get("actor")?,
        service_type: ServiceType::parse(&row.try_get::<String, _>("service_type")?)?,
        event_type: row.try_get("event_type")?,
        message: row.try_get("message")?,
        meta: row.try_get("meta")?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

fn file_from_row(row: &PgRow) -> Result<FileMovement> {
    Ok(FileMovement {
        id: row.try_get("id")?,
        submission_id: row.try_get("submission_id")?,
        job_id: row.try_get("job_id")?,
        file_role: row.try_get("file_role")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        mime_type: row.try_get("mime_type")?,
        size_bytes: row.try_get("size_bytes")?,
        sha256: row.try_get("sha256")?,
        created_at_utc: row.try_get("created_at_utc")?,
    })
}

/// Event insert that copies identity and denormalized fields from the
/// submission row. Returns no row when the job does not exist.
fn insert_event_sql() -> String {
    format!(
        r#"
        insert into submission_events (
          submission_id, job_id, actor, service_type, event_type, message, meta
        )
        select s.id, s.job_id, s.actor, s.service_type, $2, $3, $4
        from submissions s
        where s.job_id = $1
        returning {EVENT_COLUMNS}
        "#
    )
}

#[async_trait::async_trait]
impl SubmissionStore for PgStore {
    async fn create_submission(&self, new: &NewSubmission) -> Result<Submission> {
        let sql = format!(
            r#"
            insert into submissions (job_id, actor, service_type, base_path)
            values ($1, $2, $3, $4)
            returning {SUBMISSION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(new.job_id)
            .bind(&new.actor)
            .bind(new.service_type.as_str())
            .bind(&new.base_path)
            .fetch_one(&self.pool)
            .await
            .context("create_submission failed")?;
        submission_from_row(&row)
    }

    async fn set_artifacts(&self, job_id: Uuid, a: &ArtifactPaths) -> Result<()> {
        let res = sqlx::query(
            r#"
            update submissions
            set keys_path = $2,
                cert_path = $3,
                sheet_path = $4,
                csv_path = $5,
                gov_login = $6,
                updated_at_utc = now()
            where job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(&a.keys_path)
        .bind(&a.cert_path)
        .bind(&a.sheet_path)
        .bind(&a.csv_path)
        .bind(&a.gov_login)
        .execute(&self.pool)
        .await
        .context("set_artifacts failed")?;

        if res.rows_affected() == 0 {
            return Err(SubmissionNotFound(job_id).into());
        }
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
        let meta = transition_meta(event.meta, from, to);

        let mut tx = self.pool.begin().await.context("begin tx failed")?;

        let updated = sqlx::query(
            r#"
            update submissions
            set status = $3,
                updated_at_utc = now()
            where job_id = $1
              and status = $2
            "#,
        )
        .bind(job_id)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&mut *tx)
        .await
        .context("transition_status update failed")?;

        if updated.rows_affected() == 0 {
            tx.rollback().await.context("rollback failed")?;
            let actual = self.fetch_submission(job_id).await?.map(|s| s.status);
            if actual.is_none() {
                return Err(SubmissionNotFound(job_id).into());
            }
            return Err(TransitionRejected {
                job_id,
                from,
                to,
                actual,
            }
            .into());
        }

        let row = sqlx::query(&insert_event_sql())
            .bind(job_id)
            .bind(&event.event_type)
            .bind(&event.message)
            .bind(&meta)
            .fetch_one(&mut *tx)
            .await
            .context("transition_status event insert failed")?;
        let ev = event_from_row(&row)?;

        tx.commit().await.context("commit failed")?;
        Ok(ev)
    }

    async fn append_event(&self, job_id: Uuid, event: NewEvent) -> Result<SubmissionEvent> {
        let row = sqlx::query(&insert_event_sql())
            .bind(job_id)
            .bind(&event.event_type)
            .bind(&event.message)
            .bind(&event.meta)
            .fetch_optional(&self.pool)
            .await
            .context("append_event failed")?;
        match row {
            Some(r) => event_from_row(&r),
            None => Err(SubmissionNotFound(job_id).into()),
        }
    }

    async fn append_file_movement(&self, job_id: Uuid, mv: &NewFileMovement) -> Result<FileMovement> {
        let sql = format!(
            r#"
            insert into file_movements (
              submission_id, job_id, file_role, file_name, file_path, mime_type, size_bytes, sha256
            )
            select s.id, s.job_id, $2, $3, $4, $5, $6, $7
            from submissions s
            where s.job_id = $1
            returning {FILE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(job_id)
            .bind(mv.file_role.as_str())
            .bind(&mv.file_name)
            .bind(&mv.file_path)
            .bind(&mv.mime_type)
            .bind(mv.size_bytes)
            .bind(&mv.sha256)
            .fetch_optional(&self.pool)
            .await
            .context("append_file_movement failed")?;
        match row {
            Some(r) => file_from_row(&r),
            None => Err(SubmissionNotFound(job_id).into()),
        }
    }

    async fn fetch_submission(&self, job_id: Uuid) -> Result<Option<Submission>> {
        let sql = format!("select {SUBMISSION_COLUMNS} from submissions where job_id = $1");
        let row = sqlx::query(&sql)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .context("fetch_submission failed")?;
        row.as_ref().map(submission_from_row).transpose()
    }

    async fn list_events(&self, job_id: Uuid) -> Result<Vec<SubmissionEvent>> {
        let sql = format!("select {EVENT_COLUMNS} from submission_events where job_id = $1 order by id");
        let rows = sqlx::query(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .context("list_events failed")?;
        rows.iter().map(event_from_row).collect()
    }

    async fn list_file_movements(&self, job_id: Uuid) -> Result<Vec<FileMovement>> {
        let sql = format!("select {FILE_COLUMNS} from file_movements where job_id = $1 order by id");
        let rows = sqlx::query(&sql)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await
            .context("list_file_movements failed")?;
        rows.iter().map(file_from_row).collect()
    }
}
