use super::parse_job_id;
use anyhow::{Context, Result};
use ksi_db::{PgStore, SubmissionStore};

pub async fn pg_store() -> Result<PgStore> {
    Ok(PgStore::new(ksi_db::connect_from_env().await?))
}

pub async fn status(store: &dyn SubmissionStore, job_id: &str) -> Result<()> {
    let id = parse_job_id(job_id)?;
    let s = store
        .fetch_submission(id)
        .await?
        .with_context(|| format!("no submission for job_id {id}"))?;

    println!("job_id={}", s.job_id);
    println!("actor={}", s.actor);
    println!("service_type={}", s.service_type);
    println!("status={}", s.status);
    println!("base_path={}", s.base_path);
    println!("created_at_utc={}", s.created_at_utc.to_rfc3339());
    println!("keys_path={}", s.artifacts.keys_path.unwrap_or_default());
    println!("cert_path={}", s.artifacts.cert_path.unwrap_or_default());
    println!("sheet_path={}", s.artifacts.sheet_path.unwrap_or_default());
    println!("csv_path={}", s.artifacts.csv_path.unwrap_or_default());
    Ok(())
}

pub async fn events(store: &dyn SubmissionStore, job_id: &str) -> Result<()> {
    let id = parse_job_id(job_id)?;
    for ev in store.list_events(id).await? {
        println!("{}", serde_json::to_string(&ev)?);
    }
    Ok(())
}

pub async fn files(store: &dyn SubmissionStore, job_id: &str) -> Result<()> {
    let id = parse_job_id(job_id)?;
    for mv in store.list_file_movements(id).await? {
        println!("{}", serde_json::to_string(&mv)?);
    }
    Ok(())
}
