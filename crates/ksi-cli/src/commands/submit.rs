use super::secret_from_env;
use anyhow::{Context, Result};
use clap::Args;
use ksi_config::PipelineConfig;
use ksi_db::{MemoryStore, PgStore, SubmissionStore};
use ksi_pipeline::{Pipeline, SubmissionRequest};
use ksi_schemas::ServiceType;
use ksi_storage::LocalBlobStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Args)]
pub struct SubmitArgs {
    /// NFE | NFCE | CTE | CFE | SENATRAN
    #[arg(long)]
    pub service: String,

    #[arg(long)]
    pub actor: String,

    /// Key batch (.txt)
    #[arg(long)]
    pub keys: Option<PathBuf>,

    /// Certificate (.pfx)
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Env var holding the certificate password
    #[arg(long)]
    pub cert_password_env: Option<String>,

    /// Spreadsheet (.xlsx)
    #[arg(long)]
    pub sheet: Option<PathBuf>,

    /// Table (.csv)
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// External login id
    #[arg(long)]
    pub gov_login: Option<String>,

    /// Env var holding the external login password
    #[arg(long)]
    pub gov_password_env: Option<String>,

    /// Layered config paths in merge order
    #[arg(long = "config")]
    pub config_paths: Vec<String>,

    /// Keep job state in memory instead of Postgres
    #[arg(long, default_value_t = false)]
    pub memory: bool,
}

fn read_file(path: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok((name, bytes))
}

fn optional_secret(var: Option<&str>) -> Result<Option<String>> {
    var.map(secret_from_env).transpose()
}

fn build_request(args: &SubmitArgs) -> Result<SubmissionRequest> {
    let service = ServiceType::parse(&args.service)?;
    let mut req = SubmissionRequest::new(service, args.actor.as_str());

    if let Some(p) = &args.keys {
        let (name, bytes) = read_file(p)?;
        req = req.with_key_batch(&name, bytes);
    }
    if let Some(p) = &args.cert {
        let (name, bytes) = read_file(p)?;
        req.certificate = Some(ksi_pipeline::Artifact::new(name, bytes));
    }
    req.certificate_password = optional_secret(args.cert_password_env.as_deref())?;
    if let Some(p) = &args.sheet {
        let (name, bytes) = read_file(p)?;
        req = req.with_spreadsheet(&name, bytes);
    }
    if let Some(p) = &args.csv {
        let (name, bytes) = read_file(p)?;
        req = req.with_csv(&name, bytes);
    }
    req.gov_login = args.gov_login.clone();
    req.gov_password = optional_secret(args.gov_password_env.as_deref())?;
    Ok(req)
}

fn load_config(paths: &[String]) -> Result<PipelineConfig> {
    if paths.is_empty() {
        return PipelineConfig::from_env();
    }
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = ksi_config::load_layered_yaml(&refs)?;
    PipelineConfig::load(&loaded.config_json)
}

pub async fn run(args: SubmitArgs) -> Result<()> {
    let req = build_request(&args)?;
    let config = load_config(&args.config_paths)?;

    let store: Arc<dyn SubmissionStore> = if args.memory {
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(PgStore::new(ksi_db::connect_from_env().await?))
    };
    let pipeline = Pipeline::new(config, store, Arc::new(LocalBlobStore));

    match pipeline.submit(req).await {
        Ok(out) => {
            println!("job_id={}", out.job_id);
            println!("status={}", out.status);
            println!("stored_at={}", out.stored_at);
            if let Some(split) = &out.split {
                println!("split_dir={}", split.split_dir);
                println!("{}", split.result.to_json());
            }
            Ok(())
        }
        Err(e) => {
            if let Some(job_id) = e.job_id() {
                println!("job_id={job_id}");
            }
            println!("status={}", e.status());
            Err(e.into())
        }
    }
}
