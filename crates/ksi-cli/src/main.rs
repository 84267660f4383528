mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ksi")]
#[command(about = "Access-key submission intake CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> site ...)
        #[arg(required = true)]
        paths: Vec<String>,

        /// Fail instead of warning when the merged config has keys nothing reads
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Count the keys of a batch file per model
    Classify {
        #[arg(long)]
        file: PathBuf,

        /// Enforce a model (55 | 65 | 57 | 59); exits non-zero on mismatch
        #[arg(long)]
        expected: Option<String>,
    },

    /// Split a batch file into per-model files under --out
    Split {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        out: PathBuf,

        #[arg(long, default_value = ksi_split::DEFAULT_DOWNLOAD_PREFIX)]
        download_prefix: String,
    },

    /// Run one submission through the intake pipeline
    Submit(commands::submit::SubmitArgs),

    /// Inspect a stored job
    Job {
        #[command(subcommand)]
        cmd: JobCmd,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum JobCmd {
    /// Print the submission row
    Status {
        #[arg(long)]
        job_id: String,
    },
    /// Print the event trail, one JSON object per line
    Events {
        #[arg(long)]
        job_id: String,
    },
    /// Print recorded file movements, one JSON object per line
    Files {
        #[arg(long)]
        job_id: String,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a job's audit.jsonl
    Verify {
        #[arg(long)]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = ksi_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = ksi_db::status(&pool).await?;
                    println!("db_ok={} has_submissions_table={}", s.ok, s.has_submissions_table);
                }
                DbCmd::Migrate => {
                    ksi_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths, strict } => commands::config_hash(&paths, strict)?,

        Commands::Classify { file, expected } => {
            commands::keys::classify(&file, expected.as_deref())?
        }

        Commands::Split {
            file,
            out,
            download_prefix,
        } => commands::keys::split(&file, &out, &download_prefix)?,

        Commands::Submit(args) => commands::submit::run(args).await?,

        Commands::Job { cmd } => {
            let store = commands::job::pg_store().await?;
            match cmd {
                JobCmd::Status { job_id } => commands::job::status(&store, &job_id).await?,
                JobCmd::Events { job_id } => commands::job::events(&store, &job_id).await?,
                JobCmd::Files { job_id } => commands::job::files(&store, &job_id).await?,
            }
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => commands::audit_verify(&path)?,
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays `key=value`.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
