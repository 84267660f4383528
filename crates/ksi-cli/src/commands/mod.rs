//! Command handlers for ksi-cli.
//!
//! Shared helpers live here; command-specific logic lives in the submodules.

pub mod job;
pub mod keys;
pub mod submit;

use anyhow::{Context, Result};
use ksi_audit::VerifyResult;
use ksi_config::UnusedKeyPolicy;
use std::path::Path;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

pub fn parse_job_id(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s.trim()).context("invalid job_id uuid")
}

/// Read a secret from the named env var. Secrets are never taken as
/// command-line literals.
pub fn secret_from_env(var: &str) -> Result<String> {
    std::env::var(var).with_context(|| format!("env var {var} is not set"))
}

// ---------------------------------------------------------------------------
// Small commands
// ---------------------------------------------------------------------------

pub fn config_hash(paths: &[String], strict: bool) -> Result<()> {
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    let loaded = ksi_config::load_layered_yaml(&refs)?;

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = ksi_config::report_unused_keys(&loaded.config_json, policy)?;
    for p in &report.unused_leaf_pointers {
        tracing::warn!(pointer = %p, "config key is not read by anything");
    }

    println!("config_hash={}", loaded.config_hash);
    println!("{}", loaded.canonical_json);
    Ok(())
}

pub fn audit_verify(path: &Path) -> Result<()> {
    match ksi_audit::verify_hash_chain(path)? {
        VerifyResult::Valid { lines } => {
            println!("audit_valid=true lines={lines}");
            Ok(())
        }
        VerifyResult::Broken { line, reason } => {
            println!("audit_valid=false line={line}");
            anyhow::bail!("audit chain broken at line {line}: {reason}")
        }
    }
}
