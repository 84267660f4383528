use anyhow::{bail, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Overrides `storage.upload_dir`.
pub const ENV_UPLOAD_DIR: &str = "KSI_UPLOAD_DIR";

/// Every pointer [`PipelineConfig::from_config_json`] reads.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/storage/upload_dir",
    "/storage/split_dir",
    "/storage/split_wip_dir",
    "/split/download_prefix",
    "/audit/jsonl_mirror",
    "/audit/hash_chain",
];

const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_SPLIT_DIR: &str = "split";
const DEFAULT_SPLIT_WIP_DIR: &str = "split_wip";
const DEFAULT_DOWNLOAD_PREFIX: &str = "/nfe-55-65/download";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineConfig {
    /// Root of all job folders. Absolute once loaded.
    pub upload_dir: PathBuf,
    /// Split output folder name inside a job folder.
    pub split_dir: String,
    /// Transient folder name inside `split_dir`.
    pub split_wip_dir: String,
    pub download_prefix: String,
    /// Write `audit.jsonl` into each job folder.
    pub audit_jsonl_mirror: bool,
    pub audit_hash_chain: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            split_dir: DEFAULT_SPLIT_DIR.to_string(),
            split_wip_dir: DEFAULT_SPLIT_WIP_DIR.to_string(),
            download_prefix: DEFAULT_DOWNLOAD_PREFIX.to_string(),
            audit_jsonl_mirror: true,
            audit_hash_chain: true,
        }
    }
}

impl PipelineConfig {
    /// Typed view of a merged config tree. Missing keys take defaults;
    /// present keys with the wrong type are errors.
    pub fn from_config_json(v: &Value) -> Result<Self> {
        let d = Self::default();
        let cfg = Self {
            upload_dir: read_str(v, "/storage/upload_dir")?
                .map(PathBuf::from)
                .unwrap_or(d.upload_dir),
            split_dir: read_str(v, "/storage/split_dir")?.unwrap_or(d.split_dir),
            split_wip_dir: read_str(v, "/storage/split_wip_dir")?.unwrap_or(d.split_wip_dir),
            download_prefix: read_str(v, "/split/download_prefix")?.unwrap_or(d.download_prefix),
            audit_jsonl_mirror: read_bool(v, "/audit/jsonl_mirror")?.unwrap_or(d.audit_jsonl_mirror),
            audit_hash_chain: read_bool(v, "/audit/hash_chain")?.unwrap_or(d.audit_hash_chain),
        };
        cfg.check()?;
        Ok(cfg)
    }

    /// Apply env overrides through `lookup` (normally `std::env::var`).
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_UPLOAD_DIR).filter(|s| !s.trim().is_empty()) {
            self.upload_dir = PathBuf::from(dir.trim());
        }
        self
    }

    /// Make `upload_dir` absolute against `cwd`.
    pub fn resolved_against(mut self, cwd: &Path) -> Self {
        if self.upload_dir.is_relative() {
            self.upload_dir = cwd.join(&self.upload_dir);
        }
        self
    }

    /// Defaults, process env, current directory.
    pub fn from_env() -> Result<Self> {
        let cwd = std::env::current_dir().context("current_dir failed")?;
        Ok(Self::default()
            .with_env_overrides(|k| std::env::var(k).ok())
            .resolved_against(&cwd))
    }

    /// Config tree, then process env, then current directory.
    pub fn load(config_json: &Value) -> Result<Self> {
        let cwd = std::env::current_dir().context("current_dir failed")?;
        Ok(Self::from_config_json(config_json)?
            .with_env_overrides(|k| std::env::var(k).ok())
            .resolved_against(&cwd))
    }

    fn check(&self) -> Result<()> {
        for (key, name) in [
            ("storage.split_dir", &self.split_dir),
            ("storage.split_wip_dir", &self.split_wip_dir),
        ] {
            if !is_single_segment(name) {
                bail!("CONFIG_INVALID {key}: must be a single folder name, got {name:?}");
            }
        }
        if self.split_dir == self.split_wip_dir {
            bail!("CONFIG_INVALID storage.split_wip_dir must differ from storage.split_dir");
        }
        if self.upload_dir.as_os_str().is_empty() {
            bail!("CONFIG_INVALID storage.upload_dir is empty");
        }
        Ok(())
    }
}

fn is_single_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\'])
}

fn read_str(v: &Value, ptr: &str) -> Result<Option<String>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => bail!("CONFIG_INVALID {ptr}: expected string, got {other}"),
    }
}

fn read_bool(v: &Value, ptr: &str) -> Result<Option<bool>> {
    match v.pointer(ptr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => bail!("CONFIG_INVALID {ptr}: expected bool, got {other}"),
    }
}
