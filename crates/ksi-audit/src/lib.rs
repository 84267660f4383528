//! ksi-audit
//!
//! Per-job JSON Lines mirror of the submission audit trail. The database is
//! the record of truth; this file travels with the job folder so a job can be
//! inspected without database access.
//!
//! With the hash chain enabled each line carries `hash_prev` and `hash_self`,
//! so edits and deletions are detectable with [`verify_hash_chain`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File name of the mirror inside a job folder.
pub const AUDIT_FILE_NAME: &str = "audit.jsonl";

/// One mirrored event. Field order on disk is alphabetical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: Uuid,
    pub job_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub event_type: String,
    pub message: String,
    pub payload: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

/// Append-only writer for one job's mirror.
#[derive(Debug)]
pub struct AuditWriter {
    path: PathBuf,
    hash_chain: bool,
    /// `hash_self` of the last line written, if chained.
    last_hash: Option<String>,
    /// Lines in the file so far.
    seq: u64,
}

impl AuditWriter {
    /// Writer that starts a new chain at `path`. Parent folders are created.
    pub fn new(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("create audit dir {}", dir.display()))?;
        }
        Ok(Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        })
    }

    /// Writer that continues whatever is already at `path`.
    pub fn resume(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let mut w = Self::new(path, hash_chain)?;
        if w.path.exists() {
            let existing = read_events(&w.path)?;
            w.seq = existing.len() as u64;
            w.last_hash = existing.into_iter().last().and_then(|ev| ev.hash_self);
        }
        Ok(w)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_hash(&self) -> Option<String> {
        self.last_hash.clone()
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Write one line and return the event as written.
    pub fn append(
        &mut self,
        job_id: Uuid,
        event_type: &str,
        message: &str,
        payload: Value,
    ) -> Result<AuditEvent> {
        let mut ev = AuditEvent {
            event_id: derive_event_id(job_id, self.last_hash.as_deref(), &payload, self.seq)?,
            job_id,
            ts_utc: Utc::now(),
            event_type: event_type.to_owned(),
            message: message.to_owned(),
            payload,
            hash_prev: None,
            hash_self: None,
        };
        if self.hash_chain {
            ev.hash_prev = self.last_hash.clone();
            ev.hash_self = Some(compute_event_hash(&ev)?);
        }

        let mut line = canonical_line(&ev)?;
        line.push('\n');
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| f.write_all(line.as_bytes()))
            .with_context(|| format!("append to {}", self.path.display()))?;

        self.seq += 1;
        self.last_hash = ev.hash_self.clone();
        Ok(ev)
    }
}

/// Non-blank lines of a JSONL document, parsed, with their 1-based line number.
fn parse_lines(content: &str) -> impl Iterator<Item = Result<(usize, AuditEvent)>> + '_ {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str::<AuditEvent>(l.trim())
                .map(|ev| (i + 1, ev))
                .with_context(|| format!("audit line {} is not an event", i + 1))
        })
}

fn read_log(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("read audit log {}", path.display()))
}

/// Every event of a mirror file, in file order.
pub fn read_events(path: impl AsRef<Path>) -> Result<Vec<AuditEvent>> {
    let content = read_log(path.as_ref())?;
    parse_lines(&content).map(|r| r.map(|(_, ev)| ev)).collect()
}

/// Compact JSON with object keys in sorted order at every depth.
fn canonical_line<T: Serialize>(v: &T) -> Result<String> {
    fn ordered(v: Value) -> Value {
        match v {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, ordered(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(items) => Value::Array(items.into_iter().map(ordered).collect()),
            other => other,
        }
    }
    let v = serde_json::to_value(v).context("audit event to json")?;
    serde_json::to_string(&ordered(v)).context("audit event to string")
}

/// sha256 (hex) of the canonical event with `hash_self` left out.
pub fn compute_event_hash(ev: &AuditEvent) -> Result<String> {
    let unsealed = AuditEvent {
        hash_self: None,
        ..ev.clone()
    };
    let digest = Sha256::digest(canonical_line(&unsealed)?.as_bytes());
    Ok(hex::encode(digest))
}

/// Event id from chain position: first 16 bytes of
/// `sha256(job_id | prev_hash | seq | canonical(payload))`.
///
/// Same inputs give the same id, so a replayed append is recognisable.
pub fn derive_event_id(
    job_id: Uuid,
    prev_hash: Option<&str>,
    payload: &Value,
    seq: u64,
) -> Result<Uuid> {
    let digest = Sha256::new()
        .chain_update(job_id.as_bytes())
        .chain_update(prev_hash.unwrap_or_default().as_bytes())
        .chain_update(seq.to_be_bytes())
        .chain_update(canonical_line(payload)?.as_bytes())
        .finalize();

    let mut id = [0u8; 16];
    id.copy_from_slice(&digest[..16]);
    Ok(Uuid::from_bytes(id))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyResult {
    Valid { lines: usize },
    /// First bad line (1-based).
    Broken { line: usize, reason: String },
}

/// Check every link of a mirror file.
pub fn verify_hash_chain(path: impl AsRef<Path>) -> Result<VerifyResult> {
    verify_hash_chain_str(&read_log(path.as_ref())?)
}

/// [`verify_hash_chain`] over in-memory content.
///
/// Lines without `hash_self` are accepted as long as the `hash_prev` links
/// line up, so an unchained mirror verifies trivially.
pub fn verify_hash_chain_str(content: &str) -> Result<VerifyResult> {
    let mut expected_prev: Option<String> = None;
    let mut lines = 0usize;

    for parsed in parse_lines(content) {
        let (line, ev) = parsed?;
        lines += 1;

        if ev.hash_prev != expected_prev {
            let reason = format!(
                "hash_prev mismatch: expected {expected_prev:?}, got {:?}",
                ev.hash_prev
            );
            return Ok(VerifyResult::Broken { line, reason });
        }
        if let Some(claimed) = &ev.hash_self {
            let actual = compute_event_hash(&ev)?;
            if *claimed != actual {
                let reason = format!("hash_self mismatch: claimed {claimed}, recomputed {actual}");
                return Ok(VerifyResult::Broken { line, reason });
            }
        }
        expected_prev = ev.hash_self;
    }

    Ok(VerifyResult::Valid { lines })
}
