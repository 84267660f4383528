//! Job audit mirror: an untouched chain verifies, an edited or removed line
//! is located.

use ksi_audit::{read_events, verify_hash_chain, AuditWriter, VerifyResult, AUDIT_FILE_NAME};
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

fn write_events(dir: &Path, n: usize) -> PathBuf {
    let path = dir.join(AUDIT_FILE_NAME);
    let job_id = Uuid::new_v4();
    let mut writer = AuditWriter::new(&path, true).unwrap();
    for i in 0..n {
        writer
            .append(
                job_id,
                "STATUS_CHANGED",
                &format!("step {i}"),
                json!({"index": i, "to_status": format!("S{i}")}),
            )
            .unwrap();
    }
    path
}

#[test]
fn untampered_chain_verifies_valid() {
    let tmp = TempDir::new().unwrap();
    let path = write_events(tmp.path(), 5);

    assert_eq!(verify_hash_chain(&path).unwrap(), VerifyResult::Valid { lines: 5 });
}

#[test]
fn tampered_payload_detected_at_its_line() {
    let tmp = TempDir::new().unwrap();
    let path = write_events(tmp.path(), 5);

    let content = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut ev: serde_json::Value = serde_json::from_str(&lines[2]).unwrap();
    ev["payload"]["to_status"] = json!("READY");
    lines[2] = serde_json::to_string(&ev).unwrap();
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    match verify_hash_chain(&path).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 3, "{reason}");
            assert!(reason.contains("hash_self mismatch"), "{reason}");
        }
        other => panic!("expected broken chain, got {other:?}"),
    }
}

#[test]
fn deleted_line_detected() {
    let tmp = TempDir::new().unwrap();
    let path = write_events(tmp.path(), 5);

    let content = std::fs::read_to_string(&path).unwrap();
    let kept: Vec<&str> = content
        .lines()
        .enumerate()
        .filter(|(i, _)| *i != 2)
        .map(|(_, l)| l)
        .collect();
    std::fs::write(&path, kept.join("\n") + "\n").unwrap();

    match verify_hash_chain(&path).unwrap() {
        VerifyResult::Broken { line, reason } => {
            assert_eq!(line, 3);
            assert!(reason.contains("hash_prev mismatch"), "{reason}");
        }
        other => panic!("expected broken chain, got {other:?}"),
    }
}

#[test]
fn resumed_writer_continues_the_chain() {
    let tmp = TempDir::new().unwrap();
    let path = write_events(tmp.path(), 2);

    let mut w = AuditWriter::resume(&path, true).unwrap();
    assert_eq!(w.seq(), 2);
    w.append(Uuid::new_v4(), "ERROR", "late failure", json!({"detail": "x"}))
        .unwrap();

    assert_eq!(verify_hash_chain(&path).unwrap(), VerifyResult::Valid { lines: 3 });
    let events = read_events(&path).unwrap();
    assert_eq!(events.last().unwrap().event_type, "ERROR");
}

#[test]
fn empty_log_is_valid() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(AUDIT_FILE_NAME);
    std::fs::write(&path, "").unwrap();

    assert_eq!(verify_hash_chain(&path).unwrap(), VerifyResult::Valid { lines: 0 });
}

#[test]
fn plain_mirror_without_chain_has_no_hashes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(AUDIT_FILE_NAME);
    let mut w = AuditWriter::new(&path, false).unwrap();
    let ev = w
        .append(Uuid::new_v4(), "SUBMISSION_CREATED", "created", json!({}))
        .unwrap();

    assert!(ev.hash_prev.is_none() && ev.hash_self.is_none());
    assert_eq!(verify_hash_chain(&path).unwrap(), VerifyResult::Valid { lines: 1 });
}
