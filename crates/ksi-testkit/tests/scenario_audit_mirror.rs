use anyhow::Result;
use ksi_audit::{read_events, verify_hash_chain, VerifyResult, AUDIT_FILE_NAME};
use ksi_config::PipelineConfig;
use ksi_db::{MemoryStore, SubmissionStore};
use ksi_pipeline::{Pipeline, SubmissionRequest};
use ksi_schemas::{ModelCode, ServiceType};
use ksi_storage::LocalBlobStore;
use ksi_testkit::{key_batch, test_config};
use std::path::Path;
use std::sync::Arc;

fn request() -> SubmissionRequest {
    SubmissionRequest::new(ServiceType::Cte, "ana")
        .with_key_batch("keys.txt", key_batch(&[(ModelCode::M57, 3)]))
        .with_certificate("c.pfx", b"pfx".to_vec(), "pw")
}

fn pipeline(cfg: PipelineConfig) -> (Pipeline, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (Pipeline::new(cfg, store.clone(), Arc::new(LocalBlobStore)), store)
}

#[tokio::test]
async fn mirror_matches_store_events() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let (p, store) = pipeline(test_config(tmp.path()));

    let out = p.submit(request()).await?;
    let path = Path::new(&out.stored_at).join(AUDIT_FILE_NAME);
    assert_eq!(verify_hash_chain(&path)?, VerifyResult::Valid { lines: 6 });
    let mirrored = read_events(&path)?;
    let stored = store.list_events(out.job_id).await?;

    assert_eq!(mirrored.len(), stored.len());
    for (m, s) in mirrored.iter().zip(&stored) {
        assert_eq!(m.job_id, out.job_id);
        assert_eq!(m.event_type, s.event_type);
        assert_eq!(m.payload, s.meta);
    }
    Ok(())
}

#[tokio::test]
async fn mirror_can_be_disabled() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = PipelineConfig {
        audit_jsonl_mirror: false,
        ..test_config(tmp.path())
    };
    let (p, store) = pipeline(cfg);

    let out = p.submit(request()).await?;
    assert!(!Path::new(&out.stored_at).join(AUDIT_FILE_NAME).exists());
    assert_eq!(store.list_events(out.job_id).await?.len(), 6);
    Ok(())
}

#[tokio::test]
async fn mirror_without_hash_chain_carries_no_hashes() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = PipelineConfig {
        audit_hash_chain: false,
        ..test_config(tmp.path())
    };
    let (p, _store) = pipeline(cfg);

    let out = p.submit(request()).await?;
    let path = Path::new(&out.stored_at).join(AUDIT_FILE_NAME);
    let events = read_events(&path)?;
    assert!(events.iter().all(|e| e.hash_self.is_none()));
    assert_eq!(verify_hash_chain(&path)?, VerifyResult::Valid { lines: 6 });
    Ok(())
}
