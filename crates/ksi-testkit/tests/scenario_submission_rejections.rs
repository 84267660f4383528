//! Caller mistakes: validation and model-gate rejections.

use anyhow::Result;
use ksi_classify::ModelMismatchError;
use ksi_db::SubmissionStore;
use ksi_pipeline::{SubmissionRequest, SubmitError};
use ksi_schemas::{ModelCode, ServiceType, SubmissionStatus};
use ksi_testkit::{key, key_batch, memory_pipeline};
use ksi_validate::{Field, Problem};
use std::path::Path;

#[tokio::test]
async fn senatran_gov_login_without_password_is_rejected() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let (p, store) = memory_pipeline(tmp.path());

    let req = SubmissionRequest::new(ServiceType::Senatran, "ana")
        .with_spreadsheet("planilha.xlsx", b"PK".to_vec())
        .with_gov_login("12345678909", None);

    let err = p.submit(req).await.expect_err("must be rejected");
    assert!(err.is_rejection());
    assert_eq!(err.status(), SubmissionStatus::RejectedValidation);
    let SubmitError::Validation { job_id, error } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(error.problems, vec![Problem::Missing(Field::GovPassword)]);

    let sub = store.fetch_submission(*job_id).await?.expect("submission");
    assert_eq!(sub.status, SubmissionStatus::RejectedValidation);

    let events = store.list_events(*job_id).await?;
    let errors: Vec<_> = events.iter().filter(|e| e.event_type == "ERROR").collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].meta["from_status"], "RECEIVED");
    assert_eq!(errors[0].meta["to_status"], "REJECTED_VALIDATION");

    // Nothing but the audit mirror was written.
    assert!(!Path::new(&sub.base_path).join("sheet.xlsx").exists());
    assert!(store.list_file_movements(*job_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn mixed_models_are_rejected_before_anything_is_saved() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let (p, store) = memory_pipeline(tmp.path());

    let req = SubmissionRequest::new(ServiceType::Nfe, "ana")
        .with_key_batch("keys.txt", key_batch(&[(ModelCode::M55, 3), (ModelCode::M65, 1)]))
        .with_certificate("c.pfx", b"pfx".to_vec(), "pw");

    let err = p.submit(req).await.expect_err("must be rejected");
    assert_eq!(err.status(), SubmissionStatus::RejectedModelMismatch);
    let SubmitError::ModelMismatch { job_id, error } = &err else {
        panic!("unexpected error: {err:?}");
    };
    let suggestions = error.suggestions();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].model, ModelCode::M65);
    assert_eq!(suggestions[0].count, 1);

    let events = store.list_events(*job_id).await?;
    let last = events.last().expect("events");
    assert_eq!(last.event_type, "ERROR");
    assert_eq!(last.meta["to_status"], "REJECTED_MODEL_MISMATCH");
    assert_eq!(last.meta["detail"]["counts"]["55"], 3);
    assert_eq!(last.meta["detail"]["counts"]["65"], 1);

    let sub = store.fetch_submission(*job_id).await?.expect("submission");
    assert!(!Path::new(&sub.base_path).join("keys.txt").exists());
    assert!(!Path::new(&sub.base_path).join("split").exists());
    assert!(store.list_file_movements(*job_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn batch_without_any_key_reports_no_recognizable_keys() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let (p, _store) = memory_pipeline(tmp.path());

    let req = SubmissionRequest::new(ServiceType::Cte, "ana")
        .with_key_batch("keys.txt", b"header\n\n1234\n".to_vec())
        .with_certificate("c.pfx", b"pfx".to_vec(), "pw");

    let err = p.submit(req).await.expect_err("must be rejected");
    match err {
        SubmitError::ModelMismatch { error, .. } => {
            assert_eq!(error, ModelMismatchError::NoRecognizableKeys)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn model_gate_runs_before_validation() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let (p, _store) = memory_pipeline(tmp.path());

    // Wrong model and no certificate: the gate answers first.
    let req = SubmissionRequest::new(ServiceType::Nfce, "ana")
        .with_key_batch("keys.txt", format!("{}\n", key(ModelCode::M55, 1)));

    let err = p.submit(req).await.expect_err("must be rejected");
    assert_eq!(err.status(), SubmissionStatus::RejectedModelMismatch);
    Ok(())
}

#[tokio::test]
async fn wrong_extension_is_a_validation_error() -> Result<()> {
    let tmp = tempfile::tempdir()?;
    let (p, _store) = memory_pipeline(tmp.path());

    let req = SubmissionRequest::new(ServiceType::Nfe, "ana")
        .with_key_batch("keys.csv", key_batch(&[(ModelCode::M55, 1)]))
        .with_certificate("c.pem", b"pfx".to_vec(), "pw");

    let err = p.submit(req).await.expect_err("must be rejected");
    let SubmitError::Validation { error, .. } = &err else {
        panic!("unexpected error: {err:?}");
    };
    assert_eq!(error.extension_problems().len(), 2);
    assert!(error.missing_fields().is_empty());
    Ok(())
}
