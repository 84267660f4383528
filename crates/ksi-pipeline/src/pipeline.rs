use crate::error::{StorageStage, SubmitError};
use crate::ids::{JobIdSource, RandomJobIds};
use crate::recorder::{meta, JobRecorder};
use crate::request::{Artifact, RequestOrigin, SubmissionOutcome, SubmissionRequest};
use anyhow::Context;
use ksi_classify::{count_from_reader, enforce_expected_model};
use ksi_config::PipelineConfig;
use ksi_db::SubmissionStore;
use ksi_integrity::movement_from_reader;
use ksi_schemas::{
    event_type, meta_key, ArtifactPaths, FileRole, NewEvent, NewSubmission, ServiceType,
    SubmissionStatus,
};
use ksi_split::{split_into_job_folder, RelocatedSplit, SplitEngine};
use ksi_storage::{allocate_job_folder, job_dir, BlobStore, StorageError};
use ksi_validate::{file_suffix, validate, Field, ValidationInput};
use serde_json::{json, Value};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Why `run` stopped early.
enum Abort {
    /// Already recorded (event + terminal status); surface as is.
    Reported(SubmitError),
    /// Escaped the stages; still needs `ERROR_UNHANDLED`.
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for Abort {
    fn from(e: anyhow::Error) -> Self {
        Abort::Internal(e)
    }
}

/// An input written into the job folder.
struct SavedInput {
    role: FileRole,
    path: PathBuf,
}

/// Inputs persisted per service: validation field, file role, stored stem.
fn persisted_inputs(service: ServiceType) -> &'static [(Field, FileRole, &'static str)] {
    const NFE_LIKE: &[(Field, FileRole, &str)] = &[
        (Field::KeyBatch, FileRole::InputTxt, "keys"),
        (Field::Certificate, FileRole::InputPfx, "cert"),
    ];
    match service {
        ServiceType::Nfe | ServiceType::Nfce | ServiceType::Cte => NFE_LIKE,
        ServiceType::Cfe => &[
            (Field::KeyBatch, FileRole::InputTxt, "keys"),
            (Field::Certificate, FileRole::InputPfx, "cert"),
            (Field::Csv, FileRole::InputCsv, "table"),
        ],
        ServiceType::Senatran => &[
            (Field::Spreadsheet, FileRole::InputXlsx, "sheet"),
            (Field::Certificate, FileRole::InputPfx, "cert"),
        ],
    }
}

fn artifact_for(req: &SubmissionRequest, field: Field) -> Option<&Artifact> {
    match field {
        Field::KeyBatch => req.key_batch.as_ref(),
        Field::Certificate => req.certificate.as_ref(),
        Field::Spreadsheet => req.spreadsheet.as_ref(),
        Field::Csv => req.csv.as_ref(),
        _ => None,
    }
}

fn origin_meta(origin: &RequestOrigin) -> Value {
    let opt = |v: &Option<String>| v.clone().map(Value::String).unwrap_or(Value::Null);
    meta([
        (meta_key::CLIENT_IP, opt(&origin.client_ip)),
        (meta_key::USER_AGENT, opt(&origin.user_agent)),
    ])
}

/// Intake pipeline: job allocation, gates, persistence, split and the
/// audit trail of every step.
///
/// Stage order per job:
/// 1. create submission (`RECEIVED`), job folder, `SUBMISSION_CREATED`
/// 2. model gate, when the service expects a model and a key batch was sent
/// 3. validation gate
/// 4. save inputs (`FILES_SAVED`), file movements best effort
/// 5. split, for services with a key batch (`SPLIT_DONE`)
/// 6. `READY`
pub struct Pipeline {
    config: PipelineConfig,
    store: Arc<dyn SubmissionStore>,
    blobs: Arc<dyn BlobStore>,
    ids: Arc<dyn JobIdSource>,
    engine: SplitEngine,
}

impl Pipeline {
    /// A relative `upload_dir` is resolved against the current directory.
    pub fn new(
        config: PipelineConfig,
        store: Arc<dyn SubmissionStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let config = match std::env::current_dir() {
            Ok(cwd) => config.resolved_against(&cwd),
            Err(e) => {
                warn!(error = %e, "current_dir unavailable; upload_dir left as configured");
                config
            }
        };
        let engine = SplitEngine::new(config.download_prefix.clone());
        Self {
            config,
            store,
            blobs,
            ids: Arc::new(RandomJobIds),
            engine,
        }
    }

    pub fn with_job_ids(mut self, ids: Arc<dyn JobIdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SubmissionStore> {
        &self.store
    }

    /// Run one submission to `READY` or to a terminal failure state.
    pub async fn submit(&self, req: SubmissionRequest) -> Result<SubmissionOutcome, SubmitError> {
        let job_id = self.ids.next_job_id();
        let dir = job_dir(&self.config.upload_dir, req.service, &req.actor, job_id);
        info!(%job_id, service = %req.service, actor = %req.actor, "submission received");

        let created = self
            .store
            .create_submission(&NewSubmission {
                job_id,
                actor: req.actor.clone(),
                service_type: req.service,
                base_path: dir.to_string_lossy().into_owned(),
            })
            .await;
        if let Err(e) = created {
            error!(%job_id, error = %format!("{e:#}"), "could not create submission");
            return Err(SubmitError::Unhandled {
                job_id: Some(job_id),
            });
        }

        let mut rec = JobRecorder::new(self.store.clone(), job_id, self.config.audit_jsonl_mirror);
        match self.run(&mut rec, &req, &dir).await {
            Ok(outcome) => {
                info!(%job_id, "submission ready");
                Ok(outcome)
            }
            Err(Abort::Reported(e)) => Err(e),
            Err(Abort::Internal(e)) => {
                error!(%job_id, error = %format!("{e:#}"), "unhandled pipeline error");
                rec.fail_unhandled(&e).await;
                Err(SubmitError::Unhandled {
                    job_id: Some(job_id),
                })
            }
        }
    }

    async fn run(
        &self,
        rec: &mut JobRecorder,
        req: &SubmissionRequest,
        dir: &Path,
    ) -> Result<SubmissionOutcome, Abort> {
        let job_id = rec.job_id();
        let service = req.service;

        rec.note(NewEvent::new(
            event_type::SUBMISSION_CREATED,
            format!("{service} submission created"),
            origin_meta(&req.origin),
        ))
        .await?;

        let allocated = allocate_job_folder(
            self.blobs.as_ref(),
            &self.config.upload_dir,
            service,
            &req.actor,
            job_id,
        );
        if let Err(e) = allocated {
            return Err(self.storage_failure(rec, StorageStage::Save, &e).await);
        }
        rec.attach_mirror(dir, self.config.audit_hash_chain);

        // Model gate.
        if let (Some(expected), Some(keys)) = (service.expected_model(), req.key_batch.as_ref()) {
            let mut cursor = Cursor::new(keys.bytes.as_slice());
            let counts = count_from_reader(&mut cursor).context("count key batch")?;
            match enforce_expected_model(&counts, expected) {
                Ok(()) => {
                    rec.advance(
                        SubmissionStatus::ModelEnforced,
                        event_type::MODEL_ENFORCED,
                        &format!("expected model: {expected}"),
                        meta([
                            (meta_key::COUNTS, counts.to_json()),
                            (meta_key::EXPECTED_MODEL, Value::String(expected.as_str().to_string())),
                        ]),
                    )
                    .await?;
                }
                Err(error) => {
                    rec.fail(
                        SubmissionStatus::RejectedModelMismatch,
                        "model mismatch",
                        meta([(meta_key::DETAIL, error.to_detail())]),
                    )
                    .await?;
                    return Err(Abort::Reported(SubmitError::ModelMismatch { job_id, error }));
                }
            }
        }

        // Validation gate.
        let input = ValidationInput {
            service,
            key_batch: req.key_batch.as_ref().map(|a| a.file_name.as_str()),
            certificate: req.certificate.as_ref().map(|a| a.file_name.as_str()),
            certificate_password: req.certificate_password.as_deref(),
            spreadsheet: req.spreadsheet.as_ref().map(|a| a.file_name.as_str()),
            csv: req.csv.as_ref().map(|a| a.file_name.as_str()),
            gov_login: req.gov_login.as_deref(),
            gov_password: req.gov_password.as_deref(),
        };
        if let Err(error) = validate(&input) {
            rec.fail(
                SubmissionStatus::RejectedValidation,
                "validation error",
                meta([(meta_key::DETAIL, error.to_detail())]),
            )
            .await?;
            return Err(Abort::Reported(SubmitError::Validation { job_id, error }));
        }
        rec.advance(
            SubmissionStatus::Validated,
            event_type::VALIDATED,
            "inputs validated",
            json!({}),
        )
        .await?;

        // Persist inputs.
        let saved = match self.save_inputs(req, dir) {
            Ok(s) => s,
            Err(e) => return Err(self.storage_failure(rec, StorageStage::Save, &e).await),
        };
        let mut paths = ArtifactPaths {
            gov_login: req.gov_login.clone(),
            ..Default::default()
        };
        for s in &saved {
            let p = Some(s.path.to_string_lossy().into_owned());
            match s.role {
                FileRole::InputTxt => paths.keys_path = p,
                FileRole::InputPfx => paths.cert_path = p,
                FileRole::InputXlsx => paths.sheet_path = p,
                FileRole::InputCsv => paths.csv_path = p,
                _ => {}
            }
        }
        self.store.set_artifacts(job_id, &paths).await?;
        for s in &saved {
            self.record_file(job_id, s.role, &s.path).await;
        }
        rec.advance(
            SubmissionStatus::FilesSaved,
            event_type::STATUS_CHANGED,
            "files saved",
            json!({}),
        )
        .await?;

        // Split.
        let split = match (service.expected_model(), req.key_batch.as_ref()) {
            (Some(_), Some(keys)) => Some(self.split(rec, keys, dir).await?),
            _ => None,
        };

        rec.advance(
            SubmissionStatus::Ready,
            event_type::STATUS_CHANGED,
            "submission ready",
            json!({}),
        )
        .await?;

        Ok(SubmissionOutcome {
            job_id,
            service_type: service,
            actor: req.actor.clone(),
            stored_at: dir.to_string_lossy().into_owned(),
            status: rec.status(),
            split,
        })
    }

    fn save_inputs(&self, req: &SubmissionRequest, dir: &Path) -> Result<Vec<SavedInput>, StorageError> {
        let mut out = Vec::new();
        for (field, role, stem) in persisted_inputs(req.service) {
            let Some(a) = artifact_for(req, *field) else {
                continue;
            };
            let path = dir.join(format!("{stem}{}", file_suffix(&a.file_name)));
            self.blobs.write_file(&path, &mut Cursor::new(a.bytes.as_slice()))?;
            out.push(SavedInput { role: *role, path });
        }
        Ok(out)
    }

    async fn split(
        &self,
        rec: &mut JobRecorder,
        keys: &Artifact,
        dir: &Path,
    ) -> Result<RelocatedSplit, Abort> {
        let job_id = rec.job_id();
        let text = String::from_utf8_lossy(&keys.bytes);
        let split_root = dir.join(&self.config.split_dir);

        let moved = match split_into_job_folder(
            &self.engine,
            self.blobs.as_ref(),
            &text,
            &split_root,
            &self.config.split_wip_dir,
            &job_id.to_string(),
        ) {
            Ok(m) => m,
            Err(e) => return Err(self.storage_failure(rec, StorageStage::Split, &e).await),
        };

        for (model, path) in moved.result.written() {
            self.record_file(job_id, FileRole::split_output(model), Path::new(path))
                .await;
        }

        let split_meta = serde_json::to_value(&moved).context("serialize split result")?;
        rec.advance(
            SubmissionStatus::SplitDone,
            event_type::SPLIT_DONE,
            "split finished",
            meta([(meta_key::SPLIT, split_meta)]),
        )
        .await?;
        Ok(moved)
    }

    /// Record `ERROR_SAVE` / `ERROR_SPLIT`. The caller gets a generic error;
    /// the path detail stays in the event.
    async fn storage_failure(
        &self,
        rec: &mut JobRecorder,
        stage: StorageStage,
        e: &StorageError,
    ) -> Abort {
        let (to, message) = match stage {
            StorageStage::Save => (SubmissionStatus::ErrorSave, "file save error"),
            StorageStage::Split => (SubmissionStatus::ErrorSplit, "split error"),
        };
        let recorded = rec
            .fail(to, message, meta([(meta_key::ERROR, Value::String(e.to_string()))]))
            .await;
        match recorded {
            Ok(_) => Abort::Reported(SubmitError::Storage {
                job_id: rec.job_id(),
                stage,
            }),
            Err(err) => Abort::Internal(err),
        }
    }

    /// Size, digest and MIME of one persisted file, read back through the
    /// blob store. Failures are logged only.
    async fn record_file(&self, job_id: Uuid, role: FileRole, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut src = match self.blobs.open_read(path) {
            Ok(r) => r,
            Err(e) => {
                warn!(%job_id, role = %role, error = %e, "integrity recording skipped");
                return;
            }
        };
        let mv = match movement_from_reader(role, &name, path, &mut src) {
            Ok(mv) => mv,
            Err(e) => {
                warn!(%job_id, role = %role, error = %e, "integrity recording skipped");
                return;
            }
        };
        if let Err(e) = self.store.append_file_movement(job_id, &mv).await {
            warn!(%job_id, role = %role, error = %format!("{e:#}"), "file movement not recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ksi_validate::required_fields;

    #[test]
    fn every_required_file_is_persisted() {
        for service in ServiceType::ALL {
            let persisted: Vec<Field> = persisted_inputs(service).iter().map(|(f, _, _)| *f).collect();
            for field in required_fields(service) {
                if !field.allowed_extensions().is_empty() {
                    assert!(persisted.contains(field), "{service}: {field:?} not persisted");
                }
            }
        }
    }

    #[test]
    fn stored_names_are_distinct_per_service() {
        for service in ServiceType::ALL {
            let mut stems: Vec<&str> = persisted_inputs(service).iter().map(|(_, _, s)| *s).collect();
            stems.sort();
            stems.dedup();
            assert_eq!(stems.len(), persisted_inputs(service).len(), "{service}");
        }
    }
}
