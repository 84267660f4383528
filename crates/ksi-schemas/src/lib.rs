//! ksi-schemas
//!
//! Shared vocabulary for the intake pipeline: service types, document model
//! codes, submission status, audit event names and the persisted row shapes.
//!
//! Every string produced by an `as_str` here is part of the external contract
//! (DB rows, audit metadata, CLI output). Do not rename.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Service type
// ---------------------------------------------------------------------------

/// Declared service of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ServiceType {
    Nfe,
    Nfce,
    Cte,
    Cfe,
    Senatran,
}

impl ServiceType {
    pub const ALL: [ServiceType; 5] = [
        ServiceType::Nfe,
        ServiceType::Nfce,
        ServiceType::Cte,
        ServiceType::Cfe,
        ServiceType::Senatran,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Nfe => "NFE",
            ServiceType::Nfce => "NFCE",
            ServiceType::Cte => "CTE",
            ServiceType::Cfe => "CFE",
            ServiceType::Senatran => "SENATRAN",
        }
    }

    /// Case-insensitive parse of the canonical name.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "NFE" => Ok(ServiceType::Nfe),
            "NFCE" => Ok(ServiceType::Nfce),
            "CTE" => Ok(ServiceType::Cte),
            "CFE" => Ok(ServiceType::Cfe),
            "SENATRAN" => Ok(ServiceType::Senatran),
            other => Err(anyhow!(
                "invalid service type '{}'. expected one of: NFE | NFCE | CTE | CFE | SENATRAN",
                other
            )),
        }
    }

    /// Model code every key of this service's batch must carry.
    /// SENATRAN takes no key batch.
    pub fn expected_model(&self) -> Option<ModelCode> {
        match self {
            ServiceType::Nfe => Some(ModelCode::M55),
            ServiceType::Nfce => Some(ModelCode::M65),
            ServiceType::Cte => Some(ModelCode::M57),
            ServiceType::Cfe => Some(ModelCode::M59),
            ServiceType::Senatran => None,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Document model code
// ---------------------------------------------------------------------------

/// Two-digit document model embedded in an access key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelCode {
    #[serde(rename = "55")]
    M55,
    #[serde(rename = "65")]
    M65,
    #[serde(rename = "57")]
    M57,
    #[serde(rename = "59")]
    M59,
}

impl ModelCode {
    /// Fixed reporting order.
    pub const ALL: [ModelCode; 4] = [ModelCode::M55, ModelCode::M65, ModelCode::M57, ModelCode::M59];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelCode::M55 => "55",
            ModelCode::M65 => "65",
            ModelCode::M57 => "57",
            ModelCode::M59 => "59",
        }
    }

    /// Exact two-digit match; anything else is unrecognized.
    pub fn from_digits(s: &str) -> Option<Self> {
        match s {
            "55" => Some(ModelCode::M55),
            "65" => Some(ModelCode::M65),
            "57" => Some(ModelCode::M57),
            "59" => Some(ModelCode::M59),
            _ => None,
        }
    }

    pub fn service(&self) -> ServiceType {
        match self {
            ModelCode::M55 => ServiceType::Nfe,
            ModelCode::M65 => ServiceType::Nfce,
            ModelCode::M57 => ServiceType::Cte,
            ModelCode::M59 => ServiceType::Cfe,
        }
    }

    /// Submission endpoint suggested to callers who sent this model to the wrong service.
    pub fn submit_endpoint(&self) -> &'static str {
        match self {
            ModelCode::M55 => "/mvp/nfe/submit",
            ModelCode::M65 => "/mvp/nfce/submit",
            ModelCode::M57 => "/mvp/cte/submit",
            ModelCode::M59 => "/mvp/cfe/submit",
        }
    }

    /// Folder / file stem used by split output (`modelo_55`).
    pub fn split_label(&self) -> &'static str {
        match self {
            ModelCode::M55 => "modelo_55",
            ModelCode::M65 => "modelo_65",
            ModelCode::M57 => "modelo_57",
            ModelCode::M59 => "modelo_59",
        }
    }
}

impl fmt::Display for ModelCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Submission status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionStatus {
    Received,
    ModelEnforced,
    Validated,
    FilesSaved,
    SplitDone,
    Ready,
    RejectedModelMismatch,
    RejectedValidation,
    ErrorSave,
    ErrorSplit,
    ErrorUnhandled,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Received => "RECEIVED",
            SubmissionStatus::ModelEnforced => "MODEL_ENFORCED",
            SubmissionStatus::Validated => "VALIDATED",
            SubmissionStatus::FilesSaved => "FILES_SAVED",
            SubmissionStatus::SplitDone => "SPLIT_DONE",
            SubmissionStatus::Ready => "READY",
            SubmissionStatus::RejectedModelMismatch => "REJECTED_MODEL_MISMATCH",
            SubmissionStatus::RejectedValidation => "REJECTED_VALIDATION",
            SubmissionStatus::ErrorSave => "ERROR_SAVE",
            SubmissionStatus::ErrorSplit => "ERROR_SPLIT",
            SubmissionStatus::ErrorUnhandled => "ERROR_UNHANDLED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "RECEIVED" => Ok(SubmissionStatus::Received),
            "MODEL_ENFORCED" => Ok(SubmissionStatus::ModelEnforced),
            "VALIDATED" => Ok(SubmissionStatus::Validated),
            "FILES_SAVED" => Ok(SubmissionStatus::FilesSaved),
            "SPLIT_DONE" => Ok(SubmissionStatus::SplitDone),
            "READY" => Ok(SubmissionStatus::Ready),
            "REJECTED_MODEL_MISMATCH" => Ok(SubmissionStatus::RejectedModelMismatch),
            "REJECTED_VALIDATION" => Ok(SubmissionStatus::RejectedValidation),
            "ERROR_SAVE" => Ok(SubmissionStatus::ErrorSave),
            "ERROR_SPLIT" => Ok(SubmissionStatus::ErrorSplit),
            "ERROR_UNHANDLED" => Ok(SubmissionStatus::ErrorUnhandled),
            other => Err(anyhow!("invalid submission status: {}", other)),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::RejectedModelMismatch
                | SubmissionStatus::RejectedValidation
                | SubmissionStatus::ErrorSave
                | SubmissionStatus::ErrorSplit
                | SubmissionStatus::ErrorUnhandled
        )
    }

    pub fn is_terminal(&self) -> bool {
        *self == SubmissionStatus::Ready || self.is_failure()
    }

    /// Position on the success path. Failure states have no rank.
    fn success_rank(&self) -> Option<u8> {
        match self {
            SubmissionStatus::Received => Some(0),
            SubmissionStatus::ModelEnforced => Some(1),
            SubmissionStatus::Validated => Some(2),
            SubmissionStatus::FilesSaved => Some(3),
            SubmissionStatus::SplitDone => Some(4),
            SubmissionStatus::Ready => Some(5),
            _ => None,
        }
    }

    /// Forward-only rule:
    /// - terminal states are sticky
    /// - any non-terminal state may fail
    /// - success moves strictly forward (skipping stages a service lacks is allowed)
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next.is_failure() {
            return true;
        }
        match (self.success_rank(), next.success_rank()) {
            (Some(cur), Some(nxt)) => nxt > cur,
            _ => false,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Audit vocabulary
// ---------------------------------------------------------------------------

/// Event type names written to `submission_events.event_type`.
pub mod event_type {
    pub const SUBMISSION_CREATED: &str = "SUBMISSION_CREATED";
    pub const MODEL_ENFORCED: &str = "MODEL_ENFORCED";
    pub const VALIDATED: &str = "VALIDATED";
    pub const STATUS_CHANGED: &str = "STATUS_CHANGED";
    pub const SPLIT_DONE: &str = "SPLIT_DONE";
    pub const ERROR: &str = "ERROR";
}

/// Metadata keys used inside `submission_events.meta`.
pub mod meta_key {
    pub const FROM_STATUS: &str = "from_status";
    pub const TO_STATUS: &str = "to_status";
    pub const DETAIL: &str = "detail";
    pub const ERROR: &str = "error";
    pub const COUNTS: &str = "counts";
    pub const EXPECTED_MODEL: &str = "expected_model";
    pub const SPLIT: &str = "split";
    pub const CLIENT_IP: &str = "client_ip";
    pub const USER_AGENT: &str = "user_agent";
}

/// Role tag of a persisted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FileRole {
    #[serde(rename = "INPUT_TXT")]
    InputTxt,
    #[serde(rename = "INPUT_PFX")]
    InputPfx,
    #[serde(rename = "INPUT_CSV")]
    InputCsv,
    #[serde(rename = "INPUT_XLSX")]
    InputXlsx,
    #[serde(rename = "OUTPUT_MODEL_55")]
    OutputModel55,
    #[serde(rename = "OUTPUT_MODEL_65")]
    OutputModel65,
    #[serde(rename = "OUTPUT_MODEL_57")]
    OutputModel57,
    #[serde(rename = "OUTPUT_MODEL_59")]
    OutputModel59,
}

impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileRole::InputTxt => "INPUT_TXT",
            FileRole::InputPfx => "INPUT_PFX",
            FileRole::InputCsv => "INPUT_CSV",
            FileRole::InputXlsx => "INPUT_XLSX",
            FileRole::OutputModel55 => "OUTPUT_MODEL_55",
            FileRole::OutputModel65 => "OUTPUT_MODEL_65",
            FileRole::OutputModel57 => "OUTPUT_MODEL_57",
            FileRole::OutputModel59 => "OUTPUT_MODEL_59",
        }
    }

    pub fn split_output(model: ModelCode) -> Self {
        match model {
            ModelCode::M55 => FileRole::OutputModel55,
            ModelCode::M65 => FileRole::OutputModel65,
            ModelCode::M57 => FileRole::OutputModel57,
            ModelCode::M59 => FileRole::OutputModel59,
        }
    }
}

impl fmt::Display for FileRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Rows
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub job_id: Uuid,
    pub actor: String,
    pub service_type: ServiceType,
    pub base_path: String,
}

/// Input artifact locations, filled once files are persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub keys_path: Option<String>,
    pub cert_path: Option<String>,
    pub sheet_path: Option<String>,
    pub csv_path: Option<String>,
    /// External-login identifier (never the password).
    pub gov_login: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: i64,
    pub job_id: Uuid,
    pub actor: String,
    pub service_type: ServiceType,
    pub base_path: String,
    pub artifacts: ArtifactPaths,
    pub status: SubmissionStatus,
    pub created_at_utc: DateTime<Utc>,
}

/// Event payload before the store assigns identity and denormalized fields.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_type: String,
    pub message: String,
    pub meta: Value,
}

impl NewEvent {
    pub fn new(event_type: &str, message: impl Into<String>, meta: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            message: message.into(),
            meta,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionEvent {
    pub id: i64,
    pub submission_id: i64,
    pub job_id: Uuid,
    pub actor: String,
    pub service_type: ServiceType,
    pub event_type: String,
    pub message: String,
    pub meta: Value,
    pub created_at_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileMovement {
    pub file_role: FileRole,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMovement {
    pub id: i64,
    pub submission_id: i64,
    pub job_id: Uuid,
    pub file_role: String,
    pub file_name: String,
    pub file_path: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<i64>,
    pub sha256: Option<String>,
    pub created_at_utc: DateTime<Utc>,
}
