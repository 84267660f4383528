use ksi_schemas::{SubmissionStatus, ServiceType};
use ksi_split::RelocatedSplit;
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// One uploaded file.
#[derive(Clone)]
pub struct Artifact {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Where the request came from. Recorded on the creation event only.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Everything a caller may send for one job.
///
/// Passwords are used for validation only: they are never persisted,
/// mirrored or logged. **Values are redacted in `Debug` output.**
#[derive(Clone)]
pub struct SubmissionRequest {
    pub service: ServiceType,
    pub actor: String,
    pub key_batch: Option<Artifact>,
    pub certificate: Option<Artifact>,
    pub certificate_password: Option<String>,
    pub spreadsheet: Option<Artifact>,
    pub csv: Option<Artifact>,
    pub gov_login: Option<String>,
    pub gov_password: Option<String>,
    pub origin: RequestOrigin,
}

impl SubmissionRequest {
    pub fn new(service: ServiceType, actor: impl Into<String>) -> Self {
        Self {
            service,
            actor: actor.into(),
            key_batch: None,
            certificate: None,
            certificate_password: None,
            spreadsheet: None,
            csv: None,
            gov_login: None,
            gov_password: None,
            origin: RequestOrigin::default(),
        }
    }

    pub fn with_key_batch(mut self, file_name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.key_batch = Some(Artifact::new(file_name, bytes));
        self
    }

    pub fn with_certificate(mut self, file_name: &str, bytes: impl Into<Vec<u8>>, password: &str) -> Self {
        self.certificate = Some(Artifact::new(file_name, bytes));
        self.certificate_password = Some(password.to_string());
        self
    }

    pub fn with_spreadsheet(mut self, file_name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.spreadsheet = Some(Artifact::new(file_name, bytes));
        self
    }

    pub fn with_csv(mut self, file_name: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.csv = Some(Artifact::new(file_name, bytes));
        self
    }

    pub fn with_gov_login(mut self, login: &str, password: Option<&str>) -> Self {
        self.gov_login = Some(login.to_string());
        self.gov_password = password.map(str::to_string);
        self
    }

    pub fn with_origin(mut self, client_ip: Option<&str>, user_agent: Option<&str>) -> Self {
        self.origin = RequestOrigin {
            client_ip: client_ip.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
        };
        self
    }
}

impl fmt::Debug for SubmissionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmissionRequest")
            .field("service", &self.service)
            .field("actor", &self.actor)
            .field("key_batch", &self.key_batch)
            .field("certificate", &self.certificate)
            .field("certificate_password", &self.certificate_password.as_ref().map(|_| "<REDACTED>"))
            .field("spreadsheet", &self.spreadsheet)
            .field("csv", &self.csv)
            .field("gov_login", &self.gov_login)
            .field("gov_password", &self.gov_password.as_ref().map(|_| "<REDACTED>"))
            .field("origin", &self.origin)
            .finish()
    }
}

/// Successful submission.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionOutcome {
    pub job_id: Uuid,
    pub service_type: ServiceType,
    pub actor: String,
    /// Job folder.
    pub stored_at: String,
    pub status: SubmissionStatus,
    /// Present for services whose key batch is split.
    pub split: Option<RelocatedSplit>,
}
