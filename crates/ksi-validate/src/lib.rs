//! ksi-validate
//!
//! Per-service required-field and extension checks, run before anything is
//! written to storage. Independent of key classification.
//!
//! Rules:
//! - NFE / NFCE / CTE: key batch `.txt` + certificate `.pfx` + certificate password
//! - CFE: the above + CSV table `.csv`
//! - SENATRAN: spreadsheet `.xlsx`, plus (certificate + password) OR (gov login + gov password)
//!
//! Extension checks only run on artifacts that are present; an absent
//! artifact is reported once, as missing. All problems are collected.

use ksi_schemas::ServiceType;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::Path;

/// Everything the gate needs to know about a submission. File artifacts are
/// represented by their client-side file names; `None` means not supplied.
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub service: ServiceType,
    pub key_batch: Option<&'a str>,
    pub certificate: Option<&'a str>,
    pub certificate_password: Option<&'a str>,
    pub spreadsheet: Option<&'a str>,
    pub csv: Option<&'a str>,
    pub gov_login: Option<&'a str>,
    pub gov_password: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    KeyBatch,
    Certificate,
    CertificatePassword,
    Spreadsheet,
    Csv,
    GovLogin,
    GovPassword,
}

impl Field {
    /// Wire name of the form field.
    pub fn name(&self) -> &'static str {
        match self {
            Field::KeyBatch => "keys_txt",
            Field::Certificate => "pfx_file",
            Field::CertificatePassword => "pfx_password",
            Field::Spreadsheet => "sheet_xlsx",
            Field::Csv => "table_csv",
            Field::GovLogin => "gov_cpf",
            Field::GovPassword => "gov_password",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Field::KeyBatch => "key batch .txt",
            Field::Certificate => "certificate .pfx",
            Field::CertificatePassword => "certificate password",
            Field::Spreadsheet => "spreadsheet .xlsx",
            Field::Csv => "table .csv",
            Field::GovLogin => "gov login id",
            Field::GovPassword => "gov login password",
        }
    }

    /// Accepted suffixes (lower case, with dot). Empty for non-file fields.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            Field::KeyBatch => &[".txt"],
            Field::Certificate => &[".pfx"],
            Field::Spreadsheet => &[".xlsx"],
            Field::Csv => &[".csv"],
            _ => &[],
        }
    }
}

/// Fields a service always requires. SENATRAN's authentication pair is
/// handled separately because either of two pairs satisfies it.
pub fn required_fields(service: ServiceType) -> &'static [Field] {
    match service {
        ServiceType::Nfe | ServiceType::Nfce | ServiceType::Cte => {
            &[Field::KeyBatch, Field::Certificate, Field::CertificatePassword]
        }
        ServiceType::Cfe => &[
            Field::KeyBatch,
            Field::Certificate,
            Field::CertificatePassword,
            Field::Csv,
        ],
        ServiceType::Senatran => &[Field::Spreadsheet],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    Missing(Field),
    InvalidExtension {
        field: Field,
        found: String,
        allowed: &'static [&'static str],
    },
    /// SENATRAN: no half of either authentication pair was supplied.
    AuthenticationRequired,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Problem::Missing(field) => {
                write!(f, "missing {} ({})", field.label(), field.name())
            }
            Problem::InvalidExtension {
                field,
                found,
                allowed,
            } => write!(
                f,
                "{}: invalid extension '{}' (allowed: {})",
                field.name(),
                found,
                allowed.join(", ")
            ),
            Problem::AuthenticationRequired => write!(
                f,
                "missing authentication: certificate + password or gov login + password"
            ),
        }
    }
}

/// One or more required inputs are missing or malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub service: ServiceType,
    pub problems: Vec<Problem>,
}

impl ValidationError {
    pub fn missing_fields(&self) -> Vec<Field> {
        self.problems
            .iter()
            .filter_map(|p| match p {
                Problem::Missing(f) => Some(*f),
                _ => None,
            })
            .collect()
    }

    pub fn extension_problems(&self) -> Vec<&Problem> {
        self.problems
            .iter()
            .filter(|p| matches!(p, Problem::InvalidExtension { .. }))
            .collect()
    }

    pub fn to_detail(&self) -> Value {
        json!({
            "service_type": self.service.as_str(),
            "problems": self.problems.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
            "message": self.to_string(),
        })
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list: Vec<String> = self.problems.iter().map(|p| p.to_string()).collect();
        write!(f, "{}: invalid submission: {}", self.service, list.join("; "))
    }
}

impl std::error::Error for ValidationError {}

/// Lower-cased final suffix with its dot (`"keys.TXT"` -> `".txt"`), or `""`.
pub fn file_suffix(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

fn supplied(v: Option<&str>) -> bool {
    v.map(|s| !s.is_empty()).unwrap_or(false)
}

impl<'a> ValidationInput<'a> {
    fn value(&self, field: Field) -> Option<&'a str> {
        match field {
            Field::KeyBatch => self.key_batch,
            Field::Certificate => self.certificate,
            Field::CertificatePassword => self.certificate_password,
            Field::Spreadsheet => self.spreadsheet,
            Field::Csv => self.csv,
            Field::GovLogin => self.gov_login,
            Field::GovPassword => self.gov_password,
        }
    }

    /// File fields count as present when supplied at all; text fields must be non-empty.
    fn is_present(&self, field: Field) -> bool {
        if field.allowed_extensions().is_empty() {
            supplied(self.value(field))
        } else {
            self.value(field).is_some()
        }
    }
}

fn check_field(input: &ValidationInput<'_>, field: Field, problems: &mut Vec<Problem>) {
    if !input.is_present(field) {
        problems.push(Problem::Missing(field));
        return;
    }
    check_extension(input, field, problems);
}

fn check_extension(input: &ValidationInput<'_>, field: Field, problems: &mut Vec<Problem>) {
    let allowed = field.allowed_extensions();
    if allowed.is_empty() {
        return;
    }
    if let Some(name) = input.value(field) {
        let found = file_suffix(name);
        if !allowed.contains(&found.as_str()) {
            problems.push(Problem::InvalidExtension {
                field,
                found,
                allowed,
            });
        }
    }
}

fn check_senatran_auth(input: &ValidationInput<'_>, problems: &mut Vec<Problem>) {
    let cert = input.is_present(Field::Certificate);
    let cert_pw = input.is_present(Field::CertificatePassword);
    let gov = input.is_present(Field::GovLogin);
    let gov_pw = input.is_present(Field::GovPassword);

    if cert {
        check_extension(input, Field::Certificate, problems);
    }

    if (cert && cert_pw) || (gov && gov_pw) {
        return;
    }

    if !cert && !cert_pw && !gov && !gov_pw {
        problems.push(Problem::AuthenticationRequired);
        return;
    }

    if gov || gov_pw {
        if !gov {
            problems.push(Problem::Missing(Field::GovLogin));
        }
        if !gov_pw {
            problems.push(Problem::Missing(Field::GovPassword));
        }
    }
    if cert || cert_pw {
        if !cert {
            problems.push(Problem::Missing(Field::Certificate));
        }
        if !cert_pw {
            problems.push(Problem::Missing(Field::CertificatePassword));
        }
    }
}

/// Run every rule for `input.service`; returns all problems at once.
pub fn validate(input: &ValidationInput<'_>) -> Result<(), ValidationError> {
    let mut problems = Vec::new();

    for field in required_fields(input.service) {
        check_field(input, *field, &mut problems);
    }
    if input.service == ServiceType::Senatran {
        check_senatran_auth(input, &mut problems);
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ValidationError {
            service: input.service,
            problems,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_is_last_and_lowercase() {
        assert_eq!(file_suffix("keys.TXT"), ".txt");
        assert_eq!(file_suffix("a.tar.gz"), ".gz");
        assert_eq!(file_suffix("noext"), "");
        assert_eq!(file_suffix(".bashrc"), "");
    }

    #[test]
    fn every_service_has_a_required_set() {
        for s in ServiceType::ALL {
            assert!(!required_fields(s).is_empty(), "{s}");
        }
    }
}
