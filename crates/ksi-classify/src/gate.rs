use crate::classifier::ModelCounts;
use ksi_schemas::{ModelCode, ServiceType};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;

/// Where a misplaced model should have been submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub model: ModelCode,
    pub service: ServiceType,
    pub endpoint: &'static str,
    pub count: usize,
}

/// Key batch content disagrees with the model the caller expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelMismatchError {
    /// Not a single line carried a recognized model.
    NoRecognizableKeys,
    /// Expected model absent, or other models present.
    Mismatch {
        expected: ModelCode,
        counts: ModelCounts,
    },
}

impl ModelMismatchError {
    /// One suggestion per offending model, in reporting order.
    pub fn suggestions(&self) -> Vec<Suggestion> {
        match self {
            ModelMismatchError::NoRecognizableKeys => Vec::new(),
            ModelMismatchError::Mismatch { expected, counts } => counts
                .others(*expected)
                .into_iter()
                .map(|(model, count)| Suggestion {
                    model,
                    service: model.service(),
                    endpoint: model.submit_endpoint(),
                    count,
                })
                .collect(),
        }
    }

    /// Structured form for audit metadata.
    pub fn to_detail(&self) -> Value {
        match self {
            ModelMismatchError::NoRecognizableKeys => json!({
                "reason": "no recognizable keys",
                "message": self.to_string(),
            }),
            ModelMismatchError::Mismatch { expected, counts } => json!({
                "reason": "model mismatch",
                "message": self.to_string(),
                "expected_model": expected.as_str(),
                "counts": counts.to_json(),
                "suggestions": self.suggestions(),
            }),
        }
    }
}

impl fmt::Display for ModelMismatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelMismatchError::NoRecognizableKeys => write!(
                f,
                "no recognizable keys: the key batch has no key of model 55/65/57/59"
            ),
            ModelMismatchError::Mismatch { expected, counts } => {
                let mut parts = vec![format!("model {}: {}", expected, counts.get(*expected))];
                parts.extend(
                    counts
                        .others(*expected)
                        .iter()
                        .map(|(m, c)| format!("model {}: {}", m, c)),
                );

                write!(
                    f,
                    "{}: key batch does not match this endpoint. counts by model: {}.",
                    expected.service(),
                    parts.join("; ")
                )?;
                if counts.get(*expected) == 0 {
                    write!(f, " no key of model {} was found.", expected)?;
                }

                let suggestions = self.suggestions();
                if !suggestions.is_empty() {
                    let list: Vec<String> = suggestions
                        .iter()
                        .map(|s| format!("{} -> {} ({} key(s))", s.service, s.endpoint, s.count))
                        .collect();
                    write!(f, " use the matching endpoints: {}", list.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ModelMismatchError {}

/// Require every classified key to carry `expected`.
///
/// Order of checks:
/// 1. nothing classified at all => [`ModelMismatchError::NoRecognizableKeys`]
/// 2. zero keys of `expected`, or any key of another model => [`ModelMismatchError::Mismatch`]
pub fn enforce_expected_model(
    counts: &ModelCounts,
    expected: ModelCode,
) -> Result<(), ModelMismatchError> {
    if counts.total() == 0 {
        return Err(ModelMismatchError::NoRecognizableKeys);
    }

    if counts.get(expected) == 0 || !counts.others(expected).is_empty() {
        return Err(ModelMismatchError::Mismatch {
            expected,
            counts: counts.clone(),
        });
    }

    Ok(())
}
