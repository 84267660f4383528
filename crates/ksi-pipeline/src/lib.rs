//! ksi-pipeline
//!
//! Submission intake: one call to [`Pipeline::submit`] takes a request from
//! `RECEIVED` to `READY` or to exactly one terminal failure state, recording
//! every status change as an event (and in the job's `audit.jsonl` mirror
//! when enabled).

mod error;
mod ids;
mod pipeline;
mod recorder;
mod request;

pub use error::{StorageStage, SubmitError};
pub use ids::{JobIdSource, RandomJobIds};
pub use pipeline::Pipeline;
pub use recorder::JobRecorder;
pub use request::{Artifact, RequestOrigin, SubmissionOutcome, SubmissionRequest};
