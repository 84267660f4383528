//! ksi-classify
//!
//! Access-key classification and the model enforcement gate.
//!
//! Pure logic over text. The only I/O entry point is [`count_from_reader`],
//! which leaves the reader's cursor where it found it.

mod classifier;
mod gate;

pub use classifier::{
    classify_line, count_bytes, count_from_reader, count_lines, count_text, ModelCounts,
    MIN_KEY_DIGITS, MODEL_OFFSET,
};
pub use gate::{enforce_expected_model, ModelMismatchError, Suggestion};
