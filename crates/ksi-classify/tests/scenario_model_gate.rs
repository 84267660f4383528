//! Model enforcement gate: pass/fail matrix, suggestion table, and the
//! read-only contract over seekable sources.

use ksi_classify::{count_from_reader, count_text, enforce_expected_model, ModelMismatchError};
use ksi_schemas::{ModelCode, ServiceType};
use std::io::{Cursor, Seek, SeekFrom};

fn key(model: &str, seq: u32) -> String {
    format!("35190112345678000199{model}{seq:022}")
}

fn batch(models: &[&str]) -> String {
    models
        .iter()
        .enumerate()
        .map(|(i, m)| key(m, i as u32) + "\n")
        .collect()
}

#[test]
fn pure_batch_of_expected_model_passes() {
    let counts = count_text(&batch(&["55", "55", "55"]));
    enforce_expected_model(&counts, ModelCode::M55).unwrap();
}

#[test]
fn pure_55_batch_sent_to_nfce_suggests_nfe_endpoint() {
    let counts = count_text(&batch(&["55", "55"]));
    let err = enforce_expected_model(&counts, ModelCode::M65).unwrap_err();

    let suggestions = err.suggestions();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].model, ModelCode::M55);
    assert_eq!(suggestions[0].service, ServiceType::Nfe);
    assert_eq!(suggestions[0].endpoint, "/mvp/nfe/submit");
    assert_eq!(suggestions[0].count, 2);

    let msg = err.to_string();
    assert!(msg.contains("model 55: 2"), "got: {msg}");
    assert!(msg.contains("no key of model 65"), "got: {msg}");
    assert!(msg.contains("/mvp/nfe/submit"), "got: {msg}");

    let detail = err.to_detail();
    assert_eq!(detail["expected_model"], "65");
    assert_eq!(detail["counts"]["55"], 2);
}

#[test]
fn intruder_model_fails_even_when_expected_present() {
    let counts = count_text(&batch(&["55", "55", "55", "65"]));
    let err = enforce_expected_model(&counts, ModelCode::M55).unwrap_err();
    match &err {
        ModelMismatchError::Mismatch { expected, counts } => {
            assert_eq!(*expected, ModelCode::M55);
            assert_eq!(counts.get(ModelCode::M55), 3);
            assert_eq!(counts.get(ModelCode::M65), 1);
        }
        other => panic!("expected Mismatch, got {other:?}"),
    }
    let s = err.suggestions();
    assert_eq!(s.len(), 1);
    assert_eq!(s[0].endpoint, "/mvp/nfce/submit");
    assert!(!err.to_string().contains("no key of model"));
}

#[test]
fn nothing_recognizable_has_its_own_error() {
    let counts = count_text("hello\n123\n\n");
    let err = enforce_expected_model(&counts, ModelCode::M57).unwrap_err();
    assert_eq!(err, ModelMismatchError::NoRecognizableKeys);
    assert!(err.to_string().contains("no recognizable keys"));
    assert!(err.suggestions().is_empty());
}

#[test]
fn reader_cursor_is_restored() {
    let data = batch(&["59", "59", "57"]);
    let mut cur = Cursor::new(data.into_bytes());
    cur.seek(SeekFrom::Start(5)).unwrap();

    let counts = count_from_reader(&mut cur).unwrap();
    assert_eq!(cur.position(), 5, "gate must not move the caller's cursor");
    assert_eq!(counts.get(ModelCode::M59), 2);
    assert_eq!(counts.get(ModelCode::M57), 1);

    // Counting again from the restored cursor sees the whole batch again.
    let again = count_from_reader(&mut cur).unwrap();
    assert_eq!(again, counts);
    assert!(enforce_expected_model(&counts, ModelCode::M59).is_err());
}
