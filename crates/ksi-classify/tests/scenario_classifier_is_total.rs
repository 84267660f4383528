//! Classification never fails: short, empty, non-numeric and unknown-model
//! lines are all simply "unrecognized".

use ksi_classify::{classify_line, count_text, MIN_KEY_DIGITS};
use ksi_schemas::ModelCode;

fn key(model: &str, seq: u32) -> String {
    format!("35190112345678000199{model}{seq:022}")
}

#[test]
fn lines_below_min_digits_are_unrecognized() {
    let full = key("55", 7);
    for n in 0..MIN_KEY_DIGITS {
        let prefix: String = full.chars().take(n).collect();
        assert_eq!(classify_line(&prefix), None, "prefix of {n} digits must not classify");
    }
    assert_eq!(classify_line(""), None);
    assert_eq!(classify_line("   \r"), None);
    assert_eq!(classify_line("not a key at all, just words"), None);
}

#[test]
fn unknown_model_codes_are_unrecognized() {
    for code in ["00", "56", "58", "66", "99"] {
        assert_eq!(classify_line(&key(code, 1)), None, "code {code}");
    }
}

#[test]
fn every_known_code_is_recognized() {
    for m in ModelCode::ALL {
        assert_eq!(classify_line(&key(m.as_str(), 42)), Some(m));
    }
}

#[test]
fn counting_skips_noise_lines() {
    let text = format!(
        "{}\n\nshort 123\n{}\r\n{}\n{}\n",
        key("55", 1),
        key("65", 2),
        key("55", 3),
        key("11", 4)
    );
    let counts = count_text(&text);
    assert_eq!(counts.get(ModelCode::M55), 2);
    assert_eq!(counts.get(ModelCode::M65), 1);
    assert_eq!(counts.get(ModelCode::M57), 0);
    assert_eq!(counts.total(), 3);
    assert_eq!(counts.to_json()["55"], 2);
    assert_eq!(counts.to_json()["59"], 0);
}
