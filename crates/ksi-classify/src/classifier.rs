use ksi_schemas::ModelCode;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::{self, Read, Seek, SeekFrom};

/// Keys with fewer digits than this are never classified.
pub const MIN_KEY_DIGITS: usize = 22;

/// Zero-indexed offset of the two model digits inside the digit-only key.
pub const MODEL_OFFSET: usize = 20;

/// Classify one line of a key batch.
///
/// Non-digit characters are dropped first, so separators, whitespace and
/// stray line terminators do not shift the model position.
pub fn classify_line(line: &str) -> Option<ModelCode> {
    let mut digits = line.chars().filter(char::is_ascii_digit).skip(MODEL_OFFSET);
    let hi = digits.next()?;
    let lo = digits.next()?;

    let code: String = [hi, lo].iter().collect();
    ModelCode::from_digits(&code)
}

/// Per-model key counts for one batch. All four codes are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ModelCounts {
    counts: BTreeMap<ModelCode, usize>,
}

impl Default for ModelCounts {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelCounts {
    pub fn new() -> Self {
        Self {
            counts: ModelCode::ALL.iter().map(|m| (*m, 0)).collect(),
        }
    }

    /// Classify and count a single line. Returns the model it was counted under.
    pub fn observe(&mut self, line: &str) -> Option<ModelCode> {
        let model = classify_line(line)?;
        *self.counts.entry(model).or_insert(0) += 1;
        Some(model)
    }

    pub fn get(&self, model: ModelCode) -> usize {
        self.counts.get(&model).copied().unwrap_or(0)
    }

    /// Number of classified keys across every model.
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Nonzero counts for every model other than `expected`, in reporting order.
    pub fn others(&self, expected: ModelCode) -> Vec<(ModelCode, usize)> {
        ModelCode::ALL
            .iter()
            .filter(|m| **m != expected)
            .map(|m| (*m, self.get(*m)))
            .filter(|(_, c)| *c > 0)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelCode, usize)> + '_ {
        ModelCode::ALL.iter().map(move |m| (*m, self.get(*m)))
    }

    /// `{"55": n, "57": n, "59": n, "65": n}` for audit metadata.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

pub fn count_lines<'a, I>(lines: I) -> ModelCounts
where
    I: IntoIterator<Item = &'a str>,
{
    let mut counts = ModelCounts::new();
    for line in lines {
        counts.observe(line);
    }
    counts
}

pub fn count_text(text: &str) -> ModelCounts {
    count_lines(text.lines())
}

/// Invalid UTF-8 is replaced, which can only ever remove digits.
pub fn count_bytes(bytes: &[u8]) -> ModelCounts {
    count_text(&String::from_utf8_lossy(bytes))
}

/// Count a whole seekable source from its start.
///
/// The cursor is restored to its original position before returning,
/// including when the read fails.
pub fn count_from_reader<R: Read + Seek>(reader: &mut R) -> io::Result<ModelCounts> {
    let pos = reader.stream_position()?;
    reader.seek(SeekFrom::Start(0))?;

    let mut buf = Vec::new();
    let read = reader.read_to_end(&mut buf);
    let restored = reader.seek(SeekFrom::Start(pos));

    read?;
    restored?;
    Ok(count_bytes(&buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_digits_at_offset_twenty() {
        let key = "35190112345678000199550010000000011000000010";
        assert_eq!(classify_line(key), Some(ModelCode::M55));
    }

    #[test]
    fn separators_are_ignored() {
        let key = "3519 0112 3456 7800 0199 6500 1000 0000 0110 0000 0010";
        assert_eq!(classify_line(key), Some(ModelCode::M65));
    }

    #[test]
    fn exactly_twenty_two_digits_is_enough() {
        let key = format!("{}57", "0".repeat(20));
        assert_eq!(classify_line(&key), Some(ModelCode::M57));
        assert_eq!(classify_line(&key[..21]), None);
    }
}
