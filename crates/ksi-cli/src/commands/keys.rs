use anyhow::{Context, Result};
use chrono::Utc;
use ksi_classify::{count_bytes, enforce_expected_model};
use ksi_schemas::ModelCode;
use ksi_split::SplitEngine;
use ksi_storage::LocalBlobStore;
use std::fs;
use std::path::Path;

pub fn classify(file: &Path, expected: Option<&str>) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("read key batch {}", file.display()))?;
    let counts = count_bytes(&bytes);

    for (model, n) in counts.iter() {
        println!("model_{}={}", model, n);
    }
    println!("total={}", counts.total());

    if let Some(exp) = expected {
        let model = ModelCode::from_digits(exp.trim())
            .with_context(|| format!("invalid --expected '{exp}'. expected one of: 55 | 65 | 57 | 59"))?;
        enforce_expected_model(&counts, model)?;
        println!("gate=ok expected={model}");
    }
    Ok(())
}

pub fn split(file: &Path, out: &Path, download_prefix: &str) -> Result<()> {
    let bytes = fs::read(file).with_context(|| format!("read key batch {}", file.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let engine = SplitEngine::new(download_prefix);
    let result = engine.split(&LocalBlobStore, &text, out, Utc::now())?;

    for (model, path) in result.written() {
        println!("model_{}={}", model, path);
    }
    println!("{}", result.to_json());
    Ok(())
}
