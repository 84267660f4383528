use ksi_config::load_layered_yaml_from_strings;

const BASE_YAML: &str = r#"
storage:
  upload_dir: "/srv/ksi/uploads"
  split_dir: "split"
split:
  download_prefix: "/nfe-55-65/download"
audit:
  jsonl_mirror: true
  hash_chain: true
"#;

const BASE_YAML_REORDERED: &str = r#"
audit:
  hash_chain: true
  jsonl_mirror: true
split:
  download_prefix: "/nfe-55-65/download"
storage:
  split_dir: "split"
  upload_dir: "/srv/ksi/uploads"
"#;

const OVERLAY_YAML: &str = r#"
storage:
  upload_dir: "/mnt/fast/uploads"
audit:
  hash_chain: false
"#;

#[test]
fn same_input_produces_identical_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    assert_eq!(a.config_hash, b.config_hash);
    assert_eq!(a.canonical_json, b.canonical_json);
}

#[test]
fn reordered_keys_produce_same_hash() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML_REORDERED]).unwrap();

    assert_eq!(a.config_hash, b.config_hash);
}

#[test]
fn overlay_overrides_only_what_it_names() {
    let merged = load_layered_yaml_from_strings(&[BASE_YAML, OVERLAY_YAML]).unwrap();
    let base = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();

    assert_ne!(merged.config_hash, base.config_hash);
    let v = &merged.config_json;
    assert_eq!(v.pointer("/storage/upload_dir").and_then(|x| x.as_str()), Some("/mnt/fast/uploads"));
    assert_eq!(v.pointer("/storage/split_dir").and_then(|x| x.as_str()), Some("split"));
    assert_eq!(v.pointer("/audit/hash_chain").and_then(|x| x.as_bool()), Some(false));
    assert_eq!(v.pointer("/audit/jsonl_mirror").and_then(|x| x.as_bool()), Some(true));
}

#[test]
fn hash_is_64_hex_chars() {
    let loaded = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    assert_eq!(loaded.config_hash.len(), 64);
    assert!(loaded.config_hash.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn empty_layer_is_ignored() {
    let a = load_layered_yaml_from_strings(&[BASE_YAML]).unwrap();
    let b = load_layered_yaml_from_strings(&[BASE_YAML, ""]).unwrap();
    assert_eq!(a.config_hash, b.config_hash);
}
