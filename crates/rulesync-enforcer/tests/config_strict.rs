#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use rulesync_enforcer::config::{self, AdapterKind, ModelConfigType, TransportKind};

const MINIMAL: &str = r#"
version: 1
profiles:
  default:
    model:
      config_type: text
      config_text: "[request_definition]"
    adapter:
      type: model
      class: sqlite
      dsn: "sqlite::memory:"
"#;

#[test]
fn deny_unknown_fields_nested() {
    let bad = r#"
version: 1
profiles:
  default:
    model:
      config_type: text
      config_text: ""
    adapter:
      type: model
      class: memory
      tabel: rules # typo should fail
"#;

    let err = config::load_from_str(bad).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn ok_minimal_config() {
    let cfg = config::load_from_str(MINIMAL).expect("must parse");
    assert_eq!(cfg.version, 1);
    assert_eq!(cfg.default_profile, "default");

    let p = cfg.select(None).unwrap().1;
    assert_eq!(p.model.config_type, ModelConfigType::Text);
    assert_eq!(p.model.definition().unwrap(), "[request_definition]");
    assert_eq!(p.adapter.kind, AdapterKind::Model);
    assert_eq!(p.adapter.table, "casbin_rule");
    assert!(p.watcher.is_none());
}

#[test]
fn watcher_defaults() {
    let yaml = format!("{MINIMAL}    watcher: {{}}\n");
    let cfg = config::load_from_str(&yaml).expect("must parse");
    let w = cfg.select(None).unwrap().1.watcher.clone().unwrap();
    assert_eq!(w.transport, TransportKind::Redis);
    assert_eq!(w.host, "127.0.0.1");
    assert_eq!(w.port, 6379);
    assert_eq!(w.password, "");
    assert_eq!(w.database, 0);
    assert_eq!(w.channel, "/casbin");
}

#[test]
fn unsupported_version() {
    let yaml = MINIMAL.replace("version: 1", "version: 2");
    let err = config::load_from_str(&yaml).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "UNSUPPORTED_VERSION");
}

#[test]
fn file_model_requires_path() {
    let yaml = MINIMAL.replace("config_type: text", "config_type: file");
    let err = config::load_from_str(&yaml).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
    assert!(err.to_string().contains("config_file_path"));
}

#[test]
fn missing_profile_is_named() {
    let cfg = config::load_from_str(MINIMAL).expect("must parse");
    let err = cfg.profile("staging").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
    assert!(err.to_string().contains("staging"));
}

#[test]
fn unknown_adapter_kind_is_rejected() {
    let yaml = MINIMAL.replace("type: model", "type: orm");
    let err = config::load_from_str(&yaml).expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}

#[test]
fn load_from_file_reads_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rulesync.yaml");
    std::fs::write(&path, MINIMAL).unwrap();
    let cfg = config::load_from_file(path.to_str().unwrap()).expect("must parse");
    assert!(cfg.profiles.contains_key("default"));

    let err = config::load_from_file("/nonexistent/rulesync.yaml").expect_err("must fail");
    assert_eq!(err.kind().as_str(), "CONFIG");
}
