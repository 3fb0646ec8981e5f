use std::fs::write;

use tempfile::NamedTempFile;

use cloud_infra::contract::Environment;
use cloud_infra::load_config::load_config;

#[test]
fn full_config_loads_with_all_sections() {
    let config_yaml = r#"
logging:
  logger_name: evolve-logger
  engine: google
  environment: production
gcp:
  project: dsg-infra
  app_name: evolve
  storage_endpoint: "http://localhost:4443/storage/v1"
  storage_upload_endpoint: "http://localhost:4443/upload/storage/v1"
  logging_endpoint: "http://localhost:8080"
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.logging.logger_name, "evolve-logger");
    assert_eq!(config.logging.engine, "google");
    assert_eq!(config.logging.environment, Environment::Production);
    assert_eq!(config.gcp.project, "dsg-infra");
    assert_eq!(config.gcp.app_name, "evolve");
    assert_eq!(
        config.gcp.storage_endpoint.as_deref(),
        Some("http://localhost:4443/storage/v1")
    );
    assert_eq!(
        config.gcp.logging_endpoint.as_deref(),
        Some("http://localhost:8080")
    );
}

#[test]
fn logging_section_defaults_apply_when_omitted() {
    let config_yaml = r#"
gcp:
  project: dsg-infra
  app_name: evolve
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(config_file.path()).expect("Config should load");

    assert_eq!(config.logging.logger_name, "infra");
    assert_eq!(config.logging.engine, "local");
    assert_eq!(config.logging.environment, Environment::Dev);
    assert!(config.gcp.storage_endpoint.is_none());
}

#[test]
fn missing_file_is_a_clear_error() {
    let err = load_config("/definitely/not/a/config.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}

#[test]
fn malformed_yaml_is_a_clear_error() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "gcp: [not, a, mapping").unwrap();

    let err = load_config(config_file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}
