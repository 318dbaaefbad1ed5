use serial_test::serial;
use temp_env::with_vars;

use super::*;
use crate::flatten::KeyCase;
use crate::Error;

fn cleanup_all_confd_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("CONFD__") || key == "CONFIG_PATH" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let config = ConfdConfig::default();

    assert_eq!(config.backend.kind, BackendKind::Etcd);
    assert_eq!(config.backend.scheme, "http");
    assert_eq!(config.backend.max_wait_ms, 30_000);
    assert!(config.backend.nodes.is_empty());
    assert!(config.backend.separator.is_none());
}

#[test]
#[serial]
fn new_should_merge_environment_overrides() {
    cleanup_all_confd_env_vars();
    with_vars(
        vec![
            ("CONFD__BACKEND__KIND", Some("consul")),
            ("CONFD__BACKEND__NODES", Some("10.0.0.1:8500,10.0.0.2:8500")),
            ("CONFD__BACKEND__MAX_WAIT_MS", Some("1500")),
        ],
        || {
            let config = ConfdConfig::new().unwrap();

            assert_eq!(config.backend.kind, BackendKind::Consul);
            assert_eq!(
                config.backend.nodes,
                vec!["10.0.0.1:8500".to_string(), "10.0.0.2:8500".to_string()]
            );
            assert_eq!(config.backend.max_wait_ms, 1500);
        },
    );
}

#[test]
#[serial]
fn new_should_load_file_named_by_config_path() {
    cleanup_all_confd_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("confd.toml");
    std::fs::write(
        &config_path,
        r#"
        [backend]
        kind = "etcd"
        nodes = ["http://10.0.0.9:2379"]
        prefix = "/production"
        separator = "_"
        key_case = "upper"
        "#,
    )
    .unwrap();

    with_vars(vec![("CONFIG_PATH", config_path.to_str())], || {
        let config = ConfdConfig::new().unwrap().validate().unwrap();

        assert_eq!(config.backend.nodes, vec!["http://10.0.0.9:2379".to_string()]);
        assert_eq!(config.backend.prefix, "/production");
        assert_eq!(config.backend.separator.as_deref(), Some("_"));
        assert_eq!(config.backend.key_case, KeyCase::Upper);
    });
}

#[test]
#[serial]
fn environment_should_win_over_config_file() {
    cleanup_all_confd_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("confd.toml");
    std::fs::write(
        &config_path,
        r#"
        [backend]
        prefix = "/from-file"
        "#,
    )
    .unwrap();

    with_vars(
        vec![
            ("CONFIG_PATH", config_path.to_str()),
            ("CONFD__BACKEND__PREFIX", Some("/from-env")),
        ],
        || {
            let config = ConfdConfig::new().unwrap();
            assert_eq!(config.backend.prefix, "/from-env");
        },
    );
}

#[test]
#[serial]
fn new_should_fail_when_config_path_is_missing() {
    cleanup_all_confd_env_vars();
    with_vars(vec![("CONFIG_PATH", Some("/nonexistent/confd.toml"))], || {
        let result = ConfdConfig::new();
        assert!(matches!(result, Err(Error::Config(_))));
    });
}

#[test]
#[serial]
fn with_override_config_should_merge_file_settings() {
    cleanup_all_confd_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("override.toml");
    std::fs::write(
        &config_path,
        r#"
        [backend]
        kind = "file"
        files = ["/etc/confd/app.yaml"]
        history_window = 32
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let base_config = ConfdConfig::new().expect("success");
        let config = base_config
            .with_override_config(config_path.to_str().unwrap())
            .unwrap()
            .validate()
            .unwrap();

        assert_eq!(config.backend.kind, BackendKind::File);
        assert_eq!(config.backend.files.len(), 1);
        assert_eq!(config.backend.history_window, 32);
        // untouched fields keep their defaults
        assert_eq!(config.backend.request_timeout_ms, 10_000);
    });
}

#[test]
fn validate_should_reject_file_backend_without_files() {
    let mut config = ConfdConfig::default();
    config.backend.kind = BackendKind::File;

    assert!(matches!(config.validate(), Err(Error::Config(_))));
}

#[test]
fn debug_output_should_redact_secrets() {
    let mut config = ConfdConfig::default();
    config.backend.username = Some("root".into());
    config.backend.password = Some("hunter2".into());
    config.backend.auth_token = Some("s3cr3t-token".into());

    let rendered = format!("{config:?}");
    assert!(rendered.contains("root"));
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("s3cr3t-token"));
}
