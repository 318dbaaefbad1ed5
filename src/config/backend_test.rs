use std::collections::HashMap;
use std::time::Duration;

use super::*;
use crate::flatten::KeyCase;
use crate::BackendError;
use crate::Error;

fn options(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

#[test]
fn backend_kind_parses_case_insensitively() {
    assert_eq!("Consul".parse::<BackendKind>().unwrap(), BackendKind::Consul);
    assert_eq!("".parse::<BackendKind>().unwrap(), BackendKind::Etcd);
    assert!(matches!(
        "zookeeper".parse::<BackendKind>(),
        Err(BackendError::InvalidBackend(name)) if name == "zookeeper"
    ));
}

#[test]
fn from_options_should_parse_known_keys() {
    let cfg = BackendConfig::from_options(&options(&[
        ("backend", "consul"),
        ("nodes", "a:8500, b:8500,"),
        ("prefix", "/app"),
        ("separator", "_"),
        ("key_case", "lower"),
        ("auth_token", "tok"),
        ("datacenter", "dc1"),
        ("max_wait_ms", "2000"),
    ]))
    .unwrap();

    assert_eq!(cfg.kind, BackendKind::Consul);
    assert_eq!(cfg.nodes, vec!["a:8500".to_string(), "b:8500".to_string()]);
    assert_eq!(cfg.prefix, "/app");
    assert_eq!(cfg.separator.as_deref(), Some("_"));
    assert_eq!(cfg.key_case, KeyCase::Lower);
    assert_eq!(cfg.auth_token.as_deref(), Some("tok"));
    assert_eq!(cfg.datacenter.as_deref(), Some("dc1"));
    assert_eq!(cfg.max_wait(), Duration::from_millis(2000));
}

#[test]
fn from_options_should_reject_unknown_keys() {
    let err = BackendConfig::from_options(&options(&[("colour", "blue")])).unwrap_err();
    assert!(matches!(err, BackendError::InvalidOption { key, .. } if key == "colour"));
}

#[test]
fn from_options_should_reject_non_numeric_durations() {
    let err = BackendConfig::from_options(&options(&[("max_wait_ms", "soon")])).unwrap_err();
    assert!(matches!(err, BackendError::InvalidOption { key, .. } if key == "max_wait_ms"));
}

#[test]
fn nodes_or_default_falls_back_per_backend() {
    assert_eq!(
        BackendConfig::new(BackendKind::Etcd).nodes_or_default(),
        vec!["http://127.0.0.1:2379".to_string()]
    );
    assert_eq!(
        BackendConfig::new(BackendKind::Consul).nodes_or_default(),
        vec!["127.0.0.1:8500".to_string()]
    );
    assert!(BackendConfig::new(BackendKind::Env).nodes_or_default().is_empty());

    let mut cfg = BackendConfig::new(BackendKind::Etcd);
    cfg.nodes = vec!["http://n1:2379".into()];
    assert_eq!(cfg.nodes_or_default(), vec!["http://n1:2379".to_string()]);
}

#[test]
fn key_translator_follows_prefix_separator_and_case() {
    let mut cfg = BackendConfig::default();
    cfg.prefix = "/production".into();
    assert_eq!(cfg.key_translator().translate("/production/nginx/port"), "/nginx/port");

    cfg.separator = Some("_".into());
    cfg.key_case = KeyCase::Upper;
    assert_eq!(cfg.key_translator().translate("/production/nginx/port"), "NGINX_PORT");
}

#[test]
fn validate_rejects_inconsistent_settings() {
    let cases: Vec<Box<dyn Fn(&mut BackendConfig)>> = vec![
        Box::new(|c| c.separator = Some(String::new())),
        Box::new(|c| c.max_wait_ms = 0),
        Box::new(|c| c.request_timeout_ms = 0),
        Box::new(|c| c.username = Some("root".into())),
        Box::new(|c| c.history_window = 0),
        Box::new(|c| c.scheme = "gopher".into()),
    ];

    for mutate in cases {
        let mut cfg = BackendConfig::default();
        mutate(&mut cfg);
        assert!(matches!(cfg.validate(), Err(Error::Config(_))), "{cfg:?}");
    }
}

#[test]
fn validate_accepts_defaults() {
    assert!(BackendConfig::default().validate().is_ok());
    assert!(BackendConfig::new(BackendKind::Memory).validate().is_ok());
}
