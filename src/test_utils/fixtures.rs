use crate::config::BackendConfig;
use crate::config::BackendKind;
use crate::store::FlatMap;

/// Backend configuration pointing at `nodes`, with short timeouts.
pub(crate) fn http_config(
    kind: BackendKind,
    nodes: Vec<String>,
) -> BackendConfig {
    BackendConfig {
        nodes,
        max_wait_ms: 300,
        connect_timeout_ms: 500,
        request_timeout_ms: 2_000,
        ..BackendConfig::new(kind)
    }
}

pub(crate) fn flat_map(pairs: &[(&str, &str)]) -> FlatMap {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

pub(crate) fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}
