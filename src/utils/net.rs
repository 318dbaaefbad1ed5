use crate::constants::DEFAULT_SCHEME;

/// Accepts nodes either like `127.0.0.1:2379`, `etcd1:2379` or a full URL.
/// Nodes without a scheme get `scheme` (or `http` when empty).
pub(crate) fn with_scheme(
    node: &str,
    scheme: &str,
) -> String {
    let node = node.trim().trim_end_matches('/');
    if node.contains("://") {
        return node.to_string();
    }
    let scheme = if scheme.is_empty() { DEFAULT_SCHEME } else { scheme };
    format!("{scheme}://{node}")
}

/// Normalizes every configured node address.
pub(crate) fn with_scheme_all(
    nodes: &[String],
    scheme: &str,
) -> Vec<String> {
    nodes.iter().map(|n| with_scheme(n, scheme)).collect()
}
