// -
// Change indices

/// Sentinel meaning "no prior observation, perform an unconditional fetch"
pub const INITIAL_INDEX: u64 = 0;

/// Synthetic index returned by backends without a native index to force
/// an immediate fetch
pub const TRIGGER_INDEX: u64 = 1;

// -
// Flattening

/// Recursion cap for node tree walks
pub const MAX_TREE_DEPTH: usize = 64;

/// Hierarchical key separator
pub const PATH_SEPARATOR: char = '/';

// -
// Backend defaults

pub(crate) const DEFAULT_ETCD_NODE: &str = "http://127.0.0.1:2379";
pub(crate) const DEFAULT_CONSUL_NODE: &str = "127.0.0.1:8500";
pub(crate) const DEFAULT_SCHEME: &str = "http";

/// Upper bound of a server-side blocking query
pub(crate) const DEFAULT_MAX_WAIT_MS: u64 = 30_000;

/// Extra client-side slack on top of the server-side wait so the server
/// always answers first
pub(crate) const LONG_POLL_GRACE_MS: u64 = 5_000;

/// Mutations the memory backend keeps for blocking queries
pub(crate) const DEFAULT_HISTORY_WINDOW: u64 = 1_000;

pub(crate) const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3_000;
pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

// -
// Wire headers

pub(crate) const ETCD_INDEX_HEADER: &str = "X-Etcd-Index";
pub(crate) const CONSUL_INDEX_HEADER: &str = "X-Consul-Index";
pub(crate) const CONSUL_TOKEN_HEADER: &str = "X-Consul-Token";

/// etcd v2 error codes
pub(crate) const ETCD_ERROR_KEY_NOT_FOUND: u64 = 100;
pub(crate) const ETCD_ERROR_TEST_FAILED: u64 = 101;
pub(crate) const ETCD_ERROR_NODE_EXIST: u64 = 105;
pub(crate) const ETCD_ERROR_EVENT_INDEX_CLEARED: u64 = 401;
