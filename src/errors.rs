//! Error hierarchy for the backend abstraction layer
//!
//! Errors are grouped by the component that raises them so the watch
//! orchestrator can decide retry cadence without knowing backend internals:
//! snapshot store lookups, tree flattening, and remote backend I/O.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Snapshot store lookups and pattern queries
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Hierarchical key tree flattening failures
    #[error(transparent)]
    Flatten(#[from] FlattenError),

    /// Remote backend communication and protocol failures
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A blocking call observed the shared cancellation signal
    #[error("Operation cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// Point lookup on a key the snapshot does not hold
    #[error("key does not exist: {key}")]
    NotFound { key: String },

    /// Pattern query matched zero entries
    #[error("no keys match: {pattern}")]
    NoMatch { pattern: String },

    /// Malformed glob pattern
    #[error("syntax error in pattern {pattern:?}: {reason}")]
    BadPattern { pattern: String, reason: &'static str },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FlattenError {
    /// Node tree is deeper than the configured recursion cap
    #[error("tree under {key} exceeds maximum depth {max_depth}")]
    DepthExceeded { key: String, max_depth: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Connection refused, timeout, DNS failure and similar transient faults
    #[error("{backend} transport error: {source}")]
    Transport {
        backend: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// No configured node could be reached
    #[error("{backend}: all nodes unreachable ({nodes})")]
    Unreachable { backend: &'static str, nodes: String },

    /// Long-poll exceeded the client side deadline
    #[error("{backend} request timed out after {duration:?}")]
    Timeout { backend: &'static str, duration: Duration },

    /// Missing or unparsable index header/field or body
    #[error("{backend} malformed response: {reason}")]
    MalformedResponse { backend: &'static str, reason: String },

    /// Status code outside the adapter's contract
    #[error("{backend} unexpected response code {status}: {body}")]
    UnexpectedStatus {
        backend: &'static str,
        status: u16,
        body: String,
    },

    /// Store answered an unconditional write with a refusal
    #[error("{backend} rejected write of {key}")]
    WriteRejected { backend: &'static str, key: String },

    /// Local file access failures
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Source document could not be decoded
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },

    /// Filesystem watcher failures
    #[error("watcher error: {0}")]
    Watcher(String),

    /// Operation not provided by this backend
    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// `configure` received an option it cannot accept
    #[error("invalid option {key}: {reason}")]
    InvalidOption { key: String, reason: String },

    /// Unknown backend name in configuration
    #[error("invalid backend: {0}")]
    InvalidBackend(String),
}

impl Error {
    /// Whether the orchestrator should back off and retry the whole
    /// fetch/watch cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Cancelled
                | Error::Backend(BackendError::Transport { .. })
                | Error::Backend(BackendError::Unreachable { .. })
                | Error::Backend(BackendError::Timeout { .. })
                | Error::Backend(BackendError::Watcher(_))
        )
    }

    /// Cancellation is never fatal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl BackendError {
    pub(crate) fn transport(
        backend: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        BackendError::Transport {
            backend,
            source: Box::new(source),
        }
    }

    pub(crate) fn malformed(
        backend: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        BackendError::MalformedResponse {
            backend,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_option(
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        BackendError::InvalidOption {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

impl From<notify::Error> for BackendError {
    fn from(e: notify::Error) -> Self {
        BackendError::Watcher(e.to_string())
    }
}
