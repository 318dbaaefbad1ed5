use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::constants::INITIAL_INDEX;
use crate::Result;

/// Outcome of one blocking query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexUpdate {
    /// Latest index reported by the backend. Equal to the requested index
    /// when the server-side wait elapsed without a change.
    Advanced(u64),
    /// The requested index is no longer retrievable (compacted history,
    /// expired credentials).
    HistoryCleared,
}

/// Native blocking query of an index-comparable backend.
#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait BlockingQuery: Send + Sync {
    /// Current index of `prefix`, answered without blocking.
    async fn current_index(
        &self,
        prefix: &str,
    ) -> Result<u64>;

    /// Blocks until the index of `prefix` moves past `wait_index` or the
    /// backend's maximum wait elapses.
    async fn next_index(
        &self,
        prefix: &str,
        wait_index: u64,
    ) -> Result<IndexUpdate>;
}

pub(crate) async fn long_poll(
    query: &dyn BlockingQuery,
    prefix: &str,
    wait_index: u64,
    cancel: &CancellationToken,
) -> Result<u64> {
    if cancel.is_cancelled() {
        return Ok(wait_index);
    }

    if wait_index == INITIAL_INDEX {
        return tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(wait_index),
            index = query.current_index(prefix) => index,
        };
    }

    // Dropping the losing branch releases the in-flight request.
    let update = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!(prefix, wait_index, "watch cancelled");
            return Ok(wait_index);
        }
        update = query.next_index(prefix, wait_index) => update?,
    };

    match update {
        IndexUpdate::Advanced(index) if index < wait_index => {
            warn!(prefix, wait_index, index, "backend index went backwards, resetting watch");
            Ok(INITIAL_INDEX)
        }
        IndexUpdate::Advanced(index) => Ok(index),
        IndexUpdate::HistoryCleared => {
            warn!(prefix, wait_index, "watch history cleared, resetting to unconditional fetch");
            Ok(INITIAL_INDEX)
        }
    }
}
