//! Change-detection strategies shared by every backend.
//!
//! Backends differ in how they learn about changes: some expose a blocking
//! query over a monotonically increasing index, some push callbacks, some
//! offer nothing at all. Each adapter picks one [`ChangeDetection`] variant
//! and forwards `watch_prefix` to it, so all of them honor the same rules:
//!
//! - `wait_index == 0` never blocks.
//! - A reported change always carries an index greater than `wait_index`.
//! - Cancellation returns the last known index without error.
//! - A history reset is reported as index `0`.

mod listener;
mod long_poll;

pub(crate) use listener::*;
pub(crate) use long_poll::*;


use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::constants::INITIAL_INDEX;
use crate::constants::TRIGGER_INDEX;
use crate::Result;

pub(crate) enum ChangeDetection<'a> {
    /// Index-comparable blocking query
    LongPoll(&'a dyn BlockingQuery),
    /// Callback-fed notification channel
    Listener(&'a ListenerWatcher),
    /// No native watch support
    Passive,
}

impl ChangeDetection<'_> {
    pub(crate) async fn wait(
        self,
        prefix: &str,
        wait_index: u64,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        match self {
            ChangeDetection::LongPoll(query) => long_poll(query, prefix, wait_index, cancel).await,
            ChangeDetection::Listener(watcher) => watcher.wait(wait_index, cancel).await,
            ChangeDetection::Passive => passive(wait_index, cancel).await,
        }
    }
}

/// Blocks until cancellation. The first call answers immediately with a
/// trigger so the caller performs its initial fetch; later ones rely on the
/// caller's own re-fetch cadence.
async fn passive(
    wait_index: u64,
    cancel: &CancellationToken,
) -> Result<u64> {
    if wait_index == INITIAL_INDEX {
        return Ok(TRIGGER_INDEX);
    }
    cancel.cancelled().await;
    trace!("passive watch cancelled");
    Ok(INITIAL_INDEX)
}
