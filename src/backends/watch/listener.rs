use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::constants::INITIAL_INDEX;
use crate::constants::TRIGGER_INDEX;
use crate::BackendError;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChangeEvent {
    Changed,
    Failed(String),
}

/// Sending half handed to backend callbacks. Safe to call from any thread.
#[derive(Debug, Clone)]
pub(crate) struct ChangeNotifier {
    tx: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChangeNotifier {
    pub(crate) fn changed(&self) {
        // The receiver lives as long as the watcher; a send error only
        // happens during teardown.
        let _ = self.tx.send(ChangeEvent::Changed);
    }

    pub(crate) fn failed(
        &self,
        reason: impl Into<String>,
    ) {
        let _ = self.tx.send(ChangeEvent::Failed(reason.into()));
    }
}

/// Installs a backend's change listener.
pub(crate) trait ListenerRegistration: Send + Sync {
    /// Starts delivering change events to `notifier`, replacing any listener
    /// installed earlier.
    fn register(
        &self,
        notifier: ChangeNotifier,
    ) -> Result<()>;
}

/// Callback-driven change detection.
///
/// The listener is registered on first use and kept across calls, so a change
/// landing between two `wait` calls is still delivered to the next one. Each
/// notification unblocks exactly one `wait`.
pub(crate) struct ListenerWatcher {
    registration: Arc<dyn ListenerRegistration>,
    notifier: ChangeNotifier,
    events: Mutex<mpsc::UnboundedReceiver<ChangeEvent>>,
    registered: AtomicBool,
    trigger: AtomicU64,
}

impl ListenerWatcher {
    pub(crate) fn new(registration: Arc<dyn ListenerRegistration>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            registration,
            notifier: ChangeNotifier { tx },
            events: Mutex::new(rx),
            registered: AtomicBool::new(false),
            trigger: AtomicU64::new(INITIAL_INDEX),
        }
    }

    /// Forces re-registration on the next `wait`, e.g. after the watched
    /// sources were reconfigured.
    pub(crate) fn reset(&self) {
        self.registered.store(false, Ordering::SeqCst);
    }

    fn ensure_registered(&self) -> Result<()> {
        if self.registered.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.registration.register(self.notifier.clone()) {
            self.registered.store(false, Ordering::SeqCst);
            return Err(e);
        }
        debug!("change listener registered");
        Ok(())
    }

    pub(crate) async fn wait(
        &self,
        wait_index: u64,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if wait_index == INITIAL_INDEX {
            self.ensure_registered()?;
            // The fetch this trigger causes covers anything queued so far.
            let mut events = self.events.lock().await;
            while events.try_recv().is_ok() {}
            self.trigger.store(TRIGGER_INDEX, Ordering::SeqCst);
            return Ok(TRIGGER_INDEX);
        }

        self.ensure_registered()?;
        let mut events = self.events.lock().await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                trace!(wait_index, "listener watch cancelled");
                Ok(wait_index)
            }
            event = events.recv() => match event {
                Some(ChangeEvent::Changed) => {
                    // Waits are serialized by the events lock.
                    let next = (self.trigger.load(Ordering::SeqCst) + 1).max(wait_index + 1);
                    self.trigger.store(next, Ordering::SeqCst);
                    Ok(next)
                }
                Some(ChangeEvent::Failed(reason)) => Err(BackendError::Watcher(reason).into()),
                None => Err(BackendError::Watcher("change listener closed".to_string()).into()),
            },
        }
    }
}
