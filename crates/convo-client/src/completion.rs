//! One-shot completion gate.
//!
//! A gate starts closed and opens exactly once. Waiters that arrive before
//! the gate opens are woken together; waiters that arrive afterwards return
//! immediately. Opening an open gate is a no-op.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::error::Error;

/// The waiting side of a one-shot gate.
#[derive(Debug, Clone)]
pub struct CompletionGate {
    state: Arc<watch::Sender<bool>>,
}

/// The firing side of a [`CompletionGate`]. Cheap to clone and hand to callbacks.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    state: Arc<watch::Sender<bool>>,
}

impl CompletionGate {
    /// Create a closed gate.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    /// A handle that can open this gate.
    pub fn signal(&self) -> CompletionSignal {
        CompletionSignal {
            state: self.state.clone(),
        }
    }

    /// Whether the gate has been opened.
    pub fn is_fired(&self) -> bool {
        *self.state.borrow()
    }

    /// Wait until the gate opens.
    pub async fn wait(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Wait until the gate opens or `timeout` elapses.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<(), Error> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| Error::Timeout {
                operation: "completion",
                after: timeout,
            })
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionSignal {
    /// Open the gate. Returns `true` only for the call that opened it.
    pub fn fire(&self) -> bool {
        let opened = self.state.send_if_modified(|fired| {
            if *fired {
                false
            } else {
                *fired = true;
                true
            }
        });
        if opened {
            tracing::debug!("completion gate fired");
        }
        opened
    }

    /// Whether the gate has been opened.
    pub fn is_fired(&self) -> bool {
        *self.state.borrow()
    }
}
