//! Startup-ready signal.
//!
//! A single-shot broadcast with cached completion: once startup settles,
//! every waiter is released and later subscribers observe the settled
//! state immediately. Failure latches: a failed startup is re-surfaced to
//! every subsequent waiter, forever.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::LarderError;

/// Settled or pending startup state.
#[derive(Debug, Clone, PartialEq, Eq)]
enum StartupState {
    Pending,
    Ready,
    Failed { version: u32, cause: String },
}

/// Handle to the startup signal. Cheap to clone; all clones observe the
/// same state.
#[derive(Debug, Clone)]
pub struct StartupGate {
    tx: Arc<watch::Sender<StartupState>>,
}

impl Default for StartupGate {
    fn default() -> Self {
        Self::new()
    }
}

impl StartupGate {
    /// Create a gate in the pending state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(StartupState::Pending);
        Self { tx: Arc::new(tx) }
    }

    /// Release all waiters: startup completed.
    pub fn mark_ready(&self) {
        let _ = self.tx.send(StartupState::Ready);
    }

    /// Latch a startup failure. All current and future waiters observe it.
    pub fn mark_failed(&self, version: u32, cause: impl Into<String>) {
        let _ = self.tx.send(StartupState::Failed {
            version,
            cause: cause.into(),
        });
    }

    /// Wait until startup settles. Returns immediately once it has.
    ///
    /// # Errors
    ///
    /// Returns the latched [`LarderError::MigrationFailed`] if startup
    /// failed.
    pub async fn wait(&self) -> Result<(), LarderError> {
        let mut rx = self.tx.subscribe();
        loop {
            let state = rx.borrow().clone();
            match state {
                StartupState::Ready => return Ok(()),
                StartupState::Failed { version, cause } => {
                    return Err(LarderError::MigrationFailed { version, cause });
                }
                StartupState::Pending => {}
            }
            if rx.changed().await.is_err() {
                // The gate owner vanished while still pending.
                return Err(LarderError::MigrationFailed {
                    version: 0,
                    cause: "startup aborted before completion".to_string(),
                });
            }
        }
    }

    /// Whether the gate has settled successfully.
    pub fn is_ready(&self) -> bool {
        *self.tx.borrow() == StartupState::Ready
    }
}
