//! Shutdown trigger for the coordinator.

use crate::lifecycle::scope::Scope;

/// Clonable handle that requests shutdown of a running [`App`](crate::lifecycle::App).
///
/// Triggering cancels the app's root scope. Any number of triggers, from any
/// task, before or after `run`, have the effect of one.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    root: Scope,
}

impl ShutdownHandle {
    pub(crate) fn new(root: Scope) -> Self {
        Self { root }
    }

    /// Request shutdown.
    pub fn trigger(&self) {
        if !self.root.is_cancelled() {
            tracing::info!("Shutdown requested");
        }
        self.root.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.root.is_cancelled()
    }

    /// Wait until shutdown has been requested.
    pub async fn triggered(&self) {
        self.root.cancelled().await
    }
}
