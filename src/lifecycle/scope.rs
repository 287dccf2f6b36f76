//! Cancellable execution scopes that carry application info.
//!
//! A [`Scope`] is what the coordinator hands to every component. It bundles:
//! - a cancellation token (children are cancelled with their parent)
//! - an optional deadline (set on the scope passed to `stop`)
//! - an optional [`AppInfo`] handle, so code nested inside a component can
//!   find out which application it runs under without extra parameters
//!
//! Cancellation is one-way: once a scope is cancelled it stays cancelled and
//! further `cancel` calls do nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Identity of the running application, as seen by components.
pub trait AppInfo: Send + Sync + 'static {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    fn metadata(&self) -> &HashMap<String, String>;
}

/// Why a scope is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeError {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeError::Cancelled => write!(f, "context canceled"),
            ScopeError::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

impl std::error::Error for ScopeError {}

/// A node in the cancellation tree.
#[derive(Clone, Default)]
pub struct Scope {
    token: CancellationToken,
    deadline: Option<Instant>,
    app: Option<Arc<dyn AppInfo>>,
}

impl Scope {
    /// Create a new root scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a child scope. Cancelling the child leaves the parent alone.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            app: self.app.clone(),
        }
    }

    /// Derive a child scope that also expires at `deadline`.
    ///
    /// A parent deadline that is earlier wins.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(earliest(self.deadline, deadline));
        child
    }

    /// Derive a child scope that expires `timeout` from now.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive the scope handed to a component's `stop`.
    ///
    /// The parent is typically already cancelled at this point, so the grace
    /// scope gets a fresh token. It keeps the parent's app info and any
    /// earlier parent deadline, and expires `period` from now.
    pub fn grace(&self, period: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(earliest(self.deadline, Instant::now() + period)),
            app: self.app.clone(),
        }
    }

    /// Same scope (shared token), annotated with `app`.
    pub fn with_app_info(&self, app: Arc<dyn AppInfo>) -> Self {
        Self {
            token: self.token.clone(),
            deadline: self.deadline,
            app: Some(app),
        }
    }

    /// The application info carried by this scope.
    ///
    /// `None` when the scope was not created by a running coordinator.
    pub fn app_info(&self) -> Option<Arc<dyn AppInfo>> {
        self.app.clone()
    }

    /// Cancel this scope and all of its children. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Why the scope is done, or `None` while it is still live.
    pub fn err(&self) -> Option<ScopeError> {
        if self.token.is_cancelled() {
            return Some(ScopeError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ScopeError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Wait until the scope is cancelled. Ignores the deadline.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Wait until the scope is cancelled or its deadline passes.
    pub async fn done(&self) -> ScopeError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => ScopeError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => ScopeError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ScopeError::Cancelled
            }
        }
    }

    /// The underlying token, for APIs that want one directly.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("app", &self.app.as_ref().map(|a| a.id().to_string()))
            .finish()
    }
}

fn earliest(parent: Option<Instant>, candidate: Instant) -> Instant {
    match parent {
        Some(p) if p < candidate => p,
        _ => candidate,
    }
}
