//! Error types for components and the coordinator.

use std::time::Duration;
use thiserror::Error;

use crate::lifecycle::hooks::HookPhase;
use crate::lifecycle::scope::ScopeError;

/// Boxed error for component failures that do not fit a specific variant.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors returned by a component's `start` or `stop`.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// The component's scope was cancelled.
    #[error("context canceled")]
    Cancelled,

    /// The component's scope deadline passed before it finished.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// I/O failure (bind, accept, ...).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Free-form failure message.
    #[error("{0}")]
    Failed(String),

    /// Wrapped error from an underlying library.
    #[error(transparent)]
    Other(BoxError),
}

impl ComponentError {
    /// Build a `Failed` error from any message.
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Wrap any error type.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ScopeError> for ComponentError {
    fn from(err: ScopeError) -> Self {
        match err {
            ScopeError::Cancelled => Self::Cancelled,
            ScopeError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// Errors surfaced by [`App::run`](crate::lifecycle::App::run).
#[derive(Debug, Error)]
pub enum AppError {
    /// A component's `start` returned an error.
    #[error("component '{id}' failed to start: {source}")]
    Start {
        id: String,
        #[source]
        source: ComponentError,
    },

    /// A component's `stop` returned an error.
    #[error("component '{id}' failed to stop: {source}")]
    Stop {
        id: String,
        #[source]
        source: ComponentError,
    },

    /// A component's `stop` was still pending when its grace period ran out.
    #[error("component '{id}' did not stop within {timeout:?}: context deadline exceeded")]
    StopTimeout { id: String, timeout: Duration },

    /// A lifecycle hook failed.
    #[error("{phase} hook failed: {source}")]
    Hook {
        phase: HookPhase,
        #[source]
        source: ComponentError,
    },

    /// Subscribing to process signals failed.
    #[error("failed to subscribe to signals: {0}")]
    Signal(#[source] std::io::Error),

    /// A coordinator task panicked.
    #[error("task '{task}' panicked")]
    Panicked { task: String },
}

impl AppError {
    /// True when the error only reflects scope cancellation.
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Start { source, .. } | Self::Stop { source, .. } | Self::Hook { source, .. } => {
                source.is_cancellation()
            }
            _ => false,
        }
    }

    /// True when a stop ran past its deadline, whether the component or the
    /// coordinator noticed first.
    pub fn is_deadline_exceeded(&self) -> bool {
        match self {
            Self::StopTimeout { .. } => true,
            Self::Start { source, .. } | Self::Stop { source, .. } => {
                matches!(source, ComponentError::DeadlineExceeded)
            }
            _ => false,
        }
    }

    /// Identifier of the component the error belongs to, if any.
    pub fn component(&self) -> Option<&str> {
        match self {
            Self::Start { id, .. } | Self::Stop { id, .. } | Self::StopTimeout { id, .. } => {
                Some(id)
            }
            _ => None,
        }
    }
}
