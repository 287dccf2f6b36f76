//! The lifecycle contract every managed server implements.

use async_trait::async_trait;

use crate::error::ComponentError;
use crate::lifecycle::scope::Scope;

/// A long-running unit managed by [`App`](crate::lifecycle::App).
///
/// The coordinator knows nothing about what a component serves. It calls
/// `start` once and `stop` once per run, concurrently, from separate tasks.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Stable identifier used in logs and errors.
    fn id(&self) -> &str;

    /// Serve until `scope` is cancelled or an unrecoverable error occurs.
    ///
    /// The scope carries the application info (see [`Scope::app_info`]).
    /// Returning `Ok` means a clean exit; returning early with an error
    /// shuts down every other component.
    async fn start(&self, scope: Scope) -> Result<(), ComponentError>;

    /// Shut down gracefully before `scope`'s deadline.
    ///
    /// Implementations should return [`ComponentError::DeadlineExceeded`]
    /// if they cannot finish in time rather than blocking.
    async fn stop(&self, scope: Scope) -> Result<(), ComponentError>;
}
