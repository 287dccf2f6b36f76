//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! App::run (app.rs):
//!     before-start hooks
//!     → TaskGroup (group.rs) with a child of the root Scope (scope.rs)
//!     → per component: start-runner + stop-waiter tasks
//!     → StartLatch (startup.rs) released once every start-runner is scheduled
//!     → after-start hooks
//!     → signal watcher (signals.rs)
//!     → wait for all tasks → after-stop hooks
//!
//! Shutdown (shutdown.rs):
//!     Signal received / ShutdownHandle::trigger / component failure
//!     → group scope cancelled → every stop-waiter calls Component::stop
//!       with a grace scope bounded by the stop timeout
//! ```
//!
//! # Design Decisions
//! - Components start and stop concurrently, never in dependency order
//! - The latch certifies scheduling, not readiness
//! - Only the first non-cancellation error is reported
//! - Stop has a deadline: a stuck component is reported, not awaited forever

pub mod app;
pub mod component;
pub mod group;
pub mod hooks;
pub mod scope;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use app::{App, AppMeta, DEFAULT_STOP_TIMEOUT};
pub use component::Component;
pub use group::TaskGroup;
pub use hooks::{HookPhase, Hooks};
pub use scope::{AppInfo, Scope, ScopeError};
pub use shutdown::ShutdownHandle;
pub use signals::{ChannelSignals, OsSignals, Signal, SignalSender, SignalSource};
pub use startup::StartLatch;
