//! Concrete components managed by the coordinator.
//!
//! # Data Flow
//! ```text
//! App start-runner → Component::start(scope)
//!     → http.rs   (axum: /healthz, /info)
//!     → rpc.rs    (newline-delimited JSON-RPC over TCP)
//!     → worker.rs (periodic background job)
//!
//! App stop-waiter → Component::stop(grace scope)
//!     → RunState::request_shutdown → serve loop exits
//!     → RunState::wait_stopped (bounded by the grace deadline)
//! ```
//!
//! # Design Decisions
//! - Each server's shutdown token is a child of its start scope, so either
//!   scope cancellation or an explicit stop ends the serve loop
//! - `stop` only signals and waits; the serve loop does the actual teardown

pub mod http;
pub mod rpc;
pub mod worker;

pub use http::HttpServer;
pub use rpc::RpcServer;
pub use worker::Worker;

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{json, Value};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::ComponentError;
use crate::lifecycle::{AppInfo, Scope};

/// Where a server is in its start/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Never started. A stop requested here applies to the next `begin`.
    Idle { stop_pending: bool },
    Running,
    /// The last run ended. A late stop is a no-op.
    Stopped,
}

#[derive(Debug)]
struct Control {
    token: CancellationToken,
    phase: Phase,
}

/// Shared start/stop bookkeeping for the servers in this module.
#[derive(Debug)]
pub(crate) struct RunState {
    control: Mutex<Control>,
    running: watch::Sender<bool>,
    addr: watch::Sender<Option<SocketAddr>>,
}

impl RunState {
    pub(crate) fn new() -> Self {
        Self {
            control: Mutex::new(Control {
                token: CancellationToken::new(),
                phase: Phase::Idle {
                    stop_pending: false,
                },
            }),
            running: watch::channel(false).0,
            addr: watch::channel(None).0,
        }
    }

    /// Mark the component as running. The returned guard marks it stopped on drop.
    ///
    /// If `stop` was requested before the first run, the returned token is
    /// already cancelled.
    pub(crate) fn begin(&self, scope: &Scope) -> Running<'_> {
        let token = scope.token().child_token();
        let mut control = self.lock_control();
        if control.phase == (Phase::Idle { stop_pending: true }) {
            token.cancel();
        }
        control.token = token.clone();
        control.phase = Phase::Running;
        self.running.send_replace(true);
        Running { state: self, token }
    }

    pub(crate) fn set_addr(&self, addr: SocketAddr) {
        self.addr.send_replace(Some(addr));
    }

    pub(crate) fn local_addr(&self) -> Option<SocketAddr> {
        *self.addr.borrow()
    }

    /// Wait until the server has bound its listener.
    pub(crate) async fn bound(&self) -> SocketAddr {
        let mut rx = self.addr.subscribe();
        loop {
            if let Some(addr) = *rx.borrow_and_update() {
                return addr;
            }
            if rx.changed().await.is_err() {
                // Sender lives in self, so this only happens during teardown.
                std::future::pending::<()>().await;
            }
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub(crate) fn request_shutdown(&self) {
        let mut control = self.lock_control();
        match control.phase {
            Phase::Running => control.token.cancel(),
            Phase::Idle { .. } => {
                control.phase = Phase::Idle { stop_pending: true };
            }
            Phase::Stopped => {}
        }
    }

    /// Wait for the serve loop to exit, or fail when `scope` is done first.
    pub(crate) async fn wait_stopped(&self, scope: &Scope) -> Result<(), ComponentError> {
        let mut rx = self.running.subscribe();
        tokio::select! {
            _ = async { rx.wait_for(|running| !*running).await.map(|_| ()) } => Ok(()),
            reason = scope.done() => Err(reason.into()),
        }
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Guard for one run of a server.
pub(crate) struct Running<'a> {
    state: &'a RunState,
    token: CancellationToken,
}

impl Running<'_> {
    /// Cancelled when the start scope is cancelled or `stop` is requested.
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        let mut control = self.state.lock_control();
        control.phase = Phase::Stopped;
        self.state.addr.send_replace(None);
        self.state.running.send_replace(false);
    }
}

/// JSON view of the application info.
pub(crate) fn describe(info: &dyn AppInfo) -> Value {
    json!({
        "id": info.id(),
        "name": info.name(),
        "version": info.version(),
        "metadata": info.metadata(),
    })
}
