//! Lifecycle hooks run at fixed points of the run protocol.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::error::{AppError, ComponentError};
use crate::lifecycle::scope::Scope;

/// Where in the run protocol a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPhase {
    /// Before any component task is launched. Failure aborts the run.
    BeforeStart,
    /// After every start-runner has been scheduled.
    AfterStart,
    /// After every component task has finished.
    AfterStop,
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookPhase::BeforeStart => write!(f, "before-start"),
            HookPhase::AfterStart => write!(f, "after-start"),
            HookPhase::AfterStop => write!(f, "after-stop"),
        }
    }
}

type HookFn = Arc<dyn Fn(Scope) -> BoxFuture<'static, Result<(), ComponentError>> + Send + Sync>;

/// Ordered hook lists, one per phase.
#[derive(Clone, Default)]
pub struct Hooks {
    before_start: Vec<HookFn>,
    after_start: Vec<HookFn>,
    after_stop: Vec<HookFn>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ComponentError>> + Send + 'static,
    {
        self.before_start.push(boxed(hook));
        self
    }

    pub fn after_start<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ComponentError>> + Send + 'static,
    {
        self.after_start.push(boxed(hook));
        self
    }

    pub fn after_stop<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ComponentError>> + Send + 'static,
    {
        self.after_stop.push(boxed(hook));
        self
    }

    pub fn len(&self, phase: HookPhase) -> usize {
        self.list(phase).len()
    }

    /// Run the hooks for `phase` in registration order, stopping at the first failure.
    pub(crate) async fn run(&self, phase: HookPhase, scope: &Scope) -> Result<(), AppError> {
        for (index, hook) in self.list(phase).iter().enumerate() {
            tracing::debug!(%phase, index, "Running lifecycle hook");
            hook(scope.clone())
                .await
                .map_err(|source| AppError::Hook { phase, source })?;
        }
        Ok(())
    }

    fn list(&self, phase: HookPhase) -> &[HookFn] {
        match phase {
            HookPhase::BeforeStart => &self.before_start,
            HookPhase::AfterStart => &self.after_start,
            HookPhase::AfterStop => &self.after_stop,
        }
    }
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("before_start", &self.before_start.len())
            .field("after_start", &self.after_start.len())
            .field("after_stop", &self.after_stop.len())
            .finish()
    }
}

fn boxed<F, Fut>(hook: F) -> HookFn
where
    F: Fn(Scope) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ComponentError>> + Send + 'static,
{
    Arc::new(move |scope| -> BoxFuture<'static, Result<(), ComponentError>> {
        Box::pin(hook(scope))
    })
}
