//! Task group: concurrent tasks with a shared scope and first-error result.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};

use futures_util::FutureExt;
use tokio::task::JoinSet;

use crate::error::AppError;
use crate::lifecycle::scope::Scope;

/// A set of tasks that fail together.
///
/// The group's scope is a child of the parent passed to [`TaskGroup::new`].
/// It is cancelled as soon as any task returns an error (or panics). Only the
/// first error that is not a plain cancellation is kept.
pub struct TaskGroup {
    scope: Scope,
    tasks: JoinSet<()>,
    first_error: Arc<Mutex<Option<AppError>>>,
}

impl TaskGroup {
    pub fn new(parent: &Scope) -> Self {
        Self {
            scope: parent.child(),
            tasks: JoinSet::new(),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    /// The scope shared by every task in the group.
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Launch a task. `name` identifies it if it panics.
    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<(), AppError>> + Send + 'static,
    {
        let name = name.into();
        let scope = self.scope.clone();
        let first_error = Arc::clone(&self.first_error);

        self.tasks.spawn(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(AppError::Panicked { task: name }),
            };

            if let Err(err) = result {
                record(&first_error, err);
                scope.cancel();
            }
        });
    }

    /// Record `err` as if a task had returned it.
    pub fn fail(&self, err: AppError) {
        record(&self.first_error, err);
        self.scope.cancel();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Wait for every task, then return the first recorded error.
    pub async fn wait(mut self) -> Result<(), AppError> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                // Panics are caught inside the task, so this is an abort.
                tracing::debug!(error = %e, "Task group member aborted");
            }
        }

        let first = self
            .first_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn record(slot: &Mutex<Option<AppError>>, err: AppError) {
    if err.is_cancellation() {
        tracing::debug!(error = %err, "Ignoring cancellation error");
        return;
    }
    let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    if slot.is_none() {
        *slot = Some(err);
    } else {
        tracing::debug!(error = %err, "Discarding error after first failure");
    }
}
