//! Background worker component.
//!
//! Runs a job on a fixed interval until shut down. A failing job is logged and
//! retried on the next tick; it never takes the worker down.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio::time::MissedTickBehavior;

use crate::config::WorkerConfig;
use crate::error::ComponentError;
use crate::lifecycle::{Component, Scope};
use crate::servers::RunState;

type Job = Arc<dyn Fn(u64, Scope) -> BoxFuture<'static, Result<(), ComponentError>> + Send + Sync>;

/// Periodic background worker.
pub struct Worker {
    config: WorkerConfig,
    state: RunState,
    ticks: AtomicU64,
    job: Job,
}

impl Worker {
    /// Create a worker whose job logs a heartbeat.
    ///
    /// A zero `interval_ms` is raised to 1ms.
    pub fn new(mut config: WorkerConfig) -> Self {
        if config.interval_ms == 0 {
            tracing::warn!(component = %config.name, "Worker interval is zero, using 1ms");
            config.interval_ms = 1;
        }
        Self {
            config,
            state: RunState::new(),
            ticks: AtomicU64::new(0),
            job: Arc::new(|tick, scope| -> BoxFuture<'static, Result<(), ComponentError>> {
                Box::pin(heartbeat(tick, scope))
            }),
        }
    }

    /// Replace the job. It receives the tick number (starting at 1) and the
    /// worker's start scope.
    pub fn with_job<F, Fut>(mut self, job: F) -> Self
    where
        F: Fn(u64, Scope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ComponentError>> + Send + 'static,
    {
        self.job = Arc::new(
            move |tick, scope| -> BoxFuture<'static, Result<(), ComponentError>> {
                Box::pin(job(tick, scope))
            },
        );
        self
    }

    /// Number of job runs so far.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }
}

#[async_trait]
impl Component for Worker {
    fn id(&self) -> &str {
        &self.config.name
    }

    async fn start(&self, scope: Scope) -> Result<(), ComponentError> {
        let running = self.state.begin(&scope);
        let token = running.token().clone();

        tracing::info!(
            component = %self.config.name,
            interval_ms = self.config.interval_ms,
            "Worker starting"
        );

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
                    let job = (self.job)(tick, scope.clone());
                    tokio::select! {
                        _ = token.cancelled() => {
                            tracing::debug!(component = %self.config.name, tick, "Worker job abandoned");
                            break;
                        }
                        result = job => {
                            if let Err(e) = result {
                                tracing::warn!(component = %self.config.name, tick, error = %e, "Worker job failed");
                            }
                        }
                    }
                }
            }
        }

        tracing::info!(component = %self.config.name, ticks = self.ticks(), "Worker stopped");
        Ok(())
    }

    async fn stop(&self, scope: Scope) -> Result<(), ComponentError> {
        self.state.request_shutdown();
        self.state.wait_stopped(&scope).await
    }
}

async fn heartbeat(tick: u64, scope: Scope) -> Result<(), ComponentError> {
    let app_id = scope.app_info().map(|app| app.id().to_string());
    tracing::debug!(tick, app_id = ?app_id, "Worker heartbeat");
    Ok(())
}
