//! The lifecycle coordinator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::config::AppSettings;
use crate::error::AppError;
use crate::lifecycle::component::Component;
use crate::lifecycle::group::TaskGroup;
use crate::lifecycle::hooks::{HookPhase, Hooks};
use crate::lifecycle::scope::{AppInfo, Scope};
use crate::lifecycle::shutdown::ShutdownHandle;
use crate::lifecycle::signals::{OsSignals, Signal, SignalSource};
use crate::lifecycle::startup::StartLatch;

/// Grace period each component gets to stop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(60);

/// Application identity handed to components through their scope.
#[derive(Debug, Clone, Serialize)]
pub struct AppMeta {
    pub id: String,
    pub name: String,
    pub version: String,
    pub metadata: HashMap<String, String>,
}

impl AppInfo for AppMeta {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

/// Starts a fixed set of components together and stops them together.
///
/// Built once with [`App::new`] and consumed by [`App::run`]. Use
/// [`App::shutdown_handle`] to stop a running app from elsewhere.
pub struct App {
    meta: AppMeta,
    components: Vec<Arc<dyn Component>>,
    signals: Box<dyn SignalSource>,
    root: Scope,
    shutdown: ShutdownHandle,
    stop_timeout: Duration,
    hooks: Hooks,
}

impl App {
    /// Create a coordinator listening for SIGTERM, SIGQUIT and SIGINT.
    pub fn new(components: Vec<Arc<dyn Component>>) -> Self {
        let root = Scope::new();
        Self {
            meta: AppMeta {
                id: uuid::Uuid::new_v4().to_string(),
                name: env!("CARGO_PKG_NAME").to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                metadata: HashMap::new(),
            },
            components,
            signals: Box::new(OsSignals::default()),
            shutdown: ShutdownHandle::new(root.clone()),
            root,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            hooks: Hooks::default(),
        }
    }

    /// Create a coordinator from the `[app]` config section.
    pub fn from_config(settings: &AppSettings, components: Vec<Arc<dyn Component>>) -> Self {
        let mut app = Self::new(components)
            .with_name(settings.name.clone())
            .with_version(settings.version.clone())
            .with_stop_timeout(Duration::from_secs(settings.stop_timeout_secs))
            .with_signals(settings.signals.iter().copied());
        if let Some(id) = &settings.id {
            app = app.with_id(id.clone());
        }
        app.meta.metadata.extend(settings.metadata.clone());
        app
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.meta.id = id.into();
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.meta.name = name.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.meta.version = version.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.metadata.insert(key.into(), value.into());
        self
    }

    /// Grace period for each component's `stop`.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Listen for these OS signals instead of the default set.
    pub fn with_signals(self, signals: impl IntoIterator<Item = Signal>) -> Self {
        self.with_signal_source(OsSignals::new(signals))
    }

    /// Replace the signal source, e.g. with [`ChannelSignals`](crate::lifecycle::ChannelSignals) in tests.
    pub fn with_signal_source(mut self, source: impl SignalSource) -> Self {
        self.signals = Box::new(source);
        self
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn id(&self) -> &str {
        &self.meta.id
    }

    pub fn info(&self) -> &AppMeta {
        &self.meta
    }

    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Request shutdown. Safe to call any number of times, before or during `run`.
    pub fn stop(&self) -> Result<(), AppError> {
        self.shutdown.trigger();
        Ok(())
    }

    /// Start every component and block until all of them have stopped.
    ///
    /// Returns the first error that is not a plain cancellation.
    pub async fn run(self) -> Result<(), AppError> {
        let App {
            meta,
            components,
            mut signals,
            root,
            shutdown,
            stop_timeout,
            hooks,
        } = self;

        tracing::info!(
            app_id = %meta.id,
            name = %meta.name,
            version = %meta.version,
            components = components.len(),
            "Application starting"
        );

        let info: Arc<dyn AppInfo> = Arc::new(meta);
        let root = root.with_app_info(info);

        hooks.run(HookPhase::BeforeStart, &root).await?;

        let mut group = TaskGroup::new(&root);
        let scope = group.scope().clone();
        let latch = Arc::new(StartLatch::new(components.len()));

        for component in &components {
            let id = component.id().to_string();
            group.spawn(
                format!("{}/stop", id),
                stop_waiter(Arc::clone(component), scope.clone(), stop_timeout),
            );
            group.spawn(
                format!("{}/start", id),
                start_runner(Arc::clone(component), scope.clone(), Arc::clone(&latch)),
            );
        }

        latch.wait().await;
        tracing::debug!(components = components.len(), "All components scheduled");

        if let Err(err) = hooks.run(HookPhase::AfterStart, &scope).await {
            group.fail(err);
        }

        match signals.listen() {
            Ok(()) => {
                let scope = scope.clone();
                group.spawn("signal-watcher", async move {
                    tokio::select! {
                        _ = scope.cancelled() => {}
                        received = signals.recv() => match received {
                            Some(signal) => {
                                tracing::info!(%signal, "Received signal, shutting down");
                                shutdown.trigger();
                            }
                            None => scope.cancelled().await,
                        },
                    }
                    Ok(())
                });
            }
            Err(e) => group.fail(AppError::Signal(e)),
        }

        let result = match group.wait().await {
            Err(err) if err.is_cancellation() => Ok(()),
            other => other,
        };
        let after_stop = hooks
            .run(HookPhase::AfterStop, &root.grace(stop_timeout))
            .await;

        match result.and(after_stop) {
            Ok(()) => {
                tracing::info!("Application stopped");
                Ok(())
            }
            Err(err) => {
                tracing::error!(error = %err, "Application stopped with error");
                Err(err)
            }
        }
    }
}

/// Announce arrival, then serve until the component returns.
async fn start_runner(
    component: Arc<dyn Component>,
    scope: Scope,
    latch: Arc<StartLatch>,
) -> Result<(), AppError> {
    latch.arrive();

    let id = component.id().to_string();
    tracing::info!(component = %id, "Starting component");

    match component.start(scope).await {
        Ok(()) => {
            tracing::info!(component = %id, "Component exited");
            Ok(())
        }
        Err(source) => {
            if source.is_cancellation() {
                tracing::debug!(component = %id, "Component start cancelled");
            } else {
                tracing::error!(component = %id, error = %source, "Component failed");
            }
            Err(AppError::Start { id, source })
        }
    }
}

/// Wait for shutdown, then give the component its grace period to stop.
async fn stop_waiter(
    component: Arc<dyn Component>,
    scope: Scope,
    timeout: Duration,
) -> Result<(), AppError> {
    scope.cancelled().await;

    let id = component.id().to_string();
    let grace = scope.grace(timeout);
    let deadline = grace.deadline().unwrap_or_else(|| Instant::now() + timeout);
    tracing::info!(component = %id, timeout = ?timeout, "Stopping component");

    match tokio::time::timeout_at(deadline, component.stop(grace)).await {
        Ok(Ok(())) => {
            tracing::info!(component = %id, "Component stopped");
            Ok(())
        }
        Ok(Err(source)) => {
            tracing::warn!(component = %id, error = %source, "Component failed to stop cleanly");
            Err(AppError::Stop { id, source })
        }
        Err(_) => {
            tracing::error!(component = %id, timeout = ?timeout, "Component did not stop in time");
            Err(AppError::StopTimeout { id, timeout })
        }
    }
}
