//! Shared mock components for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use multi_server::lifecycle::{Component, Scope};
use multi_server::ComponentError;

/// What `start` does once called.
#[derive(Debug, Clone)]
pub enum StartBehavior {
    /// Serve until the scope is cancelled, then report cancellation.
    UntilCancelled,
    /// Fail straight away with this message.
    Fail(String),
    /// Panic straight away.
    Panic,
}

/// What `stop` does once called.
#[derive(Debug, Clone)]
pub enum StopBehavior {
    /// Return at once.
    Immediate,
    /// Sleep, ignoring the scope deadline.
    Sleep(Duration),
    /// Sleep, but give up with `DeadlineExceeded` when the scope expires.
    SleepWithDeadline(Duration),
    /// Fail with this message.
    Fail(String),
}

/// A component that records how the coordinator drove it.
pub struct MockComponent {
    id: String,
    start: StartBehavior,
    stop: StopBehavior,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub stop_finished: AtomicBool,
    pub seen_app_id: Mutex<Option<String>>,
    pub stop_had_deadline: AtomicBool,
    events: Option<Arc<Mutex<Vec<String>>>>,
}

impl MockComponent {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            start: StartBehavior::UntilCancelled,
            stop: StopBehavior::Immediate,
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            stop_finished: AtomicBool::new(false),
            seen_app_id: Mutex::new(None),
            stop_had_deadline: AtomicBool::new(false),
            events: None,
        }
    }

    pub fn failing(id: &str, message: &str) -> Self {
        Self::new(id).on_start(StartBehavior::Fail(message.to_string()))
    }

    pub fn on_start(mut self, behavior: StartBehavior) -> Self {
        self.start = behavior;
        self
    }

    pub fn on_stop(mut self, behavior: StopBehavior) -> Self {
        self.stop = behavior;
        self
    }

    pub fn with_events(mut self, events: Arc<Mutex<Vec<String>>>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    fn event(&self, what: &str) {
        if let Some(events) = &self.events {
            events.lock().unwrap().push(format!("{}:{}", self.id, what));
        }
    }
}

#[async_trait]
impl Component for MockComponent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self, scope: Scope) -> Result<(), ComponentError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_app_id.lock().unwrap() = scope.app_info().map(|app| app.id().to_string());
        self.event("start");

        match &self.start {
            StartBehavior::UntilCancelled => {
                scope.cancelled().await;
                Err(ComponentError::Cancelled)
            }
            StartBehavior::Fail(message) => Err(ComponentError::failed(message.clone())),
            StartBehavior::Panic => panic!("{} exploded", self.id),
        }
    }

    async fn stop(&self, scope: Scope) -> Result<(), ComponentError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.stop_had_deadline
            .store(scope.deadline().is_some(), Ordering::SeqCst);
        self.event("stop");

        let result = match &self.stop {
            StopBehavior::Immediate => Ok(()),
            StopBehavior::Sleep(delay) => {
                tokio::time::sleep(*delay).await;
                Ok(())
            }
            StopBehavior::SleepWithDeadline(delay) => {
                tokio::select! {
                    _ = tokio::time::sleep(*delay) => Ok(()),
                    reason = scope.done() => Err(ComponentError::from(reason)),
                }
            }
            StopBehavior::Fail(message) => Err(ComponentError::failed(message.clone())),
        };

        self.stop_finished.store(true, Ordering::SeqCst);
        result
    }
}

/// Erase the concrete type for `App::new`.
pub fn components(mocks: &[Arc<MockComponent>]) -> Vec<Arc<dyn Component>> {
    mocks
        .iter()
        .map(|mock| Arc::clone(mock) as Arc<dyn Component>)
        .collect()
}
