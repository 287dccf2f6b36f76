//! Coordinator protocol tests driven by mock components.

use std::future::Ready;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use multi_server::lifecycle::{App, ChannelSignals, HookPhase, Hooks, Signal, SignalSender};
use multi_server::{AppError, ComponentError, Scope};
use tokio::task::JoinHandle;
use tokio::time::Instant;

mod common;

use common::{components, MockComponent, StartBehavior, StopBehavior};

/// Build an app over `mocks` that listens to an injected signal channel.
fn app_with_signals(mocks: &[Arc<MockComponent>]) -> (App, SignalSender) {
    let (sender, signals) = ChannelSignals::new();
    let app = App::new(components(mocks)).with_signal_source(signals);
    (app, sender)
}

fn spawn_run(app: App) -> JoinHandle<Result<(), AppError>> {
    tokio::spawn(app.run())
}

async fn finish(handle: JoinHandle<Result<(), AppError>>) -> Result<(), AppError> {
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("run did not return in time")
        .expect("run task panicked")
}

#[tokio::test]
async fn test_run_without_components() {
    let (app, _sender) = app_with_signals(&[]);
    let handle = app.shutdown_handle();
    let run = spawn_run(app);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!run.is_finished());

    handle.trigger();
    assert!(finish(run).await.is_ok());
}

#[tokio::test]
async fn test_run_blocks_until_stopped() {
    let mocks: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| Arc::new(MockComponent::new(id)))
        .collect();
    let (app, _sender) = app_with_signals(&mocks);
    let handle = app.shutdown_handle();
    let run = spawn_run(app);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!run.is_finished());
    for mock in &mocks {
        assert_eq!(mock.starts(), 1);
        assert_eq!(mock.stops(), 0);
    }

    handle.trigger();
    // Starts ended with a cancellation error, which is not a failure.
    assert!(finish(run).await.is_ok());
    for mock in &mocks {
        assert_eq!(mock.starts(), 1);
        assert_eq!(mock.stops(), 1);
        assert!(mock.stop_finished.load(Ordering::SeqCst));
        assert!(mock.stop_had_deadline.load(Ordering::SeqCst));
    }
}

#[tokio::test]
async fn test_signal_triggers_shutdown() {
    let mocks = vec![Arc::new(MockComponent::new("http")), Arc::new(MockComponent::new("rpc"))];
    let (app, sender) = app_with_signals(&mocks);
    let run = spawn_run(app);

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(sender.send(Signal::Terminate));

    assert!(finish(run).await.is_ok());
    assert!(mocks.iter().all(|m| m.stops() == 1));
}

#[tokio::test]
async fn test_closed_signal_source_does_not_stop() {
    let mocks = vec![Arc::new(MockComponent::new("worker"))];
    let (app, sender) = app_with_signals(&mocks);
    let handle = app.shutdown_handle();
    drop(sender);
    let run = spawn_run(app);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!run.is_finished());
    assert_eq!(mocks[0].stops(), 0);

    handle.trigger();
    assert!(finish(run).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeated_stop_is_idempotent() {
    let mocks: Vec<_> = (0..4)
        .map(|i| Arc::new(MockComponent::new(&format!("c{}", i))))
        .collect();
    let (app, sender) = app_with_signals(&mocks);
    let handle = app.shutdown_handle();

    app.stop().unwrap();
    let run = spawn_run(app);

    let triggers: Vec<_> = (0..8)
        .map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.trigger() })
        })
        .collect();
    for trigger in triggers {
        trigger.await.unwrap();
    }
    sender.send(Signal::Interrupt);

    assert!(finish(run).await.is_ok());
    handle.trigger();
    for mock in &mocks {
        assert_eq!(mock.stops(), 1);
    }
}

#[tokio::test]
async fn test_start_failure_stops_siblings() {
    let a = Arc::new(MockComponent::new("a"));
    let b = Arc::new(MockComponent::failing("b", "B failed"));
    let c = Arc::new(MockComponent::new("c"));
    let (app, _sender) = app_with_signals(&[a.clone(), b.clone(), c.clone()]);

    let err = finish(spawn_run(app)).await.unwrap_err();
    assert_eq!(err.component(), Some("b"));
    assert!(err.to_string().contains("B failed"));
    assert!(matches!(err, AppError::Start { .. }));

    assert_eq!(a.stops(), 1);
    assert_eq!(c.stops(), 1);
    assert_eq!(b.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_waits_for_every_stop() {
    let slow = Arc::new(MockComponent::new("slow").on_stop(StopBehavior::Sleep(Duration::from_secs(5))));
    let bad = Arc::new(MockComponent::failing("bad", "boom"));
    let (app, _sender) = app_with_signals(&[slow.clone(), bad]);

    let started = Instant::now();
    let err = app.run().await.unwrap_err();

    assert_eq!(err.component(), Some("bad"));
    assert!(slow.stop_finished.load(Ordering::SeqCst));
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test]
async fn test_stop_error_is_reported() {
    let a = Arc::new(MockComponent::new("a"));
    let b = Arc::new(MockComponent::new("b").on_stop(StopBehavior::Fail("flush failed".into())));
    let (app, _sender) = app_with_signals(&[a.clone(), b]);
    app.stop().unwrap();

    match app.run().await {
        Err(AppError::Stop { id, source }) => {
            assert_eq!(id, "b");
            assert_eq!(source.to_string(), "flush failed");
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(a.stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stuck_stop_hits_grace_period() {
    let stuck = Arc::new(MockComponent::new("stuck").on_stop(StopBehavior::Sleep(Duration::from_secs(120))));
    let quick = Arc::new(MockComponent::new("quick"));
    let (app, _sender) = app_with_signals(&[stuck.clone(), quick.clone()]);
    let handle = app.shutdown_handle();

    let run = tokio::spawn(app.run());
    tokio::time::sleep(Duration::from_millis(10)).await;
    let triggered = Instant::now();
    handle.trigger();

    let err = run.await.unwrap().unwrap_err();
    assert!(err.is_deadline_exceeded());
    assert!(matches!(err, AppError::StopTimeout { ref id, .. } if id == "stuck"));

    let elapsed = triggered.elapsed();
    assert!(elapsed >= Duration::from_secs(60));
    assert!(elapsed < Duration::from_secs(120));
    assert!(!stuck.stop_finished.load(Ordering::SeqCst));
    assert!(quick.stop_finished.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_stop_reports_its_own_deadline() {
    let slow = Arc::new(
        MockComponent::new("slow").on_stop(StopBehavior::SleepWithDeadline(Duration::from_secs(90))),
    );
    let (app, _sender) = app_with_signals(&[slow.clone()]);
    let app = app.with_stop_timeout(Duration::from_secs(10));
    app.stop().unwrap();

    let err = app.run().await.unwrap_err();
    assert!(err.is_deadline_exceeded());
    assert_eq!(err.component(), Some("slow"));
}

#[tokio::test(start_paused = true)]
async fn test_stops_run_concurrently() {
    let mocks: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| Arc::new(MockComponent::new(id).on_stop(StopBehavior::Sleep(Duration::from_secs(10)))))
        .collect();
    let (app, _sender) = app_with_signals(&mocks);
    app.stop().unwrap();

    let started = Instant::now();
    app.run().await.unwrap();

    // Sequential stops would take 30s.
    assert!(started.elapsed() < Duration::from_secs(20));
    assert!(mocks.iter().all(|m| m.stop_finished.load(Ordering::SeqCst)));
}

#[tokio::test]
async fn test_components_see_app_info() {
    let mock = Arc::new(MockComponent::new("a"));
    let (app, _sender) = app_with_signals(&[mock.clone()]);
    let app = app.with_id("node-1").with_name("edge");
    app.stop().unwrap();

    app.run().await.unwrap();
    assert_eq!(mock.seen_app_id.lock().unwrap().as_deref(), Some("node-1"));
}

#[tokio::test]
async fn test_panicking_component_fails_run() {
    let a = Arc::new(MockComponent::new("a"));
    let boom = Arc::new(MockComponent::new("boom").on_start(StartBehavior::Panic));
    let (app, _sender) = app_with_signals(&[a.clone(), boom]);

    match finish(spawn_run(app)).await {
        Err(AppError::Panicked { task }) => assert_eq!(task, "boom/start"),
        other => panic!("unexpected result: {:?}", other),
    }
    assert_eq!(a.stops(), 1);
}

fn record(
    events: &Arc<Mutex<Vec<String>>>,
    label: &'static str,
) -> impl Fn(Scope) -> Ready<Result<(), ComponentError>> + Send + Sync + 'static {
    let events = Arc::clone(events);
    move |_| {
        events.lock().unwrap().push(label.to_string());
        std::future::ready(Ok(()))
    }
}

// Current-thread runtime: a start-runner is polled into `start` right after
// it arrives at the latch, so after-start hooks see every start call.
#[tokio::test(flavor = "current_thread")]
async fn test_hooks_follow_protocol_phases() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mocks: Vec<_> = ["a", "b"]
        .iter()
        .map(|id| Arc::new(MockComponent::new(id).with_events(Arc::clone(&events))))
        .collect();

    let hooks = Hooks::new()
        .before_start(record(&events, "before-start"))
        .after_start(record(&events, "after-start"))
        .after_stop(record(&events, "after-stop"));

    let (app, _sender) = app_with_signals(&mocks);
    let app = app.with_hooks(hooks);
    let handle = app.shutdown_handle();
    let run = spawn_run(app);

    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.trigger();
    finish(run).await.unwrap();

    let events = events.lock().unwrap().clone();
    let position = |label: &str| events.iter().position(|e| e == label).unwrap();

    assert_eq!(events.first().map(String::as_str), Some("before-start"));
    assert_eq!(events.last().map(String::as_str), Some("after-stop"));
    assert!(position("a:start") < position("after-start"));
    assert!(position("b:start") < position("after-start"));
    assert!(position("after-start") < position("a:stop"));
}

#[tokio::test]
async fn test_before_start_failure_skips_components() {
    let mock = Arc::new(MockComponent::new("a"));
    let hooks = Hooks::new().before_start(|_| async { Err(ComponentError::failed("not ready")) });
    let (app, _sender) = app_with_signals(&[mock.clone()]);

    let err = app.with_hooks(hooks).run().await.unwrap_err();
    assert!(matches!(err, AppError::Hook { phase: HookPhase::BeforeStart, .. }));
    assert_eq!(mock.starts(), 0);
    assert_eq!(mock.stops(), 0);
}

#[tokio::test]
async fn test_after_start_failure_shuts_down() {
    let mock = Arc::new(MockComponent::new("a"));
    let after_stop_ran = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&after_stop_ran);
    let hooks = Hooks::new()
        .after_start(|_| async { Err(ComponentError::failed("registration refused")) })
        .after_stop(move |_| {
            let flag = Arc::clone(&flag);
            async move {
                *flag.lock().unwrap() = true;
                Ok(())
            }
        });
    let (app, _sender) = app_with_signals(&[mock.clone()]);

    let err = finish(spawn_run(app.with_hooks(hooks))).await.unwrap_err();
    assert!(matches!(err, AppError::Hook { phase: HookPhase::AfterStart, .. }));
    assert_eq!(mock.stops(), 1);
    assert!(*after_stop_ran.lock().unwrap());
}
