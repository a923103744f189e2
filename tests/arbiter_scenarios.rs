// tests/arbiter_scenarios.rs
//! End-to-end failover scenarios through the arbiter actor on a paused clock

use location_lib::{
    provider::{Scenario, ScriptedEvent, ScriptedProvider},
    Arbiter, ArbiterConfig, ArbiterHandle, ArbiterState, ArbiterUpdate, GeoPoint, PositionProvider,
    ProviderSink, Result, Source,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Wraps a provider and counts how often it is started.
struct Counting<P> {
    inner: P,
    starts: Arc<AtomicUsize>,
}

impl<P: PositionProvider> PositionProvider for Counting<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn start(&mut self, sink: ProviderSink) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.inner.start(sink)
    }

    fn stop(&mut self) {
        self.inner.stop();
    }
}

/// Hands its sink to the test, and keeps it after `stop` so late events can be sent.
#[derive(Clone, Default)]
struct ManualProvider {
    sink: Arc<Mutex<Option<ProviderSink>>>,
    starts: Arc<AtomicUsize>,
}

impl ManualProvider {
    fn sink(&self) -> ProviderSink {
        self.sink.lock().unwrap().clone().expect("provider was never started")
    }
}

impl PositionProvider for ManualProvider {
    fn name(&self) -> &str {
        "manual"
    }

    fn start(&mut self, sink: ProviderSink) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    fn stop(&mut self) {}
}

fn config(failover_delay_ms: u64) -> ArbiterConfig {
    ArbiterConfig {
        failover_delay_ms,
        ..ArbiterConfig::default()
    }
}

fn point() -> GeoPoint {
    GeoPoint::new(42.438878, -71.119277).unwrap()
}

async fn expect_fix(rx: &mut mpsc::UnboundedReceiver<ArbiterUpdate>) -> location_lib::Fix {
    match rx.recv().await {
        Some(ArbiterUpdate::FixAccepted(fix)) => fix,
        other => panic!("expected a fix, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn unauthorized_twice_disables_primary_and_uses_fallback() {
    let primary_starts = Arc::new(AtomicUsize::new(0));
    let primary = Counting {
        inner: ScriptedProvider::new(
            "primary",
            vec![
                ScriptedEvent::unauthorized(0, "invalid key"),
                ScriptedEvent::unauthorized(200, "invalid key"),
                ScriptedEvent::fix(1000, 42.0, -71.0, 5.0),
            ],
        ),
        starts: Arc::clone(&primary_starts),
    };
    // fallback starts at t=200, so its first fix lands at t=300
    let fallback = ScriptedProvider::new("fallback", vec![ScriptedEvent::fix(100, 42.438878, -71.119277, 75.0)]);

    let handle = ArbiterHandle::spawn(Arbiter::new(config(5000), primary, fallback).unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(handle.register_listener(tx).await.unwrap());
    handle.start().unwrap();

    sleep(Duration::from_millis(100)).await;
    assert_eq!(handle.state().await.unwrap(), ArbiterState::AwaitingPrimary);

    sleep(Duration::from_millis(150)).await;
    assert_eq!(handle.state().await.unwrap(), ArbiterState::FallbackActive);

    let fix = expect_fix(&mut rx).await;
    assert_eq!(fix.source, Source::Fallback);
    assert_eq!(fix.accuracy_m, 75.0);
    assert_eq!(rx.recv().await, Some(ArbiterUpdate::FirstFix(true)));

    // well past the failover delay and the primary's scripted fix
    sleep(Duration::from_secs(10)).await;
    assert_eq!(handle.state().await.unwrap(), ArbiterState::FallbackActive);
    assert_eq!(primary_starts.load(Ordering::SeqCst), 1);
    assert!(rx.try_recv().is_err());

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn fails_over_after_delay_and_recovers_on_primary_fix() {
    let primary = ScriptedProvider::new("primary", vec![ScriptedEvent::fix(6000, 42.0, -71.0, 10.0)]);
    let fallback = ScriptedProvider::new(
        "fallback",
        vec![
            ScriptedEvent::fix(100, 42.1, -71.1, 60.0),
            ScriptedEvent::fix(2000, 42.1, -71.1, 60.0),
        ],
    );

    let handle = ArbiterHandle::spawn(Arbiter::new(config(5000), primary, fallback).unwrap());
    let (tx, mut rx) = mpsc::unbounded_channel();
    handle.register_listener(tx).await.unwrap();
    handle.start().unwrap();

    sleep(Duration::from_millis(4900)).await;
    assert_eq!(handle.state().await.unwrap(), ArbiterState::AwaitingPrimary);
    assert!(rx.try_recv().is_err());

    sleep(Duration::from_millis(150)).await;
    assert_eq!(handle.state().await.unwrap(), ArbiterState::FallbackActive);

    assert_eq!(expect_fix(&mut rx).await.source, Source::Fallback);
    assert_eq!(rx.recv().await, Some(ArbiterUpdate::FirstFix(true)));

    let fix = expect_fix(&mut rx).await;
    assert_eq!(fix.source, Source::Primary);
    assert_eq!(handle.state().await.unwrap(), ArbiterState::HasPrimaryFix);

    // the fallback's second fix would have arrived at t=7000
    sleep(Duration::from_secs(5)).await;
    assert!(rx.try_recv().is_err());

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_drops_late_events_and_restart_reports_first_fix_again() {
    let primary = ManualProvider::default();
    let fallback = ScriptedProvider::new("fallback", vec![]);
    let handle = ArbiterHandle::spawn(Arbiter::new(config(5000), primary.clone(), fallback).unwrap());

    let (tx, mut rx) = mpsc::unbounded_channel();
    handle.register_listener(tx).await.unwrap();
    handle.start().unwrap();
    assert_eq!(handle.state().await.unwrap(), ArbiterState::AwaitingPrimary);

    let first_sink = primary.sink();
    first_sink.fix(point(), 12.0);
    assert_eq!(expect_fix(&mut rx).await.accuracy_m, 12.0);
    assert_eq!(rx.recv().await, Some(ArbiterUpdate::FirstFix(true)));

    handle.stop().await.unwrap();
    first_sink.fix(point(), 3.0);
    sleep(Duration::from_millis(10)).await;
    assert_eq!(handle.state().await.unwrap(), ArbiterState::Stopped);
    // the listener was dropped and nothing more was forwarded
    assert_eq!(rx.recv().await, None);

    let (tx, mut rx) = mpsc::unbounded_channel();
    assert!(handle.register_listener(tx).await.unwrap());
    handle.start().unwrap();
    assert_eq!(handle.state().await.unwrap(), ArbiterState::AwaitingPrimary);
    assert_eq!(primary.starts.load(Ordering::SeqCst), 2);

    first_sink.fix(point(), 1.0);
    primary.sink().fix(point(), 8.0);
    assert_eq!(expect_fix(&mut rx).await.accuracy_m, 8.0);
    assert_eq!(rx.recv().await, Some(ArbiterUpdate::FirstFix(true)));

    sleep(Duration::from_millis(10)).await;
    assert!(rx.try_recv().is_err());

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn start_while_running_is_ignored() {
    let primary = ManualProvider::default();
    let handle = ArbiterHandle::spawn(Arbiter::new(
        config(5000),
        primary.clone(),
        ScriptedProvider::new("fallback", vec![]),
    )
    .unwrap());

    handle.start().unwrap();
    handle.start().unwrap();
    assert_eq!(handle.state().await.unwrap(), ArbiterState::AwaitingPrimary);
    assert_eq!(primary.starts.load(Ordering::SeqCst), 1);

    handle.shutdown().await.unwrap();
}

#[test]
fn demo_scenarios_parse() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");
    for name in ["unauthorized_primary.json", "slow_primary.json"] {
        let scenario = Scenario::load(&dir.join(name)).unwrap();
        assert!(!scenario.primary.is_empty(), "{} has no primary script", name);
        assert!(!scenario.fallback.is_empty(), "{} has no fallback script", name);
    }
}
