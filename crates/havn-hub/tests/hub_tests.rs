//! Behavioural tests for the broadcast hub and the relay loop.
//!
//! The relay tests use an in-process fake built on a tokio broadcast
//! channel, so no Redis is needed.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::StreamExt;
use havn_hub::{
    HubConfig, RelayError, RelayMode, RelayStream, SpotRelay, run_relay, spawn_hub,
};
use havn_types::{BroadcastEnvelope, Spot, SpotChange, SpotId, SpotUpdate};
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WAIT: Duration = Duration::from_secs(1);

fn tight_hub(mode: RelayMode) -> havn_hub::HubHandle {
    spawn_hub(
        HubConfig {
            command_buffer: 16,
            observer_buffer: 1,
        },
        mode,
    )
}

fn envelope() -> BroadcastEnvelope {
    let spot = Spot {
        id: SpotId::new(),
        name: String::from("Atrium"),
        latitude: 0.0,
        longitude: 0.0,
        total_capacity: 20,
        current_occupancy: 5,
        current_available: None,
        last_update_at: None,
        updated_at: Utc::now(),
    };
    BroadcastEnvelope::SpotUpdate(SpotUpdate::from_spot(&spot, SpotChange::CheckIn))
}

#[tokio::test]
async fn slow_observer_is_dropped_and_others_keep_receiving() {
    let hub = tight_hub(RelayMode::SingleInstance);
    let mut fast_a = hub.register().await.unwrap();
    let mut fast_b = hub.register().await.unwrap();
    let mut slow = hub.register().await.unwrap();
    assert_eq!(hub.observer_count().await.unwrap(), 3);

    hub.broadcast("first").await.unwrap();
    assert_eq!(&*fast_a.receiver.recv().await.unwrap(), "first");
    assert_eq!(&*fast_b.receiver.recv().await.unwrap(), "first");
    // `slow` does not drain: its single-slot buffer stays full.

    hub.broadcast("second").await.unwrap();
    assert_eq!(hub.observer_count().await.unwrap(), 2);
    assert_eq!(&*fast_a.receiver.recv().await.unwrap(), "second");
    assert_eq!(&*fast_b.receiver.recv().await.unwrap(), "second");

    // The slow observer still holds the first payload, then sees end-of-stream.
    assert_eq!(&*slow.receiver.recv().await.unwrap(), "first");
    assert!(slow.receiver.recv().await.is_none());

    hub.broadcast("third").await.unwrap();
    assert_eq!(&*fast_a.receiver.recv().await.unwrap(), "third");
    assert_eq!(&*fast_b.receiver.recv().await.unwrap(), "third");
    assert_eq!(hub.observer_count().await.unwrap(), 2);
}

#[tokio::test]
async fn unregister_closes_channel_and_is_idempotent() {
    let hub = tight_hub(RelayMode::SingleInstance);
    let mut observer = hub.register().await.unwrap();

    hub.unregister(observer.id).await.unwrap();
    hub.unregister(observer.id).await.unwrap();
    assert_eq!(hub.observer_count().await.unwrap(), 0);
    assert!(observer.receiver.recv().await.is_none());
}

#[tokio::test]
async fn disconnected_observer_is_removed_on_next_broadcast() {
    let hub = tight_hub(RelayMode::SingleInstance);
    let gone = hub.register().await.unwrap();
    let mut alive = hub.register().await.unwrap();
    drop(gone);

    hub.broadcast("ping").await.unwrap();
    assert_eq!(hub.observer_count().await.unwrap(), 1);
    assert_eq!(&*alive.receiver.recv().await.unwrap(), "ping");
}

#[tokio::test]
async fn broadcasts_arrive_in_queue_order() {
    let hub = spawn_hub(HubConfig::default(), RelayMode::SingleInstance);
    let mut observer = hub.register().await.unwrap();

    for n in 0..20 {
        hub.broadcast(format!("event-{n}")).await.unwrap();
    }
    for n in 0..20 {
        let got = observer.receiver.recv().await.unwrap();
        assert_eq!(&*got, format!("event-{n}"));
    }
}

#[tokio::test]
async fn single_instance_publish_broadcasts_locally() {
    let hub = spawn_hub(HubConfig::default(), RelayMode::SingleInstance);
    assert!(!hub.is_relayed());
    let mut observer = hub.register().await.unwrap();

    let sent = envelope();
    hub.publish(&sent).await.unwrap();

    let payload = observer.receiver.recv().await.unwrap();
    let received: BroadcastEnvelope = serde_json::from_str(&payload).unwrap();
    assert_eq!(received, sent);
    assert!(payload.starts_with(r#"{"type":"spot_update""#));
}

#[tokio::test]
async fn shutdown_closes_every_observer() {
    let hub = spawn_hub(HubConfig::default(), RelayMode::SingleInstance);
    let mut a = hub.register().await.unwrap();
    let mut b = hub.register().await.unwrap();

    hub.shutdown().await.unwrap();
    assert!(a.receiver.recv().await.is_none());
    assert!(b.receiver.recv().await.is_none());
    assert!(hub.register().await.is_err());
}

// =============================================================================
// Relay
// =============================================================================

/// In-process relay: every publish is visible to every subscription.
struct LoopbackRelay {
    topic: broadcast::Sender<String>,
    failing_subscribes: AtomicUsize,
}

impl LoopbackRelay {
    fn new(failing_subscribes: usize) -> Arc<Self> {
        let (topic, _) = broadcast::channel(16);
        Arc::new(Self {
            topic,
            failing_subscribes: AtomicUsize::new(failing_subscribes),
        })
    }
}

#[async_trait]
impl SpotRelay for LoopbackRelay {
    async fn publish(&self, payload: &str) -> Result<(), RelayError> {
        self.topic
            .send(payload.to_owned())
            .map(|_| ())
            .map_err(|e| RelayError::Backend(e.to_string()))
    }

    async fn subscribe(&self) -> Result<RelayStream, RelayError> {
        let remaining = self.failing_subscribes.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_subscribes.store(remaining - 1, Ordering::SeqCst);
            return Err(RelayError::Backend(String::from("connection refused")));
        }
        let rx = self.topic.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.ok().map(|payload| (Ok(payload), rx))
        });
        Ok(stream.boxed())
    }
}

async fn wait_for_subscriber(relay: &LoopbackRelay) {
    timeout(WAIT, async {
        while relay.topic.receiver_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("relay loop never subscribed");
}

#[tokio::test]
async fn relayed_publish_reaches_observers_through_the_relay_loop() {
    let relay = LoopbackRelay::new(0);
    let hub = spawn_hub(HubConfig::default(), RelayMode::Relayed(relay.clone()));
    assert!(hub.is_relayed());
    let mut observer = hub.register().await.unwrap();

    let cancel = CancellationToken::new();
    let relay_task = tokio::spawn(run_relay(
        relay.clone(),
        hub.clone(),
        cancel.clone(),
        Duration::from_millis(10),
    ));
    wait_for_subscriber(&relay).await;

    // Another instance publishing to the shared topic.
    relay.publish("from-elsewhere").await.unwrap();
    let got = timeout(WAIT, observer.receiver.recv()).await.unwrap().unwrap();
    assert_eq!(&*got, "from-elsewhere");

    // This instance publishing through the hub.
    let sent = envelope();
    hub.publish(&sent).await.unwrap();
    let got = timeout(WAIT, observer.receiver.recv()).await.unwrap().unwrap();
    let received: BroadcastEnvelope = serde_json::from_str(&got).unwrap();
    assert_eq!(received, sent);

    cancel.cancel();
    timeout(WAIT, relay_task).await.unwrap().unwrap();
}

#[tokio::test]
async fn relay_loop_retries_failed_subscriptions() {
    let relay = LoopbackRelay::new(3);
    let hub = spawn_hub(HubConfig::default(), RelayMode::Relayed(relay.clone()));
    let mut observer = hub.register().await.unwrap();

    let cancel = CancellationToken::new();
    let relay_task = tokio::spawn(run_relay(
        relay.clone(),
        hub.clone(),
        cancel.clone(),
        Duration::from_millis(5),
    ));
    wait_for_subscriber(&relay).await;

    relay.publish("after-recovery").await.unwrap();
    let got = timeout(WAIT, observer.receiver.recv()).await.unwrap().unwrap();
    assert_eq!(&*got, "after-recovery");

    cancel.cancel();
    timeout(WAIT, relay_task).await.unwrap().unwrap();
}

#[tokio::test]
async fn relay_loop_stops_on_cancel_while_waiting() {
    let relay = LoopbackRelay::new(usize::MAX);
    let hub = spawn_hub(HubConfig::default(), RelayMode::Relayed(relay.clone()));

    let cancel = CancellationToken::new();
    let relay_task = tokio::spawn(run_relay(
        relay,
        hub,
        cancel.clone(),
        Duration::from_secs(60),
    ));
    cancel.cancel();
    timeout(WAIT, relay_task).await.unwrap().unwrap();
}
