//! Cross-instance relay of broadcast payloads.
//!
//! When several backend instances serve observers, each publishes its
//! events to a shared pub/sub topic and runs [`run_relay`], which feeds
//! everything received on that topic into the local hub. Without a relay the
//! hub runs in [`RelayMode::SingleInstance`] and only reaches its own
//! observers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::handle::HubHandle;

/// Stream of payloads received from the relay topic.
pub type RelayStream = BoxStream<'static, Result<String, RelayError>>;

/// Relay channel failures.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The pub/sub backend returned an error.
    #[error("relay backend error: {0}")]
    Backend(String),

    /// The subscriber fell behind and messages were skipped.
    #[error("relay subscriber lagged, {0} messages skipped")]
    Lagged(u64),

    /// Relay configuration is invalid.
    #[error("relay configuration error: {0}")]
    Config(String),
}

/// A pub/sub channel shared by every backend instance.
#[async_trait]
pub trait SpotRelay: Send + Sync + 'static {
    /// Publish a serialized envelope to every instance.
    async fn publish(&self, payload: &str) -> Result<(), RelayError>;

    /// Subscribe to the relay topic.
    async fn subscribe(&self) -> Result<RelayStream, RelayError>;
}

/// How published events reach observers, chosen once at start-up.
#[derive(Clone)]
pub enum RelayMode {
    /// No relay: publish broadcasts to local observers only.
    SingleInstance,
    /// Publish goes to the relay; the relay loop broadcasts locally.
    Relayed(Arc<dyn SpotRelay>),
}

impl RelayMode {
    /// Whether a relay is configured.
    pub const fn is_relayed(&self) -> bool {
        matches!(self, Self::Relayed(_))
    }
}

/// Forward every payload from `relay` into `hub` until `cancel` fires.
///
/// Subscription failures and receive errors are logged and retried after
/// `retry_delay`; they never stop local delivery. The loop also ends if the
/// hub actor has gone away.
pub async fn run_relay(
    relay: Arc<dyn SpotRelay>,
    hub: HubHandle,
    cancel: CancellationToken,
    retry_delay: Duration,
) {
    info!("Relay loop starting");

    'subscribe: loop {
        let subscribed = tokio::select! {
            () = cancel.cancelled() => break 'subscribe,
            subscribed = relay.subscribe() => subscribed,
        };

        match subscribed {
            Ok(mut stream) => loop {
                let next = tokio::select! {
                    () = cancel.cancelled() => break 'subscribe,
                    next = stream.next() => next,
                };
                match next {
                    Some(Ok(payload)) => {
                        if hub.broadcast(payload).await.is_err() {
                            warn!("Hub closed; stopping relay loop");
                            break 'subscribe;
                        }
                    }
                    Some(Err(err)) => warn!(error = %err, "Relay receive error; continuing"),
                    None => {
                        warn!("Relay subscription ended; resubscribing");
                        break;
                    }
                }
            },
            Err(err) => warn!(error = %err, "Relay subscribe failed; retrying"),
        }

        tokio::select! {
            () = cancel.cancelled() => break 'subscribe,
            () = tokio::time::sleep(retry_delay) => {}
        }
    }

    info!("Relay loop stopped");
}
