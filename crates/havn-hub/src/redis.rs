//! Redis (or `Dragonfly`) pub/sub relay.
//!
//! Uses two connections: a publisher, and a subscriber that switches into
//! pub/sub mode after `SUBSCRIBE` and can no longer issue other commands.

use async_trait::async_trait;
use fred::prelude::*;
use futures::StreamExt;
use tokio::sync::broadcast::error::RecvError;

use crate::relay::{RelayError, RelayStream, SpotRelay};

/// Default relay topic.
pub const DEFAULT_RELAY_TOPIC: &str = "spot_updates";

/// Connection settings for [`RedisRelay`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisRelayConfig {
    /// `redis://host:port[/db]`.
    pub url: String,
    /// Pub/sub channel carrying broadcast envelopes.
    pub topic: String,
}

impl RedisRelayConfig {
    /// Settings for `url` on the default topic.
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            topic: DEFAULT_RELAY_TOPIC.to_owned(),
        }
    }

    /// Use a different topic.
    #[must_use]
    pub fn with_topic(mut self, topic: &str) -> Self {
        topic.clone_into(&mut self.topic);
        self
    }
}

impl From<fred::error::Error> for RelayError {
    fn from(err: fred::error::Error) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Relay over Redis `PUBLISH` / `SUBSCRIBE`.
#[derive(Clone)]
pub struct RedisRelay {
    publisher: Client,
    subscriber: Client,
    topic: String,
}

impl RedisRelay {
    /// Connect both clients.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the URL cannot be parsed and
    /// [`RelayError::Backend`] if either connection fails.
    pub async fn connect(config: &RedisRelayConfig) -> Result<Self, RelayError> {
        let redis_config = Config::from_url(&config.url)
            .map_err(|e| RelayError::Config(format!("Invalid relay URL: {e}")))?;

        let publisher = Builder::from_config(redis_config.clone()).build()?;
        let subscriber = Builder::from_config(redis_config).build()?;
        publisher.init().await?;
        subscriber.init().await?;

        tracing::info!(topic = %config.topic, "Connected to relay channel");
        Ok(Self {
            publisher,
            subscriber,
            topic: config.topic.clone(),
        })
    }

    /// The relay topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Close both connections.
    pub async fn close(&self) {
        let _ = self.subscriber.quit().await;
        let _ = self.publisher.quit().await;
        tracing::info!("Relay connections closed");
    }
}

#[async_trait]
impl SpotRelay for RedisRelay {
    async fn publish(&self, payload: &str) -> Result<(), RelayError> {
        let _receivers: i64 = self.publisher.publish(self.topic.as_str(), payload).await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<RelayStream, RelayError> {
        // Take the receiver first so nothing published right after
        // SUBSCRIBE is missed.
        let messages = self.subscriber.message_rx();
        self.subscriber.subscribe(self.topic.as_str()).await?;

        let topic = self.topic.clone();
        let stream = futures::stream::unfold(messages, move |mut messages| {
            let topic = topic.clone();
            async move {
                loop {
                    match messages.recv().await {
                        Ok(message) if *message.channel == *topic => {
                            let payload = message.value.convert::<String>().map_err(RelayError::from);
                            return Some((payload, messages));
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            return Some((Err(RelayError::Lagged(skipped)), messages));
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }
}
