//! Client interface for the hub actor.
//!
//! Channel failures are mapped to [`HubError::ChannelClosed`].

use std::sync::Arc;

use havn_types::BroadcastEnvelope;
use tokio::sync::{mpsc, oneshot};

use crate::commands::{HubCommand, HubError, ObserverId, ObserverRegistration};
use crate::relay::RelayMode;

/// Cheap-to-clone handle to the hub actor.
#[derive(Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    mode: RelayMode,
}

impl core::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HubHandle")
            .field("relayed", &self.mode.is_relayed())
            .finish_non_exhaustive()
    }
}

impl HubHandle {
    /// Wrap a command sender.
    pub const fn new(sender: mpsc::Sender<HubCommand>, mode: RelayMode) -> Self {
        Self { sender, mode }
    }

    /// Register a new observer.
    pub async fn register(&self) -> Result<ObserverRegistration, HubError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Register { respond_to: tx }).await?;
        rx.await.map_err(|_closed| HubError::ChannelClosed)
    }

    /// Remove an observer. Idempotent.
    pub async fn unregister(&self, id: ObserverId) -> Result<(), HubError> {
        self.send(HubCommand::Unregister { id }).await
    }

    /// Deliver `payload` to this instance's observers.
    ///
    /// Returns once the command is queued. Per-observer delivery failures are
    /// handled by the actor and never reported here.
    pub async fn broadcast(&self, payload: impl Into<Arc<str>>) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast {
            payload: payload.into(),
        })
        .await
    }

    /// Publish an envelope to every observer of every instance.
    ///
    /// Single-instance mode broadcasts locally. Relayed mode publishes to the
    /// relay channel only; the relay loop brings it back to this instance.
    pub async fn publish(&self, envelope: &BroadcastEnvelope) -> Result<(), HubError> {
        let payload: Arc<str> = envelope.to_json()?.into();
        match &self.mode {
            RelayMode::SingleInstance => self.broadcast(payload).await,
            RelayMode::Relayed(relay) => Ok(relay.publish(&payload).await?),
        }
    }

    /// Number of registered observers, as seen after every earlier command.
    pub async fn observer_count(&self) -> Result<usize, HubError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::ObserverCount { respond_to: tx }).await?;
        rx.await.map_err(|_closed| HubError::ChannelClosed)
    }

    /// Close every observer channel and stop the actor.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        let (tx, rx) = oneshot::channel();
        self.send(HubCommand::Shutdown { respond_to: tx }).await?;
        rx.await.map_err(|_closed| HubError::ChannelClosed)
    }

    /// Whether events go through the relay channel.
    pub const fn is_relayed(&self) -> bool {
        self.mode.is_relayed()
    }

    async fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.sender
            .send(command)
            .await
            .map_err(|_closed| HubError::ChannelClosed)
    }
}
