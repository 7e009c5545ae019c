//! Hub actor commands, errors and observer identities.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::relay::RelayError;

/// Identity of one registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(Uuid);

impl ObserverId {
    /// Allocate a fresh identity.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a new observer gets back from the hub.
///
/// `receiver` yields every broadcast payload until the observer is
/// unregistered, dropped as too slow, or the hub shuts down.
#[derive(Debug)]
pub struct ObserverRegistration {
    /// The observer's identity, needed to unregister.
    pub id: ObserverId,
    /// Outbound payloads for this observer.
    pub receiver: mpsc::Receiver<Arc<str>>,
}

/// Commands processed by the hub actor, strictly in arrival order.
#[derive(Debug)]
pub enum HubCommand {
    /// Add a new observer with a fresh bounded channel.
    Register {
        /// Channel to send the registration back on.
        respond_to: oneshot::Sender<ObserverRegistration>,
    },

    /// Remove an observer and close its channel. No-op if absent.
    Unregister {
        /// Observer to remove.
        id: ObserverId,
    },

    /// Deliver `payload` to every registered observer without blocking.
    Broadcast {
        /// Serialized envelope, shared across observers.
        payload: Arc<str>,
    },

    /// Report how many observers are registered.
    ObserverCount {
        /// Channel to send the count back on.
        respond_to: oneshot::Sender<usize>,
    },

    /// Close every observer channel and stop the actor.
    Shutdown {
        /// Signalled once the registry has been cleared.
        respond_to: oneshot::Sender<()>,
    },
}

/// Errors returned by [`HubHandle`](crate::HubHandle).
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub actor is gone.
    #[error("hub actor channel closed")]
    ChannelClosed,

    /// The envelope could not be serialized.
    #[error("failed to serialize broadcast envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Publishing to the relay channel failed.
    #[error(transparent)]
    Relay(#[from] RelayError),
}
