//! Hub actor: sole owner of the observer registry.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::commands::{HubCommand, ObserverId, ObserverRegistration};

/// The hub actor.
///
/// Receives [`HubCommand`]s on one queue and processes them one at a time.
/// The observer map lives only inside this struct; nothing else can reach it.
pub struct HubActor {
    /// Command receiver.
    receiver: mpsc::Receiver<HubCommand>,
    /// Registered observers and their outbound channels.
    observers: HashMap<ObserverId, mpsc::Sender<Arc<str>>>,
    /// Capacity of each new observer channel.
    observer_buffer: usize,
}

impl HubActor {
    /// Create an actor reading from `receiver`.
    pub fn new(receiver: mpsc::Receiver<HubCommand>, observer_buffer: usize) -> Self {
        Self {
            receiver,
            observers: HashMap::new(),
            observer_buffer,
        }
    }

    /// Run until a shutdown command arrives or every handle is dropped.
    pub async fn run(mut self) {
        info!("Hub actor starting");

        while let Some(command) = self.receiver.recv().await {
            if let HubCommand::Shutdown { respond_to } = command {
                let closed = self.observers.len();
                self.observers.clear();
                info!(closed, "Hub actor shutting down");
                let _ = respond_to.send(());
                return;
            }
            self.handle_command(command);
        }

        info!(observers = self.observers.len(), "Hub actor stopped");
    }

    fn handle_command(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register { respond_to } => {
                let (sender, receiver) = mpsc::channel(self.observer_buffer);
                let id = ObserverId::new();
                self.observers.insert(id, sender);
                debug!(observer = %id, total = self.observers.len(), "Observer registered");
                // The caller may have given up waiting; its registration is
                // then removed on the next broadcast as a closed channel.
                let _ = respond_to.send(ObserverRegistration { id, receiver });
            }
            HubCommand::Unregister { id } => {
                if self.observers.remove(&id).is_some() {
                    debug!(observer = %id, total = self.observers.len(), "Observer unregistered");
                }
            }
            HubCommand::Broadcast { payload } => self.broadcast(&payload),
            HubCommand::ObserverCount { respond_to } => {
                let _ = respond_to.send(self.observers.len());
            }
            HubCommand::Shutdown { respond_to } => {
                // Handled in `run`.
                let _ = respond_to.send(());
            }
        }
    }

    fn broadcast(&mut self, payload: &Arc<str>) {
        let mut dropped = Vec::new();

        for (id, sender) in &self.observers {
            match sender.try_send(Arc::clone(payload)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(observer = %id, "Observer not draining; dropping it");
                    dropped.push(*id);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(observer = %id, "Observer channel closed; removing it");
                    dropped.push(*id);
                }
            }
        }

        for id in &dropped {
            // Dropping the sender closes the observer's stream.
            self.observers.remove(id);
        }

        debug!(
            delivered = self.observers.len(),
            dropped = dropped.len(),
            "Broadcast delivered"
        );
    }
}
