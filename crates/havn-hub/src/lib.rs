//! Broadcast hub for real-time spot updates.
//!
//! The hub is a single actor task that owns the registry of connected
//! observers. Every interaction goes through its command queue, so
//! registrations, removals and broadcasts are applied in one total order
//! without locks.
//!
//! # Architecture
//!
//! ```text
//!  ledger handlers ──publish──▶ HubHandle ──┬─ SingleInstance ─▶ Broadcast ─┐
//!                                           └─ Relayed ─▶ SpotRelay (Redis) │
//!                                                            │              │
//!                          relay loop ◀── SUBSCRIBE spot_updates            │
//!                              └──────────── Broadcast ──────────────────────┤
//!                                                                           ▼
//!                                                    HubActor ──try_send──▶ observers
//! ```
//!
//! # Backpressure
//!
//! Each observer gets a bounded channel. A broadcast never waits on an
//! observer: if its channel is full or closed, the observer is removed and
//! its channel dropped, which the observer session sees as end-of-stream.

mod actor;
mod commands;
mod handle;
pub mod redis;
pub mod relay;

use tokio::sync::mpsc;
use tracing::debug;

pub use actor::HubActor;
pub use commands::{HubCommand, HubError, ObserverId, ObserverRegistration};
pub use handle::HubHandle;
pub use redis::{RedisRelay, RedisRelayConfig};
pub use relay::{RelayError, RelayMode, RelayStream, SpotRelay, run_relay};

/// Default capacity of the hub's command queue.
pub const DEFAULT_COMMAND_BUFFER: usize = 1024;

/// Default capacity of each observer's outbound channel.
pub const DEFAULT_OBSERVER_BUFFER: usize = 64;

/// Channel sizing for the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of the command queue shared by all callers.
    pub command_buffer: usize,
    /// Capacity of each observer's outbound channel. An observer that falls
    /// this many messages behind is dropped.
    pub observer_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_buffer: DEFAULT_COMMAND_BUFFER,
            observer_buffer: DEFAULT_OBSERVER_BUFFER,
        }
    }
}

/// Spawn the hub actor and return a handle to it.
///
/// `mode` decides where [`HubHandle::publish`] sends events. In
/// [`RelayMode::Relayed`] mode the caller is expected to also spawn
/// [`run_relay`] so relayed events reach this instance's observers.
pub fn spawn_hub(config: HubConfig, mode: RelayMode) -> HubHandle {
    let (sender, receiver) = mpsc::channel(config.command_buffer.max(1));
    let actor = HubActor::new(receiver, config.observer_buffer.max(1));
    tokio::spawn(actor.run());
    debug!(?config, relayed = mode.is_relayed(), "Hub actor spawned");
    HubHandle::new(sender, mode)
}
