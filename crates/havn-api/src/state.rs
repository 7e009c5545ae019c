//! Shared application state for the Havn API.

use std::time::Duration;

use havn_hub::HubHandle;
use havn_occupancy::OccupancyLedger;

/// Default interval between server-initiated `WebSocket` pings.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// State handed to every handler behind an `Arc`.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The occupancy ledger.
    pub ledger: OccupancyLedger,
    /// Handle to the broadcast hub.
    pub hub: HubHandle,
    /// Interval between pings sent to each observer session.
    pub heartbeat_interval: Duration,
}

impl AppState {
    /// Create state with the default heartbeat interval.
    pub const fn new(ledger: OccupancyLedger, hub: HubHandle) -> Self {
        Self {
            ledger,
            hub,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Override the observer heartbeat interval.
    #[must_use]
    pub const fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }
}
