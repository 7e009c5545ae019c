//! Havn occupancy service entry point.
//!
//! Wires the occupancy ledger, the broadcast hub, the optional Redis relay
//! and the HTTP surface together, then serves until SIGINT or SIGTERM.
//!
//! # Start-up
//!
//! ```text
//! config --> logging --> store (PostgreSQL | memory) --> relay (Redis | none)
//!        --> hub --> relay loop --> HTTP server
//! ```
//!
//! Shutdown runs in reverse: the server drains, the relay loop is
//! cancelled, the hub closes every observer channel, connections close.

mod logging;
mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use havn_api::config::HavnConfig;
use havn_api::state::AppState;
use havn_db::{PgOccupancyStore, PostgresConfig, PostgresPool};
use havn_hub::{RedisRelay, RedisRelayConfig, RelayMode, SpotRelay, run_relay, spawn_hub};
use havn_occupancy::{MemoryStore, OccupancyLedger, OccupancyStore};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Delay before the relay loop re-subscribes after an error.
const RELAY_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration is invalid, `PostgreSQL` is configured
/// but unreachable, or the HTTP listener cannot bind.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = HavnConfig::load().context("failed to load configuration")?;
    logging::init(&config.logging);

    info!(
        host = config.server.host,
        port = config.server.port,
        postgres = !config.infrastructure.postgres_url.is_empty(),
        relay = config.infrastructure.relay_url.is_some(),
        "havn-server starting"
    );

    // Store
    let (store, pool): (Arc<dyn OccupancyStore>, Option<PostgresPool>) =
        if config.infrastructure.postgres_url.is_empty() {
            warn!("No postgres_url configured, using the in-memory store");
            (Arc::new(MemoryStore::new()), None)
        } else {
            let pg_config = PostgresConfig::new(&config.infrastructure.postgres_url)
                .with_max_connections(config.infrastructure.max_connections);
            let pool = PostgresPool::connect(&pg_config)
                .await
                .context("failed to connect to PostgreSQL")?;
            pool.run_migrations()
                .await
                .context("failed to run migrations")?;
            (Arc::new(PgOccupancyStore::new(pool.pool().clone())), Some(pool))
        };

    // Relay
    let relay = connect_relay(&config).await;
    let mode = relay.clone().map_or(RelayMode::SingleInstance, |relay| {
        RelayMode::Relayed(relay as Arc<dyn SpotRelay>)
    });

    // Hub and relay loop
    let hub = spawn_hub(config.hub.hub_config(), mode);
    let cancel = CancellationToken::new();
    let relay_task = relay.clone().map(|relay| {
        tokio::spawn(run_relay(
            relay as Arc<dyn SpotRelay>,
            hub.clone(),
            cancel.child_token(),
            RELAY_RETRY_DELAY,
        ))
    });

    // HTTP
    let ledger = OccupancyLedger::new(store, config.occupancy.ledger_config());
    let state = Arc::new(
        AppState::new(ledger, hub.clone()).with_heartbeat_interval(config.hub.heartbeat_interval()),
    );
    let served = havn_api::start_server(&config.server, state, shutdown::signal()).await;

    // Teardown
    cancel.cancel();
    if let Some(task) = relay_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Relay loop task failed");
        }
    }
    if let Err(e) = hub.shutdown().await {
        warn!(error = %e, "Hub already stopped");
    }
    if let Some(relay) = relay {
        relay.close().await;
    }
    if let Some(pool) = pool {
        pool.close().await;
    }

    served.context("HTTP server failed")?;
    info!("havn-server stopped");
    Ok(())
}

/// Connect the Redis relay if one is configured. A relay that cannot be
/// reached degrades the instance to single-instance mode.
async fn connect_relay(config: &HavnConfig) -> Option<Arc<RedisRelay>> {
    let url = config.infrastructure.relay_url.as_deref()?;
    let relay_config = RedisRelayConfig::new(url).with_topic(&config.hub.relay_topic);
    match RedisRelay::connect(&relay_config).await {
        Ok(relay) => {
            info!(topic = relay.topic(), "Relay connected");
            Some(Arc::new(relay))
        }
        Err(e) => {
            warn!(error = %e, "Relay unavailable, running single-instance");
            None
        }
    }
}
