//! HTTP and `WebSocket` surface of the Havn occupancy service.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **Occupancy endpoints** for check-in and check-out, gated by the
//!   caller identity forwarded by the upstream auth layer
//! - **Spot endpoints** for reading a spot's status and posting
//!   crowd-sourced availability reports
//! - **`WebSocket` endpoint** (`/ws`) streaming `spot_update` envelopes from
//!   the broadcast hub
//!
//! It also owns the service configuration ([`config::HavnConfig`]) since
//! every section of it is consumed while wiring this surface.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

pub use config::{ConfigError, HavnConfig, LogFormat};
pub use error::{ApiError, ApiResult};
pub use router::build_router;
pub use server::{ServerError, start_server};
pub use state::AppState;
