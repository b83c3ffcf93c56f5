//! # beacon-gateway
//!
//! Resilient RPC to game-server beacons over one persistent, authenticated
//! WebSocket per endpoint.
//!
//! A [`BeaconPool`] maps each endpoint id to its single [`BeaconChannel`];
//! channels connect lazily, multiplex every concurrent call over their one
//! connection, heartbeat, and reconnect with jittered exponential backoff
//! without involving callers. Each call gets back a typed response or one
//! classified [`BeaconError`] within its deadline.
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use beacon_gateway::{BeaconPool, EndpointConfig};
//! use beacon_proto::{LogQuery, ServerId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = BeaconPool::new();
//!
//! let config = EndpointConfig::new(
//!     ServerId::new("srv-7")?,
//!     "ws://game-7.example.net:7777",
//!     "shared-secret",
//! )
//! .with_default_timeout(Duration::from_secs(5));
//!
//! let channel = pool.get_or_create(config);
//! let status = channel.status().await?;
//! let logs = channel.logs(LogQuery::page(0, 50)).await?;
//!
//! // Administrative disable/delete:
//! let id = channel.server_id().clone();
//! pool.remove(&id).await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod channel;
mod config;
mod correlator;
mod error;
mod pool;
mod reconnect;
mod state;

pub use channel::{BeaconChannel, ChannelStats};
pub use config::{EndpointConfig, HeartbeatConfig};
pub use error::{BeaconError, ErrorKind};
pub use pool::BeaconPool;
pub use reconnect::ReconnectConfig;
pub use state::{AtomicConnectionState, ConnectionState};
