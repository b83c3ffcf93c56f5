//! Process-wide registry of beacon channels.

use std::collections::HashMap;
use std::sync::Arc;

use beacon_proto::ServerId;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::channel::BeaconChannel;
use crate::config::EndpointConfig;

/// Registry mapping each endpoint to its single live channel.
///
/// Core invariant: at most one live channel per `ServerId`. Channels are
/// created lazily on first reference and torn down by [`remove`](Self::remove)
/// when an endpoint is disabled or deleted administratively. Nothing hands
/// out the underlying transport, so callers cannot fabricate a second
/// connection to the same endpoint.
#[derive(Default)]
pub struct BeaconPool {
    channels: RwLock<HashMap<ServerId, Arc<BeaconChannel>>>,
}

impl BeaconPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Return the channel for `config.server_id`, creating it if absent.
    ///
    /// Creation happens under one write lock, so concurrent first uses of
    /// the same endpoint still yield a single channel. A channel that has
    /// reached a terminal state (closed or failed) is replaced by a fresh
    /// one.
    pub fn get_or_create(&self, config: EndpointConfig) -> Arc<BeaconChannel> {
        let mut channels = self.channels.write();
        if let Some(channel) = channels.get(&config.server_id) {
            if !channel.is_terminal() {
                return Arc::clone(channel);
            }
            debug!(server = %config.server_id, "replacing terminal channel");
        }

        let server_id = config.server_id.clone();
        let channel = Arc::new(BeaconChannel::new(config));
        channels.insert(server_id, Arc::clone(&channel));
        channel
    }

    /// Non-creating lookup.
    #[must_use]
    pub fn get_existing(&self, server_id: &ServerId) -> Option<Arc<BeaconChannel>> {
        self.channels.read().get(server_id).map(Arc::clone)
    }

    /// Tear down and forget the channel for `server_id`, if any.
    ///
    /// Idempotent. The registry entry is removed before teardown runs, so a
    /// racing `get_or_create` builds a fresh channel rather than resurrecting
    /// one that is mid-teardown; every call pending on the old channel fails
    /// with `Closed`. Returns once teardown is complete.
    pub async fn remove(&self, server_id: &ServerId) {
        let channel = self.channels.write().remove(server_id);
        if let Some(channel) = channel {
            info!(server = %server_id, "removing beacon channel");
            channel.close().await;
        }
    }

    /// Tear down every channel, e.g. on process shutdown.
    pub async fn close_all(&self) {
        let channels: Vec<Arc<BeaconChannel>> = {
            let mut map = self.channels.write();
            map.drain().map(|(_, channel)| channel).collect()
        };
        for channel in channels {
            channel.close().await;
        }
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Check whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// The server ids with a registered channel.
    #[must_use]
    pub fn server_ids(&self) -> Vec<ServerId> {
        self.channels.read().keys().cloned().collect()
    }
}
