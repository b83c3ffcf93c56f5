//! Connection state types.

use std::sync::atomic::{AtomicU32, Ordering};

/// State of a beacon channel's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, no connection attempted yet.
    Idle,
    /// Attempting to connect.
    Connecting,
    /// Connected and serving calls.
    Connected,
    /// Connection lost, will retry after backoff.
    Reconnecting,
    /// Torn down administratively. Terminal.
    Closed,
    /// Gave up after exhausting reconnect attempts. Terminal.
    Failed,
}

impl ConnectionState {
    /// Whether this state is terminal (no transitions leave it).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// Atomic wrapper for connection state.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU32);

impl AtomicConnectionState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: ConnectionState) -> Self {
        Self(AtomicU32::new(state as u32))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        Self::decode(self.0.load(Ordering::SeqCst))
    }

    /// Store a new state.
    ///
    /// Terminal states stick: once `Closed` or `Failed` is observed, later
    /// stores are ignored.
    pub fn store(&self, state: ConnectionState) {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            if Self::decode(current).is_terminal() {
                return;
            }
            match self.0.compare_exchange(
                current,
                state as u32,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    fn decode(raw: u32) -> ConnectionState {
        match raw {
            0 => ConnectionState::Idle,
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Reconnecting,
            4 => ConnectionState::Closed,
            _ => ConnectionState::Failed,
        }
    }
}
