//! Error classification for beacon calls.

use std::time::Duration;

use beacon_proto::ProtoError;
use thiserror::Error;

/// Classified failure of one beacon call.
///
/// Callers use the classification to decide whether to retry at a higher
/// level: transport-level trouble (`Network`, `Timeout`) is retryable, a
/// rejected key (`Auth`) needs an administrator, and `Application` errors
/// pass through to domain code verbatim.
#[derive(Debug, Error)]
pub enum BeaconError {
    /// Transport-level failure: DNS, connect refused, mid-flight disconnect.
    #[error("network error: {0}")]
    Network(String),

    /// The beacon rejected the shared auth key.
    #[error("auth rejected: {0}")]
    Auth(String),

    /// The deadline elapsed with no response.
    #[error("{event} timed out after {after:?}")]
    Timeout {
        /// Event name of the timed-out call.
        event: String,
        /// The deadline that elapsed.
        after: Duration,
    },

    /// The beacon understood the request and returned an error for it.
    #[error("beacon error {code}: {message}")]
    Application {
        /// Application error code (see [`beacon_proto::codes`]).
        code: u32,
        /// Error description from the beacon.
        message: String,
    },

    /// The channel was torn down while the call was pending.
    #[error("channel closed")]
    Closed,

    /// The frame could not be encoded or the response decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),
}

/// Coarse classification of a [`BeaconError`], for boundary mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport-level failure.
    Network,
    /// Auth key rejected.
    Auth,
    /// Deadline elapsed.
    Timeout,
    /// Beacon-reported application error.
    Application,
    /// Channel torn down.
    Closed,
    /// Encode/decode failure at the gateway boundary.
    Protocol,
}

impl BeaconError {
    /// The coarse classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Auth(_) => ErrorKind::Auth,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Application { .. } => ErrorKind::Application,
            Self::Closed => ErrorKind::Closed,
            Self::Protocol(_) => ErrorKind::Protocol,
        }
    }

    /// Whether retrying the same call later could succeed without
    /// administrative intervention.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_proto::codes;

    #[test]
    fn test_network_error_display() {
        let err = BeaconError::Network("connection refused".to_string());
        assert_eq!(err.to_string(), "network error: connection refused");
    }

    #[test]
    fn test_timeout_error_display() {
        let err = BeaconError::Timeout {
            event: "get_status".to_string(),
            after: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "get_status timed out after 50ms");
    }

    #[test]
    fn test_application_error_display() {
        let err = BeaconError::Application {
            code: codes::NOT_FOUND,
            message: "player not found".to_string(),
        };
        assert_eq!(err.to_string(), "beacon error 404: player not found");
    }

    #[test]
    fn test_proto_error_conversion() {
        let proto = ProtoError::Decoding("bad json".to_string());
        let err: BeaconError = proto.into();
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(BeaconError::Closed.kind(), ErrorKind::Closed);
        assert_eq!(
            BeaconError::Auth("bad key".to_string()).kind(),
            ErrorKind::Auth
        );
        assert_eq!(
            BeaconError::Network("reset".to_string()).kind(),
            ErrorKind::Network
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(BeaconError::Network("reset".to_string()).is_retryable());
        assert!(BeaconError::Timeout {
            event: "ping".to_string(),
            after: Duration::from_secs(1),
        }
        .is_retryable());

        assert!(!BeaconError::Closed.is_retryable());
        assert!(!BeaconError::Auth("bad key".to_string()).is_retryable());
        assert!(!BeaconError::Application {
            code: codes::BAD_REQUEST,
            message: "missing page".to_string(),
        }
        .is_retryable());
    }
}
