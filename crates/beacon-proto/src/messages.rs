//! Frame and event-catalogue definitions.

use serde::{Deserialize, Serialize};

use crate::error::ProtoError;
use crate::types::{
    Achievement, BeaconStatus, CorrelationId, LogPage, LogQuery, PlayerIdentity, PlayerQuery,
    PlayerState, PlayerStats, RescanStarted, SessionPage,
};

/// The fixed catalogue of events the backend can send to a beacon.
///
/// Each variant is one request shape; the matching response shape lives in
/// [`BeaconResponse`]. Adding an event means adding a variant to both.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum BeaconRequest {
    /// Heartbeat probe; answered with [`BeaconResponse::Pong`].
    Ping,
    /// Status query: counters and timing.
    GetStatus,
    /// Paginated, filtered log fetch.
    GetLogs(LogQuery),
    /// Player-identity lookup by id or name.
    FindPlayer(PlayerQuery),
    /// Aggregate statistics for one player.
    GetPlayerStats {
        /// Stable player id.
        player_id: String,
    },
    /// Earned achievements for one player.
    GetPlayerAchievements {
        /// Stable player id.
        player_id: String,
    },
    /// Paginated session history for one player.
    GetPlayerSessions {
        /// Stable player id.
        player_id: String,
        /// Zero-based page index.
        page: u32,
        /// Sessions per page.
        page_size: u32,
    },
    /// Raw per-player state document.
    GetPlayerState {
        /// Stable player id.
        player_id: String,
    },
    /// Force a full rescan of the game server's data.
    Rescan,
}

impl BeaconRequest {
    /// The wire name of this event.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetStatus => "get_status",
            Self::GetLogs(_) => "get_logs",
            Self::FindPlayer(_) => "find_player",
            Self::GetPlayerStats { .. } => "get_player_stats",
            Self::GetPlayerAchievements { .. } => "get_player_achievements",
            Self::GetPlayerSessions { .. } => "get_player_sessions",
            Self::GetPlayerState { .. } => "get_player_state",
            Self::Rescan => "rescan",
        }
    }
}

/// Success payloads, one per [`BeaconRequest`] event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum BeaconResponse {
    /// Heartbeat acknowledgement.
    Pong,
    /// Status counters and timing.
    Status(BeaconStatus),
    /// One page of log records.
    Logs(LogPage),
    /// A resolved player identity.
    Player(PlayerIdentity),
    /// Aggregate player statistics.
    PlayerStats(PlayerStats),
    /// Earned achievements.
    PlayerAchievements(Vec<Achievement>),
    /// One page of play sessions.
    PlayerSessions(SessionPage),
    /// Raw player state document.
    PlayerState(PlayerState),
    /// Rescan acknowledgement.
    RescanStarted(RescanStarted),
}

impl BeaconResponse {
    /// The wire name of this event.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Pong => "pong",
            Self::Status(_) => "status",
            Self::Logs(_) => "logs",
            Self::Player(_) => "player",
            Self::PlayerStats(_) => "player_stats",
            Self::PlayerAchievements(_) => "player_achievements",
            Self::PlayerSessions(_) => "player_sessions",
            Self::PlayerState(_) => "player_state",
            Self::RescanStarted(_) => "rescan_started",
        }
    }
}

/// Outbound frame: one request multiplexed onto the shared connection.
///
/// Every frame carries the shared auth key; beacons verify it per event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestFrame {
    /// Correlation token echoed back by the response.
    pub id: CorrelationId,
    /// Shared secret the beacon verifies.
    pub auth_key: String,
    /// The event and its payload.
    #[serde(flatten)]
    pub request: BeaconRequest,
}

impl RequestFrame {
    /// Build a frame for one request.
    #[must_use]
    pub fn new(id: CorrelationId, auth_key: impl Into<String>, request: BeaconRequest) -> Self {
        Self {
            id,
            auth_key: auth_key.into(),
            request,
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}

/// Outcome of one call as the beacon reports it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallResult {
    /// The beacon handled the event.
    Ok {
        /// The event-specific payload.
        response: BeaconResponse,
    },
    /// The beacon understood the request and rejected it.
    Error {
        /// Application error code (see [`crate::codes`]).
        code: u32,
        /// Human-readable description.
        message: String,
    },
}

/// Inbound frame: the correlated acknowledgement of one request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResponseFrame {
    /// Correlation token of the originating request.
    pub id: CorrelationId,
    /// Success payload or application error.
    #[serde(flatten)]
    pub result: CallResult,
}

impl ResponseFrame {
    /// Build a success frame.
    #[must_use]
    pub const fn ok(id: CorrelationId, response: BeaconResponse) -> Self {
        Self {
            id,
            result: CallResult::Ok { response },
        }
    }

    /// Build an application-error frame.
    #[must_use]
    pub fn error(id: CorrelationId, code: u32, message: impl Into<String>) -> Self {
        Self {
            id,
            result: CallResult::Error {
                code,
                message: message.into(),
            },
        }
    }

    /// Serialize to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ProtoError> {
        serde_json::to_string(self).map_err(|e| ProtoError::Encoding(e.to_string()))
    }

    /// Deserialize from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn from_json(json: &str) -> Result<Self, ProtoError> {
        serde_json::from_str(json).map_err(|e| ProtoError::Decoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codes;

    fn frame(request: BeaconRequest) -> RequestFrame {
        RequestFrame::new(CorrelationId::new(7), "secret", request)
    }

    // ==================== Request Frame Tests ====================

    #[test]
    fn test_request_frame_carries_id_key_and_event() {
        let json = frame(BeaconRequest::GetStatus).to_json().unwrap();
        assert!(json.contains("\"id\":7"));
        assert!(json.contains("\"auth_key\":\"secret\""));
        assert!(json.contains("\"event\":\"get_status\""));
    }

    #[test]
    fn test_request_frame_payload_shape() {
        let json = frame(BeaconRequest::GetLogs(LogQuery::page(3, 25)))
            .to_json()
            .unwrap();
        assert!(json.contains("\"event\":\"get_logs\""));
        assert!(json.contains("\"page\":3"));
        assert!(json.contains("\"page_size\":25"));
    }

    #[test]
    fn test_request_frame_roundtrip() {
        let original = frame(BeaconRequest::GetPlayerSessions {
            player_id: "p-1".to_string(),
            page: 0,
            page_size: 10,
        });
        let parsed = RequestFrame::from_json(&original.to_json().unwrap()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_request_event_names() {
        assert_eq!(BeaconRequest::Ping.event_name(), "ping");
        assert_eq!(BeaconRequest::Rescan.event_name(), "rescan");
        assert_eq!(
            BeaconRequest::FindPlayer(PlayerQuery::new("alice")).event_name(),
            "find_player"
        );
    }

    // ==================== Response Frame Tests ====================

    #[test]
    fn test_response_frame_ok_shape() {
        let json = ResponseFrame::ok(CorrelationId::new(9), BeaconResponse::Pong)
            .to_json()
            .unwrap();
        assert!(json.contains("\"id\":9"));
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"event\":\"pong\""));
    }

    #[test]
    fn test_response_frame_error_shape() {
        let json = ResponseFrame::error(CorrelationId::new(9), codes::NOT_FOUND, "player not found")
            .to_json()
            .unwrap();
        assert!(json.contains("\"status\":\"error\""));
        assert!(json.contains("\"code\":404"));
        assert!(json.contains("player not found"));
    }

    #[test]
    fn test_response_frame_roundtrip() {
        let original = ResponseFrame::ok(
            CorrelationId::new(11),
            BeaconResponse::RescanStarted(RescanStarted {
                accepted: true,
                estimated_secs: Some(120),
            }),
        );
        let parsed = ResponseFrame::from_json(&original.to_json().unwrap()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_error_frame_roundtrip_keeps_code() {
        let original = ResponseFrame::error(CorrelationId::new(3), codes::AUTH_REJECTED, "bad key");
        let parsed = ResponseFrame::from_json(&original.to_json().unwrap()).unwrap();
        match parsed.result {
            CallResult::Error { code, ref message } => {
                assert_eq!(code, codes::AUTH_REJECTED);
                assert_eq!(message, "bad key");
            }
            CallResult::Ok { .. } => panic!("expected error result"),
        }
    }

    #[test]
    fn test_malformed_frame_is_decoding_error() {
        let err = ResponseFrame::from_json("{\"id\":1}").unwrap_err();
        assert!(matches!(err, ProtoError::Decoding(_)));
    }
}
