//! Core types for the beacon protocol.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProtoError;

/// Opaque identifier for a logical beacon endpoint.
///
/// Supplied by the administrative configuration store; the gateway never
/// interprets it beyond equality and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Create a `ServerId` from an opaque key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is empty.
    pub fn new(key: impl Into<String>) -> Result<Self, ProtoError> {
        let key = key.into();
        if key.is_empty() {
            return Err(ProtoError::Validation("server id must not be empty".into()));
        }
        Ok(Self(key))
    }

    /// Get the underlying key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-call token matching a response to its originating request.
///
/// Unique within one channel's lifetime; allocated monotonically so a live
/// id is never aliased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    /// Wrap a raw correlation value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw correlation value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot counters and timing reported by a status query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BeaconStatus {
    /// Players currently connected to the game server.
    pub players_online: u32,
    /// Total log records the beacon has stored.
    pub logs_stored: u64,
    /// When the last full rescan completed, if any.
    pub last_scan: Option<DateTime<Utc>>,
    /// Duration of the last full rescan in milliseconds.
    pub scan_duration_ms: Option<u64>,
    /// Beacon software version string.
    pub version: String,
    /// Seconds since the beacon process started.
    pub uptime_secs: u64,
}

/// Filter and pagination parameters for a log fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LogQuery {
    /// Zero-based page index.
    pub page: u32,
    /// Records per page.
    pub page_size: u32,
    /// Only records at or after this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    /// Only records at or before this instant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    /// Only records involving this player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    /// Only records in this category (chat, combat, admin, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl LogQuery {
    /// Create a query for one page with the given size.
    #[must_use]
    pub const fn page(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            from: None,
            to: None,
            player_id: None,
            category: None,
        }
    }

    /// Restrict to records involving a player.
    #[must_use]
    pub fn with_player(mut self, player_id: impl Into<String>) -> Self {
        self.player_id = Some(player_id.into());
        self
    }

    /// Restrict to a category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Restrict to a time range.
    #[must_use]
    pub const fn with_range(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }
}

/// One stored game-server log record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogRecord {
    /// Beacon-assigned record id.
    pub id: u64,
    /// When the event happened.
    pub at: DateTime<Utc>,
    /// Record category (chat, combat, admin, ...).
    pub category: String,
    /// The player involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<String>,
    /// Raw log line.
    pub message: String,
}

/// One page of a paginated log fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogPage {
    /// Total matching records across all pages.
    pub total: u64,
    /// The records on this page.
    pub records: Vec<LogRecord>,
}

/// Lookup key for a player-identity query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerQuery {
    /// Player id or current name to look up.
    pub query: String,
}

impl PlayerQuery {
    /// Create a lookup for a player id or name.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
        }
    }
}

/// A resolved player identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerIdentity {
    /// Stable player id on the game server.
    pub player_id: String,
    /// Current display name.
    pub name: String,
    /// Previously seen names.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// First time the beacon saw this player.
    pub first_seen: DateTime<Utc>,
    /// Most recent time the beacon saw this player.
    pub last_seen: DateTime<Utc>,
}

/// Aggregate statistics for one player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStats {
    /// Stable player id.
    pub player_id: String,
    /// Total time played, in seconds.
    pub playtime_secs: u64,
    /// Number of recorded sessions.
    pub session_count: u32,
    /// Game-defined score.
    pub score: i64,
}

/// One earned achievement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Achievement {
    /// Achievement identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// When it was earned.
    pub earned_at: DateTime<Utc>,
}

/// One recorded play session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerSession {
    /// Session start.
    pub started_at: DateTime<Utc>,
    /// Session end; `None` while the session is still open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Session length in seconds.
    pub duration_secs: u64,
}

/// One page of a paginated session fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionPage {
    /// Total sessions across all pages.
    pub total: u64,
    /// The sessions on this page.
    pub sessions: Vec<PlayerSession>,
}

/// Raw per-player state as the game server holds it.
///
/// Deliberately untyped: the shape is game-specific and decoded by domain
/// code behind the gateway, not by the gateway itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerState {
    /// Stable player id.
    pub player_id: String,
    /// Opaque state document.
    pub raw: serde_json::Value,
}

/// Acknowledgement of a forced full rescan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RescanStarted {
    /// Whether the beacon accepted the rescan request.
    pub accepted: bool,
    /// Beacon's estimate of the rescan duration, if it gave one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_id_rejects_empty() {
        assert!(ServerId::new("").is_err());
        assert!(ServerId::new("srv-7").is_ok());
    }

    #[test]
    fn test_server_id_display() {
        let id = ServerId::new("srv-7").unwrap();
        assert_eq!(id.to_string(), "srv-7");
        assert_eq!(id.as_str(), "srv-7");
    }

    #[test]
    fn test_correlation_id_ordering() {
        assert!(CorrelationId::new(1) < CorrelationId::new(2));
        assert_eq!(CorrelationId::new(7).value(), 7);
    }

    #[test]
    fn test_log_query_builder() {
        let q = LogQuery::page(2, 50)
            .with_player("p-1")
            .with_category("combat");

        assert_eq!(q.page, 2);
        assert_eq!(q.page_size, 50);
        assert_eq!(q.player_id.as_deref(), Some("p-1"));
        assert_eq!(q.category.as_deref(), Some("combat"));
        assert!(q.from.is_none());
    }

    #[test]
    fn test_log_query_omits_empty_filters() {
        let json = serde_json::to_string(&LogQuery::page(0, 25)).unwrap();
        assert!(!json.contains("player_id"));
        assert!(!json.contains("from"));
    }

    #[test]
    fn test_log_page_roundtrip() {
        let page = LogPage {
            total: 1,
            records: vec![LogRecord {
                id: 42,
                at: Utc::now(),
                category: "chat".to_string(),
                player_id: Some("p-1".to_string()),
                message: "hello".to_string(),
            }],
        };

        let json = serde_json::to_string(&page).unwrap();
        let parsed: LogPage = serde_json::from_str(&json).unwrap();
        assert_eq!(page, parsed);
    }
}
