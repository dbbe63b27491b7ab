//! Trading-account registry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Connection lifecycle of an account on the provider side.
///
/// The provider reports these as free-form strings; anything it grows in
/// the future decodes as `Unknown` instead of failing the whole account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Allocating,
    Installing,
    AttemptConnection,
    AttemptSuccess,
    AttemptFailed,
    ConnectionOk,
    ConnectionSlow,
    ConnectionLost,
    Unknown,
}

impl ConnectionState {
    /// Parse the provider's wire name; unrecognized values map to `Unknown`.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "allocating" => ConnectionState::Allocating,
            "installing" => ConnectionState::Installing,
            "attempt_connection" => ConnectionState::AttemptConnection,
            "attempt_success" => ConnectionState::AttemptSuccess,
            "attempt_failed" => ConnectionState::AttemptFailed,
            "connection_ok" => ConnectionState::ConnectionOk,
            "connection_slow" => ConnectionState::ConnectionSlow,
            "connection_lost" => ConnectionState::ConnectionLost,
            _ => ConnectionState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Allocating => "allocating",
            ConnectionState::Installing => "installing",
            ConnectionState::AttemptConnection => "attempt_connection",
            ConnectionState::AttemptSuccess => "attempt_success",
            ConnectionState::AttemptFailed => "attempt_failed",
            ConnectionState::ConnectionOk => "connection_ok",
            ConnectionState::ConnectionSlow => "connection_slow",
            ConnectionState::ConnectionLost => "connection_lost",
            ConnectionState::Unknown => "unknown",
        }
    }

    /// True once the provider terminal is connected and mirroring.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::ConnectionOk | ConnectionState::ConnectionSlow)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnectionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ConnectionState::from_wire(&s))
    }
}

/// One brokerage account a user has connected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingAccount {
    /// Opaque registry key
    pub id: String,

    pub owner_user_id: String,

    /// Id of this account on the external provider; assigned only after
    /// successful remote registration, never empty for a linked account
    pub remote_account_id: String,

    pub display_name: String,

    /// Broker the account trades through (display metadata)
    pub broker_id: String,

    /// Last known provider-side connection state
    pub connection_state: ConnectionState,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_wire_round_trip() {
        for s in [
            "allocating",
            "installing",
            "attempt_connection",
            "attempt_success",
            "attempt_failed",
            "connection_ok",
            "connection_slow",
            "connection_lost",
        ] {
            assert_eq!(ConnectionState::from_wire(s).as_str(), s);
        }
    }

    #[test]
    fn test_connection_state_unknown_catch_all() {
        assert_eq!(ConnectionState::from_wire("rebooting"), ConnectionState::Unknown);
        assert_eq!(ConnectionState::from_wire(""), ConnectionState::Unknown);
    }

    #[test]
    fn test_connection_state_is_connected() {
        assert!(ConnectionState::ConnectionOk.is_connected());
        assert!(ConnectionState::ConnectionSlow.is_connected());
        assert!(!ConnectionState::AttemptFailed.is_connected());
        assert!(!ConnectionState::Unknown.is_connected());
    }
}
