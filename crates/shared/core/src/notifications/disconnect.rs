use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason code of a server-initiated `disconnect` message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DisconnectCode {
    /// The server shut down the connection
    Shutdown,
    /// Another connection was opened with the same credentials
    DuplicateStream,
    /// Closed by a control request
    ControlRequest,
    /// The client was reading too slowly
    Stall,
    /// The server closed the connection normally
    Normal,
    /// The access token was revoked
    TokenRevoked,
    /// The account was logged out by an administrator
    AdminLogout,
    /// Code 8 is reserved by the protocol
    Reserved,
    /// The stream exceeded its message limit
    MaxMessageLimit,
    /// Internal stream error
    StreamException,
    /// Internal broker stall
    BrokerStall,
    /// The server shed load
    ShedLoad,
}

impl DisconnectCode {
    /// Map a protocol code (1..=12)
    pub fn from_code(code: i64) -> Option<Self> {
        let code = match code {
            1 => DisconnectCode::Shutdown,
            2 => DisconnectCode::DuplicateStream,
            3 => DisconnectCode::ControlRequest,
            4 => DisconnectCode::Stall,
            5 => DisconnectCode::Normal,
            6 => DisconnectCode::TokenRevoked,
            7 => DisconnectCode::AdminLogout,
            8 => DisconnectCode::Reserved,
            9 => DisconnectCode::MaxMessageLimit,
            10 => DisconnectCode::StreamException,
            11 => DisconnectCode::BrokerStall,
            12 => DisconnectCode::ShedLoad,
            _ => return None,
        };
        Some(code)
    }

    pub fn code(self) -> i64 {
        match self {
            DisconnectCode::Shutdown => 1,
            DisconnectCode::DuplicateStream => 2,
            DisconnectCode::ControlRequest => 3,
            DisconnectCode::Stall => 4,
            DisconnectCode::Normal => 5,
            DisconnectCode::TokenRevoked => 6,
            DisconnectCode::AdminLogout => 7,
            DisconnectCode::Reserved => 8,
            DisconnectCode::MaxMessageLimit => 9,
            DisconnectCode::StreamException => 10,
            DisconnectCode::BrokerStall => 11,
            DisconnectCode::ShedLoad => 12,
        }
    }
}

impl fmt::Display for DisconnectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_mapping_is_total_over_protocol_range() {
        for code in 1..=12 {
            let parsed = DisconnectCode::from_code(code).unwrap();
            assert_eq!(parsed.code(), code);
        }
        assert!(DisconnectCode::from_code(0).is_none());
        assert!(DisconnectCode::from_code(13).is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(DisconnectCode::TokenRevoked.to_string(), "TokenRevoked(6)");
    }
}
