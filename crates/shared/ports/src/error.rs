use thiserror::Error;

/// Failure to open or keep reading a stream
///
/// The split matters to the reconnect policy: errors carrying an HTTP
/// response are protocol errors, everything else is a network error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {reason}")]
    Http { status: u16, reason: String },
}

impl TransportError {
    pub fn network(msg: impl Into<String>) -> Self {
        TransportError::Network(msg.into())
    }

    pub fn http(status: u16, reason: impl Into<String>) -> Self {
        TransportError::Http {
            status,
            reason: reason.into(),
        }
    }

    /// HTTP status of the response, if one was received
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Http { status, .. } => Some(*status),
            TransportError::Network(_) => None,
        }
    }

    pub fn is_protocol(&self) -> bool {
        self.status().is_some()
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let err = TransportError::http(420, "Enhance Your Calm");
        assert_eq!(err.status(), Some(420));
        assert!(err.is_protocol());
        assert_eq!(err.to_string(), "HTTP 420: Enhance Your Calm");

        let err = TransportError::network("connection reset");
        assert_eq!(err.status(), None);
        assert!(!err.is_protocol());
    }
}
